//! Binary wire protocol
//!
//! Every frame is one WebSocket binary message laid out as
//! `[type:1][request id:4, big-endian][payload]`. The request id is present
//! only for request-bearing types (Post, CreateSpace, Handshake, Ack, Error,
//! SpaceError). Payloads are UTF-8 JSON except for the handshake, which is the
//! raw 32-byte public key followed by the UTF-8 space name.
//!
//! The codec is pure: it never touches connection or application state.

use crate::types::{ContentItem, PeerKey, Post, RequestId, PUBLIC_KEY_LEN, REQUEST_ID_LEN};
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// One-byte frame type tag
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum MessageType {
    Ping = 0x01,
    Pong = 0x02,
    Ack = 0x03,
    Post = 0x04,
    PostList = 0x05,
    GetPosts = 0x06,
    CreateSpace = 0x07,
    Handshake = 0x08,
    SpaceError = 0x10,
    Error = 0xFF,
}

impl MessageType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        let ty = match byte {
            0x01 => MessageType::Ping,
            0x02 => MessageType::Pong,
            0x03 => MessageType::Ack,
            0x04 => MessageType::Post,
            0x05 => MessageType::PostList,
            0x06 => MessageType::GetPosts,
            0x07 => MessageType::CreateSpace,
            0x08 => MessageType::Handshake,
            0x10 => MessageType::SpaceError,
            0xFF => MessageType::Error,
            _ => return None,
        };
        Some(ty)
    }

    /// Whether frames of this type carry a request identifier
    pub fn carries_request_id(self) -> bool {
        matches!(
            self,
            MessageType::Post
                | MessageType::CreateSpace
                | MessageType::Handshake
                | MessageType::Ack
                | MessageType::Error
                | MessageType::SpaceError
        )
    }
}

/// Frame decoding failures. Malformed frames are dropped, never answered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,

    #[error("unknown type tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("{ty:?} frame truncated: need {expected} bytes, got {actual}")]
    Truncated {
        ty: MessageType,
        expected: usize,
        actual: usize,
    },

    #[error("{0:?} frame carries unexpected trailing bytes")]
    TrailingBytes(MessageType),

    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("space name is not valid UTF-8")]
    InvalidUtf8,
}

/// Handshake: the peer's public key and the space it wants to join
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Handshake {
    pub public_key: PeerKey,
    pub space: String,
}

/// Request to create a space together with its first post
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateSpaceRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub author: String,
    pub content: Vec<ContentItem>,
}

/// Reason carried by an Error frame
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// The post targets a space the store does not know
    NonExistentSpace,
    /// The backing store failed; nothing was retried
    StoreUnavailable,
    /// The post is missing required fields
    InvalidPost,
}

/// Reason carried by a SpaceError frame
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum SpaceErrorReason {
    /// Too many existing names are within the similarity distance
    TooManySimilar,
    /// A space with exactly this name exists
    NameTaken,
    /// Empty, too long, or contains a path separator
    InvalidName,
}

#[derive(Serialize, Deserialize)]
struct ReasonPayload<R> {
    reason: R,
}

#[derive(Serialize, Deserialize)]
struct GetPostsPayload {
    space: String,
}

/// A decoded protocol message
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Message {
    Ping,
    Pong,
    Ack {
        id: RequestId,
    },
    Post {
        id: RequestId,
        post: Post,
    },
    PostList {
        posts: Vec<Post>,
    },
    /// `None` asks for the space negotiated at handshake
    GetPosts {
        space: Option<String>,
    },
    CreateSpace {
        id: RequestId,
        request: CreateSpaceRequest,
    },
    Handshake {
        id: RequestId,
        handshake: Handshake,
    },
    SpaceError {
        id: RequestId,
        reason: SpaceErrorReason,
    },
    Error {
        id: RequestId,
        reason: ErrorReason,
    },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Ping => MessageType::Ping,
            Message::Pong => MessageType::Pong,
            Message::Ack { .. } => MessageType::Ack,
            Message::Post { .. } => MessageType::Post,
            Message::PostList { .. } => MessageType::PostList,
            Message::GetPosts { .. } => MessageType::GetPosts,
            Message::CreateSpace { .. } => MessageType::CreateSpace,
            Message::Handshake { .. } => MessageType::Handshake,
            Message::SpaceError { .. } => MessageType::SpaceError,
            Message::Error { .. } => MessageType::Error,
        }
    }

    /// Correlation identifier, if this message carries one
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Message::Ack { id }
            | Message::Post { id, .. }
            | Message::CreateSpace { id, .. }
            | Message::Handshake { id, .. }
            | Message::SpaceError { id, .. }
            | Message::Error { id, .. } => Some(*id),
            Message::Ping
            | Message::Pong
            | Message::PostList { .. }
            | Message::GetPosts { .. } => None,
        }
    }

    /// Encode into a single frame
    pub fn encode(&self) -> Result<Bytes> {
        let ty = self.message_type();
        let mut buf = BytesMut::with_capacity(1 + REQUEST_ID_LEN);
        buf.put_u8(ty.as_byte());
        if let Some(id) = self.request_id() {
            buf.put_slice(&id.to_bytes());
        }

        match self {
            Message::Ping | Message::Pong | Message::Ack { .. } => {}
            Message::Post { post, .. } => put_json(&mut buf, post)?,
            Message::PostList { posts } => put_json(&mut buf, posts)?,
            Message::GetPosts { space } => {
                if let Some(space) = space {
                    put_json(&mut buf, &GetPostsPayload { space: space.clone() })?;
                }
            }
            Message::CreateSpace { request, .. } => put_json(&mut buf, request)?,
            Message::Handshake { handshake, .. } => {
                buf.put_slice(handshake.public_key.as_bytes());
                buf.put_slice(handshake.space.as_bytes());
            }
            Message::SpaceError { reason, .. } => {
                put_json(&mut buf, &ReasonPayload { reason: *reason })?
            }
            Message::Error { reason, .. } => {
                put_json(&mut buf, &ReasonPayload { reason: *reason })?
            }
        }

        Ok(buf.freeze())
    }

    /// Decode a complete frame
    pub fn decode(frame: &[u8]) -> std::result::Result<Self, DecodeError> {
        let (&tag, body) = frame.split_first().ok_or(DecodeError::Empty)?;
        Self::decode_body(tag, body)
    }

    /// Decode the bytes following an already extracted type tag
    pub fn decode_body(tag: u8, body: &[u8]) -> std::result::Result<Self, DecodeError> {
        let ty = MessageType::from_byte(tag).ok_or(DecodeError::UnknownTag(tag))?;

        let (id, payload) = if ty.carries_request_id() {
            if body.len() < REQUEST_ID_LEN {
                return Err(DecodeError::Truncated {
                    ty,
                    expected: REQUEST_ID_LEN,
                    actual: body.len(),
                });
            }
            let (id_bytes, rest) = body.split_at(REQUEST_ID_LEN);
            let mut raw = [0u8; REQUEST_ID_LEN];
            raw.copy_from_slice(id_bytes);
            (RequestId::from_bytes(raw), rest)
        } else {
            (RequestId::UNSOLICITED, body)
        };

        let message = match ty {
            MessageType::Ping => {
                expect_empty(ty, payload)?;
                Message::Ping
            }
            MessageType::Pong => {
                expect_empty(ty, payload)?;
                Message::Pong
            }
            MessageType::Ack => {
                expect_empty(ty, payload)?;
                Message::Ack { id }
            }
            MessageType::Post => Message::Post {
                id,
                post: parse_json(payload)?,
            },
            MessageType::PostList => Message::PostList {
                posts: parse_json(payload)?,
            },
            MessageType::GetPosts => {
                let space = if payload.is_empty() {
                    None
                } else {
                    Some(parse_json::<GetPostsPayload>(payload)?.space)
                };
                Message::GetPosts { space }
            }
            MessageType::CreateSpace => Message::CreateSpace {
                id,
                request: parse_json(payload)?,
            },
            MessageType::Handshake => Message::Handshake {
                id,
                handshake: parse_handshake(payload)?,
            },
            MessageType::SpaceError => Message::SpaceError {
                id,
                reason: parse_json::<ReasonPayload<SpaceErrorReason>>(payload)?.reason,
            },
            MessageType::Error => Message::Error {
                id,
                reason: parse_json::<ReasonPayload<ErrorReason>>(payload)?.reason,
            },
        };

        Ok(message)
    }
}

fn put_json<T: Serialize + ?Sized>(buf: &mut BytesMut, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
    buf.put_slice(&json);
    Ok(())
}

fn parse_json<T: DeserializeOwned>(payload: &[u8]) -> std::result::Result<T, DecodeError> {
    serde_json::from_slice(payload).map_err(|e| DecodeError::InvalidJson(e.to_string()))
}

fn expect_empty(ty: MessageType, payload: &[u8]) -> std::result::Result<(), DecodeError> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(DecodeError::TrailingBytes(ty))
    }
}

fn parse_handshake(payload: &[u8]) -> std::result::Result<Handshake, DecodeError> {
    if payload.len() < PUBLIC_KEY_LEN {
        return Err(DecodeError::Truncated {
            ty: MessageType::Handshake,
            expected: REQUEST_ID_LEN + PUBLIC_KEY_LEN,
            actual: REQUEST_ID_LEN + payload.len(),
        });
    }
    let (key_bytes, name_bytes) = payload.split_at(PUBLIC_KEY_LEN);
    let mut key = [0u8; PUBLIC_KEY_LEN];
    key.copy_from_slice(key_bytes);
    let space = std::str::from_utf8(name_bytes)
        .map_err(|_| DecodeError::InvalidUtf8)?
        .to_string();

    Ok(Handshake {
        public_key: PeerKey(key),
        space,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MediaKind, TextAttribute};
    use proptest::prelude::*;

    fn sample_post() -> Post {
        Post {
            author: "x".into(),
            space: "root".into(),
            content: vec![
                ContentItem::Text {
                    attributes: [TextAttribute::Italic].into_iter().collect(),
                    text: "first".into(),
                },
                ContentItem::Media {
                    media_kind: MediaKind::Png,
                    url: "https://cdn.example/a.png".into(),
                    title: Some("a".into()),
                    description: None,
                    size: Some(1024),
                },
                ContentItem::text("last"),
            ],
            created_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_roundtrip_every_type() {
        let messages = vec![
            Message::Ping,
            Message::Pong,
            Message::Ack { id: RequestId(7) },
            Message::Post { id: RequestId(0xdead_beef), post: sample_post() },
            Message::PostList { posts: vec![sample_post(), sample_post()] },
            Message::GetPosts { space: None },
            Message::GetPosts { space: Some("news".into()) },
            Message::CreateSpace {
                id: RequestId(3),
                request: CreateSpaceRequest {
                    name: "alpha".into(),
                    description: Some("first letters".into()),
                    author: "x".into(),
                    content: vec![ContentItem::text("hello")],
                },
            },
            Message::Handshake {
                id: RequestId(9),
                handshake: Handshake { public_key: PeerKey([5u8; 32]), space: "root".into() },
            },
            Message::SpaceError { id: RequestId(4), reason: SpaceErrorReason::TooManySimilar },
            Message::Error { id: RequestId(5), reason: ErrorReason::NonExistentSpace },
        ];

        for message in messages {
            let frame = message.encode().unwrap();
            assert_eq!(frame[0], message.message_type().as_byte());
            let decoded = Message::decode(&frame).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_frame_layout() {
        let frame = Message::Ping.encode().unwrap();
        assert_eq!(&frame[..], &[0x01]);

        let frame = Message::Ack { id: RequestId(0x0a0b_0c0d) }.encode().unwrap();
        assert_eq!(&frame[..], &[0x03, 0x0a, 0x0b, 0x0c, 0x0d]);

        let frame = Message::Handshake {
            id: RequestId(1),
            handshake: Handshake { public_key: PeerKey([0xaa; 32]), space: "root".into() },
        }
        .encode()
        .unwrap();
        assert_eq!(frame.len(), 1 + 4 + 32 + 4);
        assert_eq!(&frame[37..], b"root");

        let frame = Message::Error { id: RequestId(2), reason: ErrorReason::NonExistentSpace }
            .encode()
            .unwrap();
        assert_eq!(frame[0], 0xFF);
        assert_eq!(&frame[5..], br#"{"reason":"non_existent_space"}"#);
    }

    #[test]
    fn test_content_order_preserved() {
        let post = sample_post();
        let frame = Message::Post { id: RequestId(1), post: post.clone() }.encode().unwrap();
        match Message::decode(&frame).unwrap() {
            Message::Post { post: decoded, .. } => assert_eq!(decoded.content, post.content),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(Message::decode(&[]), Err(DecodeError::Empty));
        assert_eq!(Message::decode(&[0x42]), Err(DecodeError::UnknownTag(0x42)));
        assert_eq!(Message::decode_body(0x09, &[]), Err(DecodeError::UnknownTag(0x09)));
        assert!(matches!(
            Message::decode(&[0x03, 0x00, 0x01]),
            Err(DecodeError::Truncated { ty: MessageType::Ack, .. })
        ));
        assert!(matches!(
            Message::decode(&[0x04, 0, 0, 0, 1, b'{']),
            Err(DecodeError::InvalidJson(_))
        ));
        assert_eq!(
            Message::decode(&[0x01, 0x00]),
            Err(DecodeError::TrailingBytes(MessageType::Ping))
        );

        let mut short_handshake = vec![0x08, 0, 0, 0, 1];
        short_handshake.extend_from_slice(&[1u8; 16]);
        assert!(matches!(
            Message::decode(&short_handshake),
            Err(DecodeError::Truncated { ty: MessageType::Handshake, .. })
        ));

        let mut bad_name = vec![0x08, 0, 0, 0, 1];
        bad_name.extend_from_slice(&[1u8; 32]);
        bad_name.extend_from_slice(&[0xff, 0xfe]);
        assert_eq!(Message::decode(&bad_name), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_request_id_presence() {
        assert!(MessageType::Post.carries_request_id());
        assert!(MessageType::SpaceError.carries_request_id());
        assert!(!MessageType::GetPosts.carries_request_id());
        assert!(!MessageType::PostList.carries_request_id());
        assert_eq!(Message::GetPosts { space: None }.request_id(), None);
        assert_eq!(Message::Ack { id: RequestId(8) }.request_id(), Some(RequestId(8)));
    }

    proptest! {
        #[test]
        fn prop_post_text_survives(
            author in ".{0,24}",
            text in ".{0,200}",
            id in any::<u32>()
        ) {
            let post = Post {
                author,
                space: "root".into(),
                content: vec![ContentItem::text(text)],
                created_at: 1,
            };
            let message = Message::Post { id: RequestId(id), post };
            let decoded = Message::decode(&message.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, message);
        }
    }
}
