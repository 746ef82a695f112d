//! Core types and identifiers used throughout the system

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Width of a request identifier on the wire, in bytes
pub const REQUEST_ID_LEN: usize = 4;

/// Length of the public key carried in a handshake
pub const PUBLIC_KEY_LEN: usize = 32;

/// Correlation identifier linking a request frame to its Ack/Error
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u32);

impl RequestId {
    /// Reserved for frames the relay pushes without a matching request
    pub const UNSOLICITED: RequestId = RequestId(0);

    pub fn to_bytes(self) -> [u8; REQUEST_ID_LEN] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; REQUEST_ID_LEN]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub fn is_unsolicited(&self) -> bool {
        *self == Self::UNSOLICITED
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({:08x})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Live relay connection identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// Peer identity announced at handshake (Ed25519 public key)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerKey(pub [u8; PUBLIC_KEY_LEN]);

impl PeerKey {
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerKey({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Formatting applied to a text item
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug)]
#[serde(rename_all = "lowercase")]
pub enum TextAttribute {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
}

/// Media types a post may reference
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum MediaKind {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/jpg")]
    Jpg,
    #[serde(rename = "image/webp")]
    Webp,
    #[serde(rename = "video/mp4")]
    Mp4,
    #[serde(rename = "video/webp")]
    WebpVideo,
}

/// One displayable element of a post
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContentItem {
    /// Formatted text
    Text {
        #[serde(default)]
        attributes: BTreeSet<TextAttribute>,
        text: String,
    },
    /// Reference to uploaded media
    Media {
        #[serde(rename = "mediaKind")]
        media_kind: MediaKind,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },
}

impl ContentItem {
    /// Plain, unformatted text
    pub fn text(text: impl Into<String>) -> Self {
        ContentItem::Text {
            attributes: BTreeSet::new(),
            text: text.into(),
        }
    }
}

/// A post in a space
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Display name of the author
    pub author: String,

    /// Space this post belongs to
    pub space: String,

    /// Items in display order
    pub content: Vec<ContentItem>,

    /// Milliseconds since the Unix epoch
    pub created_at: u64,
}

impl Post {
    pub fn new(
        author: impl Into<String>,
        space: impl Into<String>,
        content: Vec<ContentItem>,
    ) -> Self {
        Self {
            author: author.into(),
            space: space.into(),
            content,
            created_at: now_millis(),
        }
    }
}

/// A named conversation partition
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    /// Unique human key, immutable once accepted
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Existing names close to this one; advisory only
    #[serde(default)]
    pub similar_spaces: BTreeSet<String>,

    /// Milliseconds since the Unix epoch
    pub created_at: u64,
}

/// Current time in milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_big_endian() {
        let id = RequestId(0x0102_0304);
        assert_eq!(id.to_bytes(), [1, 2, 3, 4]);
        assert_eq!(RequestId::from_bytes([1, 2, 3, 4]), id);
        assert_eq!(id.to_string(), "01020304");
    }

    #[test]
    fn test_content_item_json_shape() {
        let item = ContentItem::Text {
            attributes: [TextAttribute::Bold, TextAttribute::Code].into_iter().collect(),
            text: "hi".into(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["attributes"], serde_json::json!(["bold", "code"]));

        let media = ContentItem::Media {
            media_kind: MediaKind::Mp4,
            url: "https://cdn.example/v.mp4".into(),
            title: None,
            description: None,
            size: Some(42),
        };
        let json = serde_json::to_value(&media).unwrap();
        assert_eq!(json["kind"], "media");
        assert_eq!(json["mediaKind"], "video/mp4");
        assert!(json.get("title").is_none());
    }

    #[test]
    fn test_post_uses_camel_case() {
        let post = Post::new("x", "root", vec![ContentItem::text("hi")]);
        let json = serde_json::to_value(&post).unwrap();
        assert!(json.get("createdAt").is_some());
    }
}
