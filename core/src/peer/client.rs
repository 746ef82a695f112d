//! Peer client
//!
//! Owns one durable relay connection. A reader task decodes inbound frames
//! and resolves pending requests; a writer task drains the outbound queue.
//! User actions register with the tracker, go out with the allocated id and
//! suspend until the relay answers or the request timeout elapses.

use super::config::PeerConfig;
use super::pending::{FailureReason, PendingTracker, RequestStatus};
use super::selector::{LatencyRace, WsProber};
use super::session::PeerSession;
use crate::types::{ContentItem, Post, RequestId};
use crate::wire::{CreateSpaceRequest, Handshake, Message};
use crate::{Error, Result};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Latest known posts for the current space
type Snapshot = Arc<Vec<Post>>;

/// Put a new post at the head of the live snapshot and the session copy
async fn prepend_post(
    session: &Mutex<PeerSession>,
    snapshot: &watch::Sender<Snapshot>,
    post: Post,
) {
    session.lock().await.push_recent_post(post.clone());
    snapshot.send_modify(|snapshot| {
        let mut posts = Vec::with_capacity(snapshot.len() + 1);
        posts.push(post);
        posts.extend(snapshot.iter().cloned());
        *snapshot = Arc::new(posts);
    });
}

/// Handles frames arriving from the relay
struct Inbound {
    tracker: Arc<PendingTracker>,
    session: Arc<Mutex<PeerSession>>,
    snapshot: Arc<watch::Sender<Snapshot>>,
    // Bumped once per PostList, never by pushed posts
    post_lists: Arc<watch::Sender<u64>>,
    outbound: mpsc::UnboundedSender<WsMessage>,
}

impl Inbound {
    async fn handle(&self, frame: &[u8]) {
        let message = match Message::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame from relay");
                return;
            }
        };

        match message {
            Message::Ping => {
                if let Ok(pong) = Message::Pong.encode() {
                    let _ = self.outbound.send(WsMessage::Binary(pong.to_vec()));
                }
            }
            Message::Pong => debug!("Received pong"),
            Message::Ack { id } => {
                self.tracker.complete(id).await;
            }
            Message::Error { id, reason } => {
                warn!(request_id = %id, ?reason, "Relay rejected request");
                self.tracker.fail(id, FailureReason::Relay(reason)).await;
            }
            Message::SpaceError { id, reason } => {
                warn!(request_id = %id, ?reason, "Relay rejected space");
                self.tracker.fail(id, FailureReason::Space(reason)).await;
            }
            Message::PostList { posts } => {
                debug!(count = posts.len(), "Received post list");
                self.session.lock().await.set_recent_posts(posts.clone());
                self.snapshot.send_replace(Arc::new(posts));
                self.post_lists.send_modify(|count| *count = count.wrapping_add(1));
            }
            Message::Post { id, post } if id.is_unsolicited() => {
                debug!(author = %post.author, space = %post.space, "Received pushed post");
                prepend_post(&self.session, &self.snapshot, post).await;
            }
            other => {
                debug!(ty = ?other.message_type(), "Ignoring unexpected frame from relay")
            }
        }
    }
}

/// A peer connected to one relay
pub struct Peer {
    relay: String,
    config: PeerConfig,
    session: Arc<Mutex<PeerSession>>,
    tracker: Arc<PendingTracker>,
    snapshot: Arc<watch::Sender<Snapshot>>,
    post_lists: Arc<watch::Sender<u64>>,
    outbound: mpsc::UnboundedSender<WsMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Peer {
    /// Connect to the remembered relay, or race the candidates for the closest one
    pub async fn connect(mut session: PeerSession, config: PeerConfig) -> Result<Self> {
        if let Some(relay) = session.best_relay().map(str::to_owned) {
            match tokio_tungstenite::connect_async(relay.as_str()).await {
                Ok((ws, _)) => return Self::start(ws, relay, session, config).await,
                Err(e) => {
                    warn!(%relay, error = %e, "Remembered relay unreachable, racing candidates");
                    session.set_best_relay(None);
                }
            }
        }

        let race = LatencyRace::new(WsProber, config.probe_timeout);
        let relay = race
            .choose(None, &config.relay_candidates, &config.default_relay)
            .await?;
        session.set_best_relay(Some(relay.clone()));
        session.save()?;

        let (ws, _) = tokio_tungstenite::connect_async(relay.as_str()).await?;
        Self::start(ws, relay, session, config).await
    }

    /// Connect to a specific relay without racing or remembering it
    pub async fn connect_to(relay: &str, session: PeerSession, config: PeerConfig) -> Result<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(relay).await?;
        Self::start(ws, relay.to_string(), session, config).await
    }

    async fn start(
        ws: WsStream,
        relay: String,
        session: PeerSession,
        config: PeerConfig,
    ) -> Result<Self> {
        info!(%relay, name = %session.display_name(), "Connected to relay");

        let (mut sink, mut stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, WsMessage::Close(_));
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "Relay write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let (snapshot, _) = watch::channel(Arc::new(session.recent_posts().to_vec()));
        let snapshot = Arc::new(snapshot);
        let (post_lists, _) = watch::channel(0u64);
        let post_lists = Arc::new(post_lists);
        let session = Arc::new(Mutex::new(session));
        let tracker = Arc::new(PendingTracker::new());

        let inbound = Inbound {
            tracker: Arc::clone(&tracker),
            session: Arc::clone(&session),
            snapshot: Arc::clone(&snapshot),
            post_lists: Arc::clone(&post_lists),
            outbound: outbound.clone(),
        };
        let reader_relay = relay.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Binary(data)) => inbound.handle(&data).await,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(relay = %reader_relay, error = %e, "Relay connection failed");
                        break;
                    }
                }
            }
            info!(relay = %reader_relay, "Relay connection closed");
        });

        let peer = Self {
            relay,
            config,
            session,
            tracker,
            snapshot,
            post_lists,
            outbound,
            reader,
            writer,
        };

        // Aborting the reader drops its sender clone so the writer can finish
        match peer.handshake().await {
            Ok(RequestStatus::Completed) => Ok(peer),
            Ok(status) => {
                peer.reader.abort();
                Err(Error::Network(format!("Handshake not acknowledged: {:?}", status)))
            }
            Err(e) => {
                peer.reader.abort();
                Err(e)
            }
        }
    }

    /// Announce our public key and current space
    async fn handshake(&self) -> Result<RequestStatus> {
        let handshake = {
            let session = self.session.lock().await;
            Handshake {
                public_key: session.peer_key(),
                space: session.space().to_string(),
            }
        };
        let body = Bytes::from(handshake.space.clone().into_bytes());
        self.request(body, |id| Message::Handshake { id, handshake }, self.config.request_timeout)
            .await
    }

    /// Register a request, send it and wait for its outcome
    async fn request<F>(&self, payload: Bytes, build: F, timeout: Duration) -> Result<RequestStatus>
    where
        F: FnOnce(RequestId) -> Message,
    {
        let id = self.tracker.submit(payload).await;
        if let Err(e) = self.send(&build(id)) {
            self.tracker.forget(id).await;
            return Err(e);
        }
        self.tracker.await_outcome(id, timeout).await
    }

    fn send(&self, message: &Message) -> Result<()> {
        let frame = message.encode()?;
        self.outbound
            .send(WsMessage::Binary(frame.to_vec()))
            .map_err(|_| Error::Network("Relay connection closed".to_string()))
    }

    /// Post to the current space
    pub async fn post(&self, content: Vec<ContentItem>) -> Result<RequestStatus> {
        let post = {
            let session = self.session.lock().await;
            Post::new(session.display_name(), session.space(), content)
        };
        let body = Bytes::from(serde_json::to_vec(&post)?);

        let build = |id| Message::Post { id, post: post.clone() };
        let status = self.request(body, build, self.config.request_timeout).await?;

        if status == RequestStatus::Completed {
            prepend_post(&self.session, &self.snapshot, post).await;
        }
        Ok(status)
    }

    /// Create a space with its first post
    pub async fn create_space(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        content: Vec<ContentItem>,
    ) -> Result<RequestStatus> {
        let request = CreateSpaceRequest {
            name: name.into(),
            description,
            author: self.session.lock().await.display_name().to_string(),
            content,
        };
        let body = Bytes::from(serde_json::to_vec(&request)?);
        self.request(body, |id| Message::CreateSpace { id, request }, self.config.request_timeout)
            .await
    }

    /// Move to another space and re-announce ourselves to the relay
    pub async fn switch_space(&self, space: impl Into<String>) -> Result<RequestStatus> {
        {
            let mut session = self.session.lock().await;
            session.set_space(space);
            session.set_recent_posts(Vec::new());
        }
        self.snapshot.send_replace(Arc::new(Vec::new()));
        self.handshake().await
    }

    /// Recent posts of the current space.
    ///
    /// Asks the relay for a fresh list and waits up to the sync timeout for
    /// the next PostList; pushed posts arriving meanwhile do not end the wait.
    /// Falls back to the last snapshot when the relay does not answer.
    pub async fn recent_posts(&self) -> Vec<Post> {
        let mut lists = self.post_lists.subscribe();
        let space = self.session.lock().await.space().to_string();

        match self.send(&Message::GetPosts { space: Some(space) }) {
            Ok(()) => {
                match tokio::time::timeout(self.config.sync_timeout, lists.changed()).await {
                    Ok(Ok(())) => {
                        if let Err(e) = self.save_session().await {
                            warn!(error = %e, "Failed to save post snapshot");
                        }
                    }
                    _ => debug!("No fresh post list, serving cached snapshot"),
                }
            }
            Err(e) => debug!(error = %e, "Offline, serving cached snapshot"),
        }

        let posts: Vec<Post> = self.snapshot.borrow().iter().cloned().collect();
        posts
    }

    /// Relay this peer is connected to
    pub fn relay(&self) -> &str {
        &self.relay
    }

    pub fn session(&self) -> &Arc<Mutex<PeerSession>> {
        &self.session
    }

    /// Persist the session file
    pub async fn save_session(&self) -> Result<()> {
        self.session.lock().await.save()
    }

    /// Close the connection and persist the session
    pub async fn disconnect(self) -> Result<()> {
        let _ = self.outbound.send(WsMessage::Close(None));
        drop(self.outbound);
        if tokio::time::timeout(Duration::from_secs(1), self.writer).await.is_err() {
            debug!("Writer did not finish closing in time");
        }
        self.reader.abort();

        let session = self.session.lock().await;
        session.save()?;
        info!(relay = %self.relay, "Disconnected from relay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn text_post(author: &str, text: &str) -> Post {
        Post::new(author, "root", vec![ContentItem::text(text)])
    }

    fn binary(message: &Message) -> WsMessage {
        WsMessage::Binary(message.encode().unwrap().to_vec())
    }

    /// Relay stand-in for one peer. Acks handshakes and posts without a
    /// welcome list; answers GetPosts with a pushed post first and `list`
    /// only after `delay`.
    async fn scripted_relay(list: Vec<Post>, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                let WsMessage::Binary(data) = frame else {
                    continue;
                };
                match Message::decode(&data).unwrap() {
                    Message::Handshake { id, .. } | Message::Post { id, .. } => {
                        ws.send(binary(&Message::Ack { id })).await.unwrap();
                    }
                    Message::GetPosts { .. } => {
                        let pushed = Message::Post {
                            id: RequestId::UNSOLICITED,
                            post: text_post("bob", "pushed"),
                        };
                        ws.send(binary(&pushed)).await.unwrap();
                        tokio::time::sleep(delay).await;
                        let answer = Message::PostList { posts: list.clone() };
                        ws.send(binary(&answer)).await.unwrap();
                    }
                    _ => {}
                }
            }
        });
        format!("ws://{}", addr)
    }

    async fn connect(relay: &str, sync_timeout: Duration) -> Peer {
        let config = PeerConfig {
            sync_timeout,
            ..PeerConfig::default()
        };
        Peer::connect_to(relay, PeerSession::ephemeral("alice"), config).await.unwrap()
    }

    #[tokio::test]
    async fn test_recent_posts_waits_past_pushed_post_for_list() {
        let list = vec![text_post("a", "3"), text_post("b", "2"), text_post("c", "1")];
        let relay = scripted_relay(list.clone(), Duration::from_millis(200)).await;
        let peer = connect(&relay, Duration::from_secs(3)).await;

        let posts = peer.recent_posts().await;
        assert_eq!(posts, list);
        assert_eq!(peer.session().lock().await.recent_posts(), list.as_slice());

        peer.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_pushed_post_reaches_session_snapshot() {
        let relay = scripted_relay(vec![], Duration::from_secs(5)).await;
        let peer = connect(&relay, Duration::from_millis(300)).await;

        // No list within the sync timeout, so only the pushed post is known
        let posts = peer.recent_posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].content, vec![ContentItem::text("pushed")]);

        let session = peer.session().lock().await;
        assert_eq!(session.recent_posts(), posts.as_slice());
    }

    #[tokio::test]
    async fn test_acknowledged_post_reaches_session_snapshot() {
        let relay = scripted_relay(vec![], Duration::from_secs(5)).await;
        let peer = connect(&relay, Duration::from_secs(1)).await;

        let status = peer.post(vec![ContentItem::text("mine")]).await.unwrap();
        assert_eq!(status, RequestStatus::Completed);

        let session = peer.session().lock().await;
        assert_eq!(session.recent_posts().len(), 1);
        assert_eq!(session.recent_posts()[0].author, "alice");
        assert_eq!(session.recent_posts()[0].content, vec![ContentItem::text("mine")]);
    }
}
