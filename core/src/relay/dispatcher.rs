//! Frame dispatch
//!
//! Every inbound frame is decoded and routed by its tag. Handlers that only
//! touch the connection registry answer inline; handlers that hit the store
//! or the cache run on their own task so a slow query never stalls the
//! connection's read loop. Replies go to the connection's outbound queue; a
//! connection that has closed in the meantime simply gets nothing, while the
//! store work it triggered still completes.

use super::cache::ContentCache;
use super::config::RelayConfig;
use super::dedup::TopicDeduplicator;
use super::spaces::{CreateSpaceError, SpaceDirectory};
use super::stats::RelayStats;
use crate::storage::{DocumentStore, StorePath};
use crate::types::{now_millis, ConnectionId, PeerKey, Post, RequestId};
use crate::wire::{CreateSpaceRequest, ErrorReason, Handshake, Message};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lifecycle of a peer connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport is up, no handshake seen yet
    Connecting,
    /// Handshake accepted; receives pushes for its space
    Open,
}

/// Registry entry for one live connection
#[derive(Debug)]
struct ConnectionHandle {
    tx: mpsc::UnboundedSender<Bytes>,
    public_key: Option<PeerKey>,
    space: Option<String>,
    state: ConnectionState,
}

/// Routes decoded frames to their handlers
pub struct Dispatcher {
    store: Arc<dyn DocumentStore>,
    cache: ContentCache,
    spaces: SpaceDirectory,
    connections: DashMap<ConnectionId, ConnectionHandle>,
    default_space: String,
    stats: RelayStats,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn DocumentStore>, config: &RelayConfig) -> Arc<Self> {
        let dedup = TopicDeduplicator::new(config.similarity_distance, config.similarity_cap);
        Arc::new(Self {
            cache: ContentCache::new(Arc::clone(&store), config.cache_ttl, config.page_size),
            spaces: SpaceDirectory::new(Arc::clone(&store), dedup),
            store,
            connections: DashMap::new(),
            default_space: config.default_space.clone(),
            stats: RelayStats::new(),
        })
    }

    pub fn spaces(&self) -> &SpaceDirectory {
        &self.spaces
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Number of spaces currently holding a cache slot
    pub fn cached_spaces(&self) -> usize {
        self.cache.len()
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// State of a connection, `None` once it has closed
    pub fn connection_state(&self, conn: ConnectionId) -> Option<ConnectionState> {
        self.connections.get(&conn).map(|handle| handle.state)
    }

    /// Register a new connection; the receiver yields encoded reply frames
    pub fn open_connection(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Bytes>) {
        let conn = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(
            conn,
            ConnectionHandle {
                tx,
                public_key: None,
                space: None,
                state: ConnectionState::Connecting,
            },
        );
        self.stats.record_connection();
        debug!(%conn, "Connection registered");
        (conn, rx)
    }

    /// Forget a connection; later replies to it are dropped
    pub fn close_connection(&self, conn: ConnectionId) {
        if let Some((_, handle)) = self.connections.remove(&conn) {
            debug!(%conn, key = ?handle.public_key, space = ?handle.space, "Connection removed");
        }
    }

    /// Decode one frame and route it
    pub fn dispatch(self: &Arc<Self>, conn: ConnectionId, frame: &[u8]) {
        self.stats.record_frame();
        let message = match Message::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                self.stats.record_dropped();
                debug!(%conn, error = %e, "Dropping malformed frame");
                return;
            }
        };

        match message {
            Message::Ping => self.reply(conn, &Message::Pong),
            Message::Handshake { id, handshake } => self.handle_handshake(conn, id, handshake),
            Message::Post { id, post } => {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.handle_post(conn, id, post).await });
            }
            Message::GetPosts { space } => {
                let space = space
                    .or_else(|| self.connections.get(&conn).and_then(|h| h.space.clone()))
                    .unwrap_or_else(|| self.default_space.clone());
                let this = Arc::clone(self);
                tokio::spawn(async move { this.send_post_list(conn, &space).await });
            }
            Message::CreateSpace { id, request } => {
                let this = Arc::clone(self);
                tokio::spawn(async move { this.handle_create_space(conn, id, request).await });
            }
            other => {
                debug!(%conn, ty = ?other.message_type(), "Ignoring frame not meant for a relay")
            }
        }
    }

    fn handle_handshake(self: &Arc<Self>, conn: ConnectionId, id: RequestId, handshake: Handshake) {
        let space = handshake.space;
        match self.connections.get_mut(&conn) {
            Some(mut handle) => {
                handle.public_key = Some(handshake.public_key);
                handle.space = Some(space.clone());
                handle.state = ConnectionState::Open;
            }
            None => return,
        }
        info!(%conn, key = %handshake.public_key, %space, "Peer joined space");
        self.reply(conn, &Message::Ack { id });

        let this = Arc::clone(self);
        tokio::spawn(async move { this.send_post_list(conn, &space).await });
    }

    async fn handle_post(&self, conn: ConnectionId, id: RequestId, mut post: Post) {
        if post.space.is_empty() || post.author.is_empty() {
            self.stats.record_post(false);
            self.reply(conn, &Message::Error { id, reason: ErrorReason::InvalidPost });
            return;
        }

        match self.spaces.exists(&post.space).await {
            Ok(true) => {}
            Ok(false) => {
                self.stats.record_post(false);
                debug!(%conn, space = %post.space, "Post to unknown space");
                self.reply(conn, &Message::Error { id, reason: ErrorReason::NonExistentSpace });
                return;
            }
            Err(e) => {
                self.stats.record_post(false);
                warn!(%conn, error = %e, "Space lookup failed");
                self.reply(conn, &Message::Error { id, reason: ErrorReason::StoreUnavailable });
                return;
            }
        }

        post.created_at = now_millis();
        let stored = match serde_json::to_value(&post) {
            Ok(document) => self.store.append(&StorePath::posts(&post.space), document).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = stored {
            self.stats.record_post(false);
            warn!(%conn, error = %e, "Failed to store post");
            self.reply(conn, &Message::Error { id, reason: ErrorReason::StoreUnavailable });
            return;
        }

        self.stats.record_post(true);
        self.cache.invalidate(&post.space);
        self.reply(conn, &Message::Ack { id });
        self.broadcast(conn, post);
    }

    async fn handle_create_space(
        &self,
        conn: ConnectionId,
        id: RequestId,
        request: CreateSpaceRequest,
    ) {
        match self.spaces.create_space(request).await {
            Ok(space) => {
                self.stats.record_space(true);
                self.cache.invalidate(&space.name);
                self.reply(conn, &Message::Ack { id });
            }
            Err(CreateSpaceError::Rejected(reason)) => {
                self.stats.record_space(false);
                debug!(%conn, ?reason, "Space rejected");
                self.reply(conn, &Message::SpaceError { id, reason });
            }
            Err(CreateSpaceError::Store(e)) => {
                self.stats.record_space(false);
                warn!(%conn, error = %e, "Failed to create space");
                self.reply(conn, &Message::Error { id, reason: ErrorReason::StoreUnavailable });
            }
        }
    }

    /// Reply with the newest posts of `space`; unknown spaces get an empty
    /// list and never take a cache slot.
    async fn send_post_list(&self, conn: ConnectionId, space: &str) {
        let known = if self.cache.contains(space) {
            true
        } else {
            match self.spaces.exists(space).await {
                Ok(exists) => exists,
                Err(e) => {
                    warn!(%conn, %space, error = %e, "Space lookup failed");
                    false
                }
            }
        };
        let posts = if known {
            self.cache.get(space).await.as_ref().clone()
        } else {
            debug!(%conn, %space, "Post list for unknown space");
            Vec::new()
        };
        self.reply(conn, &Message::PostList { posts });
    }

    /// Push an accepted post to every other open connection in its space
    fn broadcast(&self, origin: ConnectionId, post: Post) {
        let space = post.space.clone();
        let frame = match (Message::Post { id: RequestId::UNSOLICITED, post }).encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to encode pushed post");
                return;
            }
        };

        let mut delivered = 0usize;
        for entry in self.connections.iter() {
            let handle = entry.value();
            if *entry.key() == origin
                || handle.state != ConnectionState::Open
                || handle.space.as_deref() != Some(space.as_str())
            {
                continue;
            }
            if handle.tx.send(frame.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(%space, delivered, "Pushed post to subscribers");
    }

    fn reply(&self, conn: ConnectionId, message: &Message) {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%conn, error = %e, "Failed to encode reply");
                return;
            }
        };
        match self.connections.get(&conn) {
            Some(handle) => {
                let _ = handle.tx.send(frame);
            }
            None => {
                debug!(%conn, ty = ?message.message_type(), "Connection closed, dropping reply")
            }
        }
    }
}
