//! Relay side of the protocol
//!
//! A relay accepts peer connections, routes their frames, persists posts in
//! a document store and serves recent posts from a TTL cache.

pub mod cache;
pub mod config;
pub mod dedup;
pub mod dispatcher;
pub mod server;
pub mod spaces;
pub mod stats;

pub use cache::{CachedPostList, ContentCache};
pub use config::RelayConfig;
pub use dedup::{levenshtein, TopicDeduplicator};
pub use dispatcher::{ConnectionState, Dispatcher};
pub use server::RelayServer;
pub use spaces::{validate_name, CreateSpaceError, SpaceDirectory};
pub use stats::{RelayStats, StatsSnapshot};
