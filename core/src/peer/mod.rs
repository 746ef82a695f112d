//! Peer side of the protocol
//!
//! Relay selection, request identifier allocation, pending-request tracking,
//! persisted session state and the connected client built on top of them.

pub mod client;
pub mod config;
pub mod ids;
pub mod pending;
pub mod selector;
pub mod session;

pub use client::Peer;
pub use config::{PeerConfig, DEFAULT_RELAY, DEFAULT_SPACE};
pub use ids::IdAllocator;
pub use pending::{FailureReason, PendingTracker, RequestStatus};
pub use selector::{LatencyRace, Prober, RelayCandidate, WsProber};
pub use session::PeerSession;
