//! Subchat Core Library
//!
//! Message correlation and request dispatch shared by subchat peers and relays.
//! Peers pick the closest relay with a latency race, exchange binary frames
//! over a WebSocket, and correlate every request with its acknowledgement
//! through compact numeric identifiers. Relays route frames to handlers,
//! persist posts in a document store and serve recent posts from a short-lived
//! cache.

pub mod crypto;
pub mod peer;
pub mod relay;
pub mod storage;
pub mod types;
pub mod version;
pub mod wire;

pub use types::*;
pub use version::{version_string, PROTOCOL_VERSION};
pub use wire::{DecodeError, Message, MessageType};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed frame: {0}")]
    Decode(#[from] DecodeError),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Network operation failed: {0}")]
    Network(String),

    #[error("No relay answered the latency probe")]
    NoReachableRelay,

    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("Session state invalid: {0}")]
    Session(String),

    #[error("Request {0} already has a waiter")]
    AlreadyAwaited(RequestId),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Network(err.to_string())
    }
}
