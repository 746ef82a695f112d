//! Peer configuration

use std::time::Duration;

/// Relay every fresh installation can fall back to
pub const DEFAULT_RELAY: &str = "ws://127.0.0.1:8080";

/// Space peers join unless told otherwise
pub const DEFAULT_SPACE: &str = "root";

/// Peer client configuration
#[derive(Clone, Debug)]
pub struct PeerConfig {
    /// Relays raced when no choice is remembered
    pub relay_candidates: Vec<String>,
    /// Used when the candidate list is empty
    pub default_relay: String,
    /// Upper bound for one latency probe
    pub probe_timeout: Duration,
    /// Wait for Ack/Error on handshake, post and create-space
    pub request_timeout: Duration,
    /// Wait for a fresh post list before serving the cached snapshot
    pub sync_timeout: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            relay_candidates: vec![DEFAULT_RELAY.to_string()],
            default_relay: DEFAULT_RELAY.to_string(),
            probe_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            sync_timeout: Duration::from_secs(1),
        }
    }
}
