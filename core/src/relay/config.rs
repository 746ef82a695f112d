//! Relay configuration

use crate::peer::DEFAULT_SPACE;
use std::net::SocketAddr;
use std::time::Duration;

/// Relay server configuration
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to
    pub listen_addr: SocketAddr,
    /// How long a cached post list is served before the store is queried again
    pub cache_ttl: Duration,
    /// Posts returned per list
    pub page_size: usize,
    /// Maximum edit distance for two space names to count as similar
    pub similarity_distance: usize,
    /// Number of similar names at which a new space is rejected
    pub similarity_cap: usize,
    /// Space seeded at startup
    pub default_space: String,
    /// Interval between statistics log lines
    pub stats_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            cache_ttl: Duration::from_secs(5),
            page_size: 10,
            similarity_distance: 3,
            similarity_cap: 5,
            default_space: DEFAULT_SPACE.to_string(),
            stats_interval: Duration::from_secs(60), // 1 minute
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.cache_ttl, Duration::from_secs(5));
        assert_eq!(config.page_size, 10);
        assert_eq!(config.similarity_distance, 3);
        assert_eq!(config.similarity_cap, 5);
        assert_eq!(config.default_space, "root");
    }
}
