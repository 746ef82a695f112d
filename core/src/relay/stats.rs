//! Relay counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Running totals reported periodically by the relay binary
#[derive(Debug)]
pub struct RelayStats {
    started: Instant,
    frames: AtomicU64,
    frames_dropped: AtomicU64,
    connections: AtomicU64,
    posts_accepted: AtomicU64,
    posts_rejected: AtomicU64,
    spaces_created: AtomicU64,
    spaces_rejected: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub frames_dropped: u64,
    pub connections: u64,
    pub posts_accepted: u64,
    pub posts_rejected: u64,
    pub spaces_created: u64,
    pub spaces_rejected: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            frames: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            posts_accepted: AtomicU64::new(0),
            posts_rejected: AtomicU64::new(0),
            spaces_created: AtomicU64::new(0),
            spaces_rejected: AtomicU64::new(0),
        }
    }

    pub fn record_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_post(&self, accepted: bool) {
        let counter = if accepted { &self.posts_accepted } else { &self.posts_rejected };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_space(&self, created: bool) {
        let counter = if created { &self.spaces_created } else { &self.spaces_rejected };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            posts_accepted: self.posts_accepted.load(Ordering::Relaxed),
            posts_rejected: self.posts_rejected.load(Ordering::Relaxed),
            spaces_created: self.spaces_created.load(Ordering::Relaxed),
            spaces_rejected: self.spaces_rejected.load(Ordering::Relaxed),
        }
    }

    /// Log a summary line per counter group
    pub fn log_summary(&self, open_connections: usize) {
        let s = self.snapshot();
        info!("Relay statistics:");
        info!("  Uptime: {:?}", self.started.elapsed());
        info!("  Open connections: {} ({} total)", open_connections, s.connections);
        info!("  Frames: {} ({} dropped)", s.frames, s.frames_dropped);
        info!("  Posts: {} accepted, {} rejected", s.posts_accepted, s.posts_rejected);
        info!("  Spaces: {} created, {} rejected", s.spaces_created, s.spaces_rejected);
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = RelayStats::new();
        stats.record_frame();
        stats.record_frame();
        stats.record_dropped();
        stats.record_post(true);
        stats.record_post(false);
        stats.record_space(true);

        let s = stats.snapshot();
        assert_eq!(s.frames, 2);
        assert_eq!(s.frames_dropped, 1);
        assert_eq!(s.posts_accepted, 1);
        assert_eq!(s.posts_rejected, 1);
        assert_eq!(s.spaces_created, 1);
        assert_eq!(s.spaces_rejected, 0);
    }
}
