//! Closest-relay selection
//!
//! There is no relay directory. The peer opens a throwaway connection to
//! every candidate at once, sends a Ping and times the matching Pong. A probe
//! that errors or exceeds its timeout counts as unreachable; it never aborts
//! the race. The lowest finite latency wins.

use crate::wire::{Message, MessageType};
use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Measures round-trip latency to one endpoint
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, endpoint: &str) -> Result<Duration>;
}

/// Ping/Pong over a transient WebSocket connection
#[derive(Clone, Copy, Debug, Default)]
pub struct WsProber;

#[async_trait]
impl Prober for WsProber {
    async fn probe(&self, endpoint: &str) -> Result<Duration> {
        let start = Instant::now();
        let (mut ws, _response) = tokio_tungstenite::connect_async(endpoint).await?;

        ws.send(WsMessage::Binary(Message::Ping.encode()?.to_vec())).await?;

        while let Some(frame) = ws.next().await {
            match frame? {
                WsMessage::Binary(data) if data.first() == Some(&MessageType::Pong.as_byte()) => {
                    let latency = start.elapsed();
                    let _ = ws.close(None).await;
                    return Ok(latency);
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }

        Err(Error::Network(format!("{} closed before answering ping", endpoint)))
    }
}

/// One relay measured during a race
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayCandidate {
    pub endpoint: String,
    /// `None` when the probe failed or timed out
    pub latency: Option<Duration>,
}

/// Races latency probes across candidate relays
pub struct LatencyRace<P = WsProber> {
    prober: Arc<P>,
    probe_timeout: Duration,
}

impl<P: Prober> LatencyRace<P> {
    pub fn new(prober: P, probe_timeout: Duration) -> Self {
        Self {
            prober: Arc::new(prober),
            probe_timeout,
        }
    }

    /// Probe every candidate concurrently
    pub async fn measure(&self, candidates: &[String]) -> Vec<RelayCandidate> {
        let probes = candidates.iter().map(|endpoint| async move {
            let attempt = tokio::time::timeout(self.probe_timeout, self.prober.probe(endpoint));
            let latency = match attempt.await {
                Ok(Ok(latency)) => Some(latency),
                Ok(Err(e)) => {
                    warn!(%endpoint, error = %e, "Relay probe failed");
                    None
                }
                Err(_) => {
                    warn!(%endpoint, timeout = ?self.probe_timeout, "Relay probe timed out");
                    None
                }
            };
            debug!(%endpoint, ?latency, "Relay probe finished");
            RelayCandidate {
                endpoint: endpoint.clone(),
                latency,
            }
        });

        join_all(probes).await
    }

    /// Pick the fastest reachable relay
    pub async fn select(&self, candidates: &[String]) -> Result<String> {
        let measured = self.measure(candidates).await;
        let best = measured
            .into_iter()
            .filter_map(|c| c.latency.map(|latency| (latency, c.endpoint)))
            .min_by_key(|(latency, _)| *latency);

        match best {
            Some((latency, endpoint)) => {
                info!(%endpoint, ?latency, "Selected closest relay");
                Ok(endpoint)
            }
            None => Err(Error::NoReachableRelay),
        }
    }

    /// Reuse a remembered relay, fall back to the default for an empty list,
    /// otherwise race the candidates
    pub async fn choose(
        &self,
        remembered: Option<&str>,
        candidates: &[String],
        default_relay: &str,
    ) -> Result<String> {
        if let Some(relay) = remembered {
            debug!(%relay, "Reusing remembered relay");
            return Ok(relay.to_string());
        }
        if candidates.is_empty() {
            debug!(relay = %default_relay, "No candidates, using default relay");
            return Ok(default_relay.to_string());
        }
        self.select(candidates).await
    }
}
