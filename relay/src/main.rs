//! Subchat Relay Node
//!
//! Accepts peer WebSocket connections, stores posts per space and serves
//! recent posts from a short-lived cache.
//!
//! Features:
//! - Correlated Ack/Error replies for posts, handshakes and new spaces
//! - Near-duplicate space name rejection
//! - Push of accepted posts to peers in the same space
//! - Periodic statistics

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use subchat_core::relay::{RelayConfig, RelayServer};
use subchat_core::storage::DocumentStore;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "subchat-relay")]
#[command(about = "Subchat relay server", long_about = None)]
struct Args {
    /// Interface to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// RocksDB directory; posts are kept in memory when omitted
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Seconds a cached post list stays fresh
    #[arg(long, default_value_t = 5)]
    cache_ttl_secs: u64,

    /// Space created at startup
    #[arg(long, default_value = "root")]
    default_space: String,

    /// Seconds between statistics reports
    #[arg(long, default_value_t = 60)]
    stats_interval_secs: u64,
}

impl Args {
    fn relay_config(&self) -> Result<RelayConfig> {
        let listen_addr: SocketAddr = format!("{}:{}", self.host, self.port).parse()?;
        Ok(RelayConfig {
            listen_addr,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            default_space: self.default_space.clone(),
            stats_interval: Duration::from_secs(self.stats_interval_secs),
            ..RelayConfig::default()
        })
    }
}

#[cfg(feature = "rocksdb")]
fn open_store(data_dir: Option<&PathBuf>) -> Result<Arc<dyn DocumentStore>> {
    use subchat_core::storage::{MemoryStore, RocksStore};

    match data_dir {
        Some(dir) => {
            info!("Opening RocksDB store at {}", dir.display());
            Ok(Arc::new(RocksStore::open(dir)?))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(not(feature = "rocksdb"))]
fn open_store(data_dir: Option<&PathBuf>) -> Result<Arc<dyn DocumentStore>> {
    use subchat_core::storage::MemoryStore;

    if let Some(dir) = data_dir {
        warn!(
            "Built without the rocksdb feature, ignoring --data-dir {} and keeping posts in memory",
            dir.display()
        );
    }
    Ok(Arc::new(MemoryStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Starting {} relay", subchat_core::version_string());

    let config = args.relay_config()?;
    let store = open_store(args.data_dir.as_ref())?;
    let server = RelayServer::bind(config, store).await?;

    // Stats reporting
    let dispatcher = Arc::clone(server.dispatcher());
    let stats_interval = server.config().stats_interval;
    let stats_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(stats_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            dispatcher.stats().log_summary(dispatcher.connection_count());
        }
    });

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                warn!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    stats_task.abort();
    info!("Relay server shut down gracefully");
    Ok(())
}
