//! WebSocket relay server
//!
//! Accepts WebSocket upgrades and gives every connection a reader loop that
//! feeds the dispatcher and a writer task that drains its reply queue.

use super::config::RelayConfig;
use super::dispatcher::Dispatcher;
use crate::storage::DocumentStore;
use crate::Result;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Relay bound to its listen address
pub struct RelayServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    config: RelayConfig,
}

impl RelayServer {
    /// Seed the default space and bind the listener
    pub async fn bind(config: RelayConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let dispatcher = Dispatcher::new(store, &config);
        dispatcher.spaces().ensure_space(&config.default_space).await?;

        let listener = TcpListener::bind(config.listen_addr).await?;
        info!("Listening on: ws://{}", listener.local_addr()?);

        Ok(Self {
            listener,
            dispatcher,
            config,
        })
    }

    /// Address actually bound, useful when binding port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<()> {
        info!("Relay server running...");
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(async move {
                if let Err(e) = serve_connection(dispatcher, stream, addr).await {
                    debug!(%addr, error = %e, "Connection ended with error");
                }
            });
        }
    }
}

async fn serve_connection(
    dispatcher: Arc<Dispatcher>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();
    let (conn, mut replies) = dispatcher.open_connection();
    info!(%conn, %addr, "Peer connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = replies.recv().await {
            if let Err(e) = sink.send(WsMessage::Binary(frame.to_vec())).await {
                debug!(%conn, error = %e, "Write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = source.next().await {
        match message {
            Ok(WsMessage::Binary(data)) => dispatcher.dispatch(conn, &data),
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Text(_)) => debug!(%conn, "Ignoring text frame"),
            Ok(_) => {}
            Err(e) => {
                debug!(%conn, error = %e, "Read failed");
                break;
            }
        }
    }

    // Removing the handle drops the reply sender, which ends the writer
    dispatcher.close_connection(conn);
    let _ = writer.await;
    info!(%conn, %addr, "Peer disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::wire::Message;

    #[tokio::test]
    async fn test_ping_over_websocket() {
        let config = RelayConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            ..RelayConfig::default()
        };
        let server = RelayServer::bind(config, Arc::new(MemoryStore::new())).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr)).await.unwrap();
        ws.send(WsMessage::Binary(Message::Ping.encode().unwrap().to_vec())).await.unwrap();

        loop {
            match ws.next().await.unwrap().unwrap() {
                WsMessage::Binary(data) => {
                    assert_eq!(Message::decode(&data).unwrap(), Message::Pong);
                    break;
                }
                _ => continue,
            }
        }
    }
}
