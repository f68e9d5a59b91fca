//! Notifier Server
//!
//! Accepts WebSocket connections and pushes the notification record to each
//! client exactly once. Connections are handled on independent tasks that
//! share nothing but the immutable record.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::config::ServerConfig;
use crate::error::BridgeResult;
use crate::record::NotificationRecord;

pub struct NotifierServer {
    listener: TcpListener,
    record: Arc<NotificationRecord>,
}

impl NotifierServer {
    /// Bind the listener. The record defaults to [`NotificationRecord::phone_call`].
    pub async fn bind(config: &ServerConfig) -> BridgeResult<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        log::info!("[Notifier] Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            record: Arc::new(NotificationRecord::phone_call()),
        })
    }

    pub fn with_record(mut self, record: NotificationRecord) -> Self {
        self.record = Arc::new(record);
        self
    }

    pub fn local_addr(&self) -> BridgeResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever.
    pub async fn serve(self) -> BridgeResult<()> {
        self.serve_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves. Open connections are
    /// dropped on shutdown.
    pub async fn serve_until(self, shutdown: impl Future<Output = ()>) -> BridgeResult<()> {
        tokio::pin!(shutdown);

        let mut connections = JoinSet::new();
        let mut next_id: u64 = 0;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!(
                        "[Notifier] Shutting down ({} open connections)",
                        connections.len()
                    );
                    connections.shutdown().await;
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    // Reap finished handlers so the set does not grow unbounded.
                    while connections.try_join_next().is_some() {}

                    match accepted {
                        Ok((stream, peer)) => {
                            next_id += 1;
                            connections.spawn(handle_connection(
                                next_id,
                                stream,
                                peer,
                                self.record.clone(),
                            ));
                        }
                        Err(e) => {
                            log::warn!("[Notifier] Accept failed: {}", e);
                        }
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    record: Arc<NotificationRecord>,
) {
    let mut ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("[Notifier {}] Handshake with {} failed: {}", id, peer, e);
            return;
        }
    };
    log::info!("[Notifier {}] Client connected from {}", id, peer);

    if let Err(e) = push_record(&mut ws, &record).await {
        log::warn!("[Notifier {}] Dropping notification: {}", id, e);
        return;
    }
    log::debug!("[Notifier {}] Notification sent", id);

    // Nothing is expected from the client; keep reading so pings and the
    // closing handshake are answered.
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                log::debug!("[Notifier {}] Read error: {}", id, e);
                break;
            }
        }
    }

    log::info!("[Notifier {}] Connection ended", id);
}

async fn push_record(
    ws: &mut WebSocketStream<TcpStream>,
    record: &NotificationRecord,
) -> BridgeResult<()> {
    let json = record.to_json()?;
    ws.send(Message::Text(json.into())).await?;
    Ok(())
}
