//! Client Bridge
//!
//! Opens one outbound WebSocket connection to the notifier and forwards every
//! text frame, parsed as JSON, into an inbound port.
//!
//! There is no reconnect and no backoff: once the connection ends the bridge
//! is closed and the port's sender is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message, client::IntoClientRequest};
use url::Url;

use crate::config::{ClientConfig, MalformedPolicy};
use crate::error::{BridgeError, BridgeResult};
use crate::port::PortSender;

const WS_CONNECTING: u8 = 0;
const WS_OPEN: u8 = 1;
const WS_CLOSED: u8 = 2;

/// Connection state, matching the browser WebSocket ready states the bridge
/// needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}

impl ReadyState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            WS_CONNECTING => ReadyState::Connecting,
            WS_OPEN => ReadyState::Open,
            _ => ReadyState::Closed,
        }
    }
}

/// Shared runtime for bridges started from synchronous code.
static BRIDGE_RUNTIME: once_cell::sync::Lazy<tokio::runtime::Runtime> =
    once_cell::sync::Lazy::new(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(2)
            .thread_name("phonecall-bridge")
            .build()
            .expect("Failed to build bridge runtime")
    });

pub struct ClientBridge {
    config: ClientConfig,
    port: PortSender,
}

impl ClientBridge {
    pub fn new(config: ClientConfig, port: PortSender) -> Self {
        Self { config, port }
    }

    /// Connect and spawn the read loop on the current runtime.
    ///
    /// Fails with [`BridgeError::Connection`] if the notifier cannot be
    /// reached or the handshake is rejected.
    pub async fn connect(self) -> BridgeResult<BridgeHandle> {
        let shared = Shared::new();

        let ws = match open(&self.config.url).await {
            Ok(ws) => ws,
            Err(e) => {
                log::error!("[Bridge] Connection to {} failed: {}", self.config.url, e);
                shared.set(WS_CLOSED);
                return Err(e);
            }
        };
        shared.set(WS_OPEN);

        let task = tokio::spawn(run_read_loop(
            ws,
            self.port,
            self.config.on_malformed,
            shared.clone(),
        ));

        Ok(BridgeHandle { shared, task })
    }

    /// Start the bridge in the background and return immediately, for
    /// callers without an async runtime. Connection errors are reported by
    /// [`BridgeHandle::join`] and the port closes without delivering.
    pub fn start(self) -> BridgeHandle {
        let shared = Shared::new();
        let task_shared = shared.clone();

        let task = BRIDGE_RUNTIME.spawn(async move {
            let ws = match open(&self.config.url).await {
                Ok(ws) => ws,
                Err(e) => {
                    log::error!("[Bridge] Connection to {} failed: {}", self.config.url, e);
                    task_shared.set(WS_CLOSED);
                    return Err(e);
                }
            };
            task_shared.set(WS_OPEN);

            run_read_loop(ws, self.port, self.config.on_malformed, task_shared).await
        });

        BridgeHandle { shared, task }
    }
}

#[derive(Clone)]
struct Shared {
    ready_state: Arc<AtomicU8>,
    delivered: Arc<AtomicUsize>,
}

impl Shared {
    fn new() -> Self {
        Self {
            ready_state: Arc::new(AtomicU8::new(WS_CONNECTING)),
            delivered: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn set(&self, state: u8) {
        self.ready_state.store(state, Ordering::SeqCst);
    }
}

/// Handle to a running bridge.
pub struct BridgeHandle {
    shared: Shared,
    task: JoinHandle<BridgeResult<usize>>,
}

impl BridgeHandle {
    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_raw(self.shared.ready_state.load(Ordering::SeqCst))
    }

    /// Number of values handed to the port so far.
    pub fn delivered(&self) -> usize {
        self.shared.delivered.load(Ordering::SeqCst)
    }

    /// Stop the bridge. The connection is dropped without a closing handshake.
    pub fn close(&self) {
        log::info!("[Bridge] Closing");
        self.task.abort();
        self.shared.set(WS_CLOSED);
    }

    /// Wait for the bridge to stop and return how many values it delivered.
    pub async fn join(self) -> BridgeResult<usize> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(self.shared.delivered.load(Ordering::SeqCst)),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

async fn open(url: &Url) -> BridgeResult<WebSocketStream<TcpStream>> {
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port_or_known_default().unwrap_or(80);
    let addr = format!("{}:{}", host, port);

    log::info!("[Bridge] Connecting TCP to {}", addr);
    let tcp_stream = TcpStream::connect(&addr)
        .await
        .map_err(tungstenite::Error::Io)?;

    let request = url.as_str().into_client_request()?;
    let (ws, response) = tokio_tungstenite::client_async(request, tcp_stream).await?;
    log::info!("[Bridge] Connected to {} (status: {})", url, response.status());

    Ok(ws)
}

async fn run_read_loop(
    mut ws: WebSocketStream<TcpStream>,
    port: PortSender,
    policy: MalformedPolicy,
    shared: Shared,
) -> BridgeResult<usize> {
    let result = forward_frames(&mut ws, &port, policy, &shared.delivered).await;
    shared.set(WS_CLOSED);

    match &result {
        Ok(delivered) => log::info!("[Bridge] Connection ended after {} deliveries", delivered),
        Err(e) => log::error!("[Bridge] Stopped: {}", e),
    }
    result
}

async fn forward_frames(
    ws: &mut WebSocketStream<TcpStream>,
    port: &PortSender,
    policy: MalformedPolicy,
    delivered: &AtomicUsize,
) -> BridgeResult<usize> {
    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => {
                log::debug!("[Bridge] Received text frame ({} bytes)", text.len());
                match serde_json::from_str::<Value>(text.as_str()) {
                    Ok(value) => {
                        port.send(value)?;
                        delivered.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        let err = BridgeError::deserialization(text.as_str(), e);
                        match policy {
                            MalformedPolicy::Skip => {
                                log::error!("[Bridge] Ignoring frame on `{}`: {}", port.name(), err)
                            }
                            MalformedPolicy::Terminate => return Err(err),
                        }
                    }
                }
            }
            Message::Binary(data) => {
                log::debug!("[Bridge] Skipping binary frame ({} bytes)", data.len());
            }
            Message::Close(frame) => {
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.to_string()))
                    .unwrap_or((1000, String::new()));
                log::info!("[Bridge] Received close: {} {}", code, reason);
                break;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    Ok(delivered.load(Ordering::SeqCst))
}
