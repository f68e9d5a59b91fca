//! Phone-call push bridge
//!
//! A notifier server that pushes one JSON record to every WebSocket client,
//! and a client bridge that forwards received JSON values into a named
//! inbound port consumed by the rendering application.

mod client;
mod config;
mod error;
mod port;
mod record;
mod server;

pub use client::{BridgeHandle, ClientBridge, ReadyState};
pub use config::{
    ClientConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_URL, MalformedPolicy, ServerConfig,
};
pub use error::{BridgeError, BridgeResult};
pub use port::{PHONE_CALL_IN, PortReceiver, PortSender, inbound_port};
pub use record::NotificationRecord;
pub use server::NotifierServer;
