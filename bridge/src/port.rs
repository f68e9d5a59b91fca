//! Inbound Port
//!
//! A named conduit delivering parsed JSON values from the bridge into the
//! consuming application's update loop. The receiver can be drained from
//! async code or from a synchronous render loop.

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

use crate::error::{BridgeError, BridgeResult};

/// Port the rendering application listens on for incoming calls.
pub const PHONE_CALL_IN: &str = "phoneCallIn";

/// Create a named port and its two ends.
pub fn inbound_port(name: impl Into<String>) -> (PortSender, PortReceiver) {
    let name = name.into();
    let (tx, rx) = mpsc::unbounded_channel();

    (
        PortSender {
            name: name.clone(),
            tx,
        },
        PortReceiver { name, rx },
    )
}

/// Sending end, held by the client bridge.
#[derive(Clone, Debug)]
pub struct PortSender {
    name: String,
    tx: UnboundedSender<Value>,
}

impl PortSender {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver a value to the application.
    pub fn send(&self, value: Value) -> BridgeResult<()> {
        log::debug!("[Port {}] Delivering value", self.name);
        self.tx
            .send(value)
            .map_err(|_| BridgeError::PortClosed(self.name.clone()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving end, held by the consuming application.
#[derive(Debug)]
pub struct PortReceiver {
    name: String,
    rx: UnboundedReceiver<Value>,
}

impl PortReceiver {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next value. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Try to receive the next value without blocking
    pub fn try_recv(&mut self) -> Option<Value> {
        match self.rx.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block the current thread for the next value. Must not be called from
    /// within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<Value> {
        self.rx.blocking_recv()
    }
}
