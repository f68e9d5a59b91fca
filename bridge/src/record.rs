use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// The record pushed to every connecting client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub name: String,
    pub company: String,
}

impl NotificationRecord {
    pub fn new(name: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            company: company.into(),
        }
    }

    /// The incoming phone call announced by the notifier.
    pub fn phone_call() -> Self {
        Self::new("Jonathan Linnestad", "Anleggsmannen")
    }

    pub fn to_json(&self) -> BridgeResult<String> {
        serde_json::to_string(self).map_err(BridgeError::Serialization)
    }

    pub fn from_json(payload: &str) -> BridgeResult<Self> {
        serde_json::from_str(payload).map_err(|e| BridgeError::deserialization(payload, e))
    }
}

impl Default for NotificationRecord {
    fn default() -> Self {
        Self::phone_call()
    }
}
