use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Transport-level failure: TCP connect, handshake, frame read or write.
    #[error("connection error: {0}")]
    Connection(#[from] tungstenite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize notification: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("malformed payload ({source}): {payload}")]
    Deserialization {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("inbound port `{0}` is closed")]
    PortClosed(String),
}

impl BridgeError {
    /// Build a deserialization error, keeping at most 100 bytes of the payload.
    pub(crate) fn deserialization(payload: &str, source: serde_json::Error) -> Self {
        let mut end = payload.len().min(100);
        while !payload.is_char_boundary(end) {
            end -= 1;
        }
        BridgeError::Deserialization {
            payload: payload[..end].to_string(),
            source,
        }
    }
}
