//! Server and client configuration
//!
//! Values come from the environment (after loading an optional `.env`),
//! falling back to the addresses the demo has always used.

use std::env;
use std::str::FromStr;

use dotenvy::dotenv;
use url::Url;

use crate::error::{BridgeError, BridgeResult};
use crate::port::PHONE_CALL_IN;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_URL: &str = "ws://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Reads `NOTIFIER_HOST` and `NOTIFIER_PORT`.
    pub fn from_env() -> BridgeResult<Self> {
        dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> BridgeResult<Self> {
        let host = lookup("NOTIFIER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match lookup("NOTIFIER_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| BridgeError::Config(format!("invalid NOTIFIER_PORT {raw:?}: {e}")))?,
            None => DEFAULT_PORT,
        };

        Ok(Self { host, port })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What the client bridge does with a text frame that is not valid JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Log the frame and keep the connection.
    #[default]
    Skip,
    /// Stop the bridge with a deserialization error.
    Terminate,
}

impl FromStr for MalformedPolicy {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(MalformedPolicy::Skip),
            "terminate" => Ok(MalformedPolicy::Terminate),
            other => Err(BridgeError::Config(format!(
                "unknown malformed-payload policy {other:?} (expected skip or terminate)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub url: Url,
    pub port_name: String,
    pub on_malformed: MalformedPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_URL).expect("default notifier url is valid"),
            port_name: PHONE_CALL_IN.to_string(),
            on_malformed: MalformedPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Reads `NOTIFIER_URL`, `NOTIFIER_PORT_NAME` and `NOTIFIER_ON_MALFORMED`.
    pub fn from_env() -> BridgeResult<Self> {
        dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> BridgeResult<Self> {
        let url = match lookup("NOTIFIER_URL") {
            Some(raw) => parse_ws_url(&raw)?,
            None => parse_ws_url(DEFAULT_URL)?,
        };
        let port_name = lookup("NOTIFIER_PORT_NAME").unwrap_or_else(|| PHONE_CALL_IN.to_string());
        let on_malformed = match lookup("NOTIFIER_ON_MALFORMED") {
            Some(raw) => raw.parse()?,
            None => MalformedPolicy::default(),
        };

        Ok(Self {
            url,
            port_name,
            on_malformed,
        })
    }

    pub fn with_url(mut self, url: &str) -> BridgeResult<Self> {
        self.url = parse_ws_url(url)?;
        Ok(self)
    }

    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.on_malformed = policy;
        self
    }
}

/// Only plain `ws://` is supported; the bridge opens the TCP stream itself.
fn parse_ws_url(raw: &str) -> BridgeResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| BridgeError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "ws" {
        return Err(BridgeError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme `{}`", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(BridgeError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}
