//! Pushes the phone-call notification to every WebSocket client.
//!
//! Listens on `NOTIFIER_HOST:NOTIFIER_PORT` (default `0.0.0.0:8000`) until Ctrl-C.

use phonecall_bridge::{BridgeError, NotifierServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env()?;
    let server = NotifierServer::bind(&config).await?;

    server
        .serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
}
