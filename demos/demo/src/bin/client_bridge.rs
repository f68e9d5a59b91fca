//! Connects to the notifier and hands every incoming call to the
//! application's `phoneCallIn` port. The "application" here is a plain
//! loop that logs what it would render.

use phonecall_bridge::{BridgeError, ClientBridge, ClientConfig, NotificationRecord, inbound_port};

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ClientConfig::from_env()?;
    let (sender, mut receiver) = inbound_port(config.port_name.clone());

    let bridge = ClientBridge::new(config, sender).connect().await?;

    while let Some(value) = receiver.recv().await {
        match serde_json::from_value::<NotificationRecord>(value.clone()) {
            Ok(call) => log::info!(
                "[{}] Incoming call from {} ({})",
                receiver.name(),
                call.name,
                call.company
            ),
            Err(_) => log::info!("[{}] Received {}", receiver.name(), value),
        }
    }

    let delivered = bridge.join().await?;
    log::info!("Port `{}` closed after {} values", receiver.name(), delivered);
    Ok(())
}
