//! syncs-demo entry point.
//!
//! Connects to the peer named by the environment, logs lifecycle and
//! traffic, and serves a couple of remote functions until Ctrl-C.

use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use syncs_client::{SyncsClient, SyncsConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = SyncsConfig::from_env()?;
    tracing::info!(path = %config.path, "starting syncs-demo");

    let client = SyncsClient::new(config);

    client.on_open(|session| {
        tracing::info!(socket_id = ?session.socket_id(), "online");
        let _ = session.shared("presence").set("status", "online");
    });
    client.on_disconnect(|_| tracing::warn!("connection lost"));
    client.on_close(|_| tracing::info!("closed"));
    client.on_message(|message| tracing::info!(%message, "message"));

    client.on_event("chat", |data| tracing::info!(%data, "chat event"));
    client
        .global_shared("settings")
        .on_change(|change| tracing::info!(values = ?change.values, origin = ?change.origin, "settings changed"));

    client.functions().add("echo", |_, args| Ok(Value::Array(args)));
    client.functions().add("socketId", |session, _| Ok(json!(session.socket_id())));

    tokio::signal::ctrl_c().await?;
    client.disconnect();
    tracing::info!("shutting down");
    Ok(())
}
