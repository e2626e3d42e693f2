//! Pair Relay Server
//!
//! Seats two players per game and relays their moves over WebSocket.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pair_relay::{RelayServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();

    info!("Pair Relay Server v{}", VERSION);
    info!("Bind: {}", config.bind_addr);
    info!("Move policy: {:?}", config.matchmaker.move_policy);
    if let Some(origin) = &config.allowed_origin {
        info!("Allowed origin: {}", origin);
    }

    let server = Arc::new(RelayServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_server.shutdown(),
            Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
        }
    });

    server.run().await.context("relay server failed")?;

    info!("Server stopped");
    Ok(())
}
