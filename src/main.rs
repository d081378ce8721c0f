//! Mexico Duel Server
//!
//! Authoritative server for two-player Mexico dice duels.

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mexico_duel::{
    network::{AuthConfig, GameServer, ServerConfig},
    STARTING_LIVES, VERSION,
};

#[cfg(feature = "debug-tracing")]
const DEFAULT_DIRECTIVE: &str = "mexico_duel=debug";
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_DIRECTIVE: &str = "mexico_duel=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(DEFAULT_DIRECTIVE.parse()?))
        .init();

    let config = ServerConfig::from_env();
    let auth = AuthConfig::from_env();

    info!("Mexico Duel Server v{}", VERSION);
    info!("Starting lives: {}", STARTING_LIVES);
    info!(
        "Reconnect grace: {:?}, queue timeout: {:?}",
        config.reconnect_grace, config.queue_timeout
    );

    let server = Arc::new(GameServer::new(config, auth));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                signal_server.shutdown();
            }
            Err(e) => warn!("Could not listen for interrupt: {}", e),
        }
    });

    server.run().await?;

    info!("Server stopped");
    Ok(())
}
