//! Nexus Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use nexus_observability::logging_initialisieren;
use nexus_server::{config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad = ServerConfig::pfad_aus_env();
    let config = ServerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Nexus Server wird initialisiert"
    );

    Server::neu(config).starten().await
}
