//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `NX_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder `nexus_signaling=debug`)
//! - `NX_LOG_FORMAT`: Format (text/json)
//!
//! Die Umgebung hat Vorrang vor den Werten aus der Konfigurationsdatei.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_VAR: &str = "NX_LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "NX_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Ein ungueltiger Filter faellt auf `info` zurueck, ein unbekanntes
/// Format auf `text`. Schlaegt fehl, wenn bereits ein globaler Subscriber
/// gesetzt ist.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<()> {
    let level = effektiver_wert(std::env::var(LOG_LEVEL_VAR).ok(), level);
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let format = effektiver_wert(std::env::var(LOG_FORMAT_VAR).ok(), format);
    let ergebnis = if format == "json" {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };

    ergebnis.map_err(|e| anyhow!("Logging konnte nicht initialisiert werden: {e}"))
}

/// Umgebungswert, falls gesetzt und nicht leer, sonst der Konfigurationswert
fn effektiver_wert(aus_env: Option<String>, aus_config: &str) -> String {
    aus_env
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| aus_config.to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
