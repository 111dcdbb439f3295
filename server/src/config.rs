//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};
use nexus_media::MediaConfig;
use nexus_observability::logging::{log_format_gueltig, log_level_gueltig};
use nexus_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};

/// Umgebungsvariable mit dem Pfad der Konfigurationsdatei
pub const CONFIG_VAR: &str = "NEXUS_CONFIG";
pub const STANDARD_CONFIG_PFAD: &str = "config.toml";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    pub netzwerk: NetzwerkEinstellungen,
    /// Anrufsteuerung und Verbindungen
    pub signaling: SignalingEinstellungen,
    /// Transportparameter fuer WebRTC
    pub media: MediaEinstellungen,
    pub logging: LoggingEinstellungen,
    /// Metriken und Health-Check
    pub observability: ObservabilityEinstellungen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers (im `welcome`)
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Clients
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Nexus".into(),
            max_clients: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    /// Port fuer die Signaling-Verbindungen
    pub signaling_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            signaling_port: 9987,
        }
    }
}

/// Zeiten und Grenzen der Anrufsteuerung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Klingeldauer bis `call-missed`
    pub ringing_timeout_sek: u64,
    /// Takt der Gespraechsdauer in Millisekunden
    pub tick_intervall_ms: u64,
    pub keepalive_sek: u64,
    pub verbindungs_timeout_sek: u64,
    pub max_frame_size: usize,
    /// Wartezeit auf die Freigabe einer Bildschirmaufnahme
    pub capture_timeout_sek: u64,
    pub postfach_groesse: usize,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        let standard = SignalingConfig::default();
        Self {
            ringing_timeout_sek: standard.ringing_timeout.as_secs(),
            tick_intervall_ms: standard.tick_intervall.as_millis() as u64,
            keepalive_sek: standard.keepalive_sek,
            verbindungs_timeout_sek: standard.verbindungs_timeout_sek,
            max_frame_size: standard.max_frame_size,
            capture_timeout_sek: standard.capture_timeout.as_secs(),
            postfach_groesse: standard.postfach_groesse,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaEinstellungen {
    /// IP-Adresse, die Clients in ICE-Kandidaten sehen
    pub announced_ip: String,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
}

impl Default for MediaEinstellungen {
    fn default() -> Self {
        let standard = MediaConfig::default();
        Self {
            announced_ip: standard.announced_ip,
            rtc_min_port: standard.rtc_min_port,
            rtc_max_port: standard.rtc_max_port,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
    /// Abtastintervall der Medienlast in Sekunden
    pub abtast_intervall_sek: u64,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
            abtast_intervall_sek: 5,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar"))
            }
        };
        Ok(config)
    }

    /// Pfad aus `NEXUS_CONFIG`, sonst `config.toml`
    pub fn pfad_aus_env() -> String {
        std::env::var(CONFIG_VAR).unwrap_or_else(|_| STANDARD_CONFIG_PFAD.into())
    }

    /// Parst und validiert einen TOML-String
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(inhalt)?;
        config.validieren()?;
        Ok(config)
    }

    pub fn validieren(&self) -> anyhow::Result<()> {
        if self.media.rtc_min_port > self.media.rtc_max_port {
            bail!(
                "media.rtc_min_port ({}) liegt ueber media.rtc_max_port ({})",
                self.media.rtc_min_port,
                self.media.rtc_max_port
            );
        }
        if self.signaling.ringing_timeout_sek == 0 {
            bail!("signaling.ringing_timeout_sek muss groesser als 0 sein");
        }
        if self.signaling.tick_intervall_ms == 0 {
            bail!("signaling.tick_intervall_ms muss groesser als 0 sein");
        }
        if self.signaling.postfach_groesse == 0 {
            bail!("signaling.postfach_groesse muss groesser als 0 sein");
        }
        if self.observability.abtast_intervall_sek == 0 {
            bail!("observability.abtast_intervall_sek muss groesser als 0 sein");
        }
        // Filter-Direktiven wie "nexus_signaling=debug" sind ebenfalls erlaubt
        if !self.logging.level.contains('=') && !log_level_gueltig(&self.logging.level) {
            bail!("Unbekanntes Log-Level: '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!("Unbekanntes Log-Format: '{}'", self.logging.format);
        }
        Ok(())
    }

    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            keepalive_sek: self.signaling.keepalive_sek,
            verbindungs_timeout_sek: self.signaling.verbindungs_timeout_sek,
            max_frame_size: self.signaling.max_frame_size,
            ringing_timeout: Duration::from_secs(self.signaling.ringing_timeout_sek),
            tick_intervall: Duration::from_millis(self.signaling.tick_intervall_ms),
            capture_timeout: Duration::from_secs(self.signaling.capture_timeout_sek),
            postfach_groesse: self.signaling.postfach_groesse,
        }
    }

    pub fn media_config(&self) -> MediaConfig {
        MediaConfig {
            announced_ip: self.media.announced_ip.clone(),
            rtc_min_port: self.media.rtc_min_port,
            rtc_max_port: self.media.rtc_max_port,
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer Signaling zurueck
    pub fn signaling_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        self.adresse(self.netzwerk.signaling_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        self.adresse(self.observability.port)
    }

    fn adresse(&self, port: u16) -> anyhow::Result<SocketAddr> {
        let text = format!("{}:{}", self.netzwerk.bind_adresse, port);
        text.parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{text}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        cfg.validieren().unwrap();
        assert_eq!(cfg.server.max_clients, 512);
        assert_eq!(cfg.signaling.ringing_timeout_sek, 30);
        assert_eq!(cfg.signaling.tick_intervall_ms, 1000);
        assert_eq!(cfg.media.rtc_min_port, 40000);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(
            cfg.signaling_bind_adresse().unwrap(),
            "0.0.0.0:9987".parse().unwrap()
        );
        assert_eq!(
            cfg.observability_bind_adresse().unwrap(),
            "0.0.0.0:9300".parse().unwrap()
        );
    }

    #[test]
    fn config_aus_toml_string() {
        let cfg = ServerConfig::aus_toml(
            r#"
            [server]
            name = "Mein Server"

            [signaling]
            ringing_timeout_sek = 45

            [media]
            announced_ip = "203.0.113.7"
        "#,
        )
        .unwrap();
        assert_eq!(cfg.server.name, "Mein Server");
        assert_eq!(cfg.signaling.ringing_timeout_sek, 45);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.server.max_clients, 512);
        assert_eq!(cfg.signaling.keepalive_sek, 30);

        let signaling = cfg.signaling_config();
        assert_eq!(signaling.ringing_timeout, Duration::from_secs(45));
        assert_eq!(signaling.server_name, "Mein Server");
        assert_eq!(cfg.media_config().announced_ip, "203.0.113.7");
    }

    #[test]
    fn ungueltige_werte_abgelehnt() {
        let vertauscht = "[media]\nrtc_min_port = 50000\nrtc_max_port = 40000\n";
        assert!(ServerConfig::aus_toml(vertauscht).is_err());

        assert!(ServerConfig::aus_toml("[signaling]\ntick_intervall_ms = 0\n").is_err());
        assert!(ServerConfig::aus_toml("[logging]\nformat = \"xml\"\n").is_err());
        assert!(ServerConfig::aus_toml("[logging]\nlevel = \"nexus_signaling=debug\"\n").is_ok());
    }

    #[test]
    fn fehlende_datei_liefert_standard() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/nexus.toml").unwrap();
        assert_eq!(cfg.netzwerk.signaling_port, 9987);
    }
}
