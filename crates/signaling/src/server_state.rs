//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt alle geteilten Dienste als Clone-bare Handles, die sicher
//! zwischen tokio-Tasks geteilt werden koennen.

use nexus_media::{CaptureSource, MediaConfig, RouterRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::broadcast::EventBroadcaster;
use crate::capture::{RemoteCaptureSource, STANDARD_CAPTURE_TIMEOUT};
use crate::events::{event_bus, CallEvent};
use crate::ringing::STANDARD_RINGING_TIMEOUT;
use crate::room::{RoomContext, STANDARD_POSTFACH_GROESSE};
use crate::rooms::RoomDirectory;
use crate::session::SessionConfig;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers (im `welcome`)
    pub server_name: String,
    /// Maximale gleichzeitige Verbindungen
    pub max_clients: u32,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_size: usize,
    /// Klingeldauer bis `call-missed`
    pub ringing_timeout: Duration,
    /// Takt der Gespraechsdauer
    pub tick_intervall: Duration,
    /// Wartezeit auf `capture-granted`/`capture-denied`
    pub capture_timeout: Duration,
    /// Groesse des Postfachs pro Raum
    pub postfach_groesse: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "Nexus".to_string(),
            max_clients: 512,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            max_frame_size: nexus_protocol::wire::DEFAULT_MAX_FRAME_SIZE,
            ringing_timeout: STANDARD_RINGING_TIMEOUT,
            tick_intervall: Duration::from_secs(1),
            capture_timeout: STANDARD_CAPTURE_TIMEOUT,
            postfach_groesse: STANDARD_POSTFACH_GROESSE,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    pub config: Arc<SignalingConfig>,
    /// Router aller aktiven Raeume
    pub registry: RouterRegistry,
    /// Send-Queues der verbundenen Teilnehmer
    pub broadcaster: EventBroadcaster,
    /// Laufende Raum-Actors
    pub rooms: RoomDirectory,
    /// Bildschirmaufnahmen ueber den Client
    pub capture: Arc<RemoteCaptureSource>,
    /// Lebenszyklus-Ereignisse aller Anrufe
    pub call_events: broadcast::Sender<CallEvent>,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    pub fn neu(config: SignalingConfig, media: MediaConfig) -> Arc<Self> {
        let registry = RouterRegistry::neu(media);
        let broadcaster = EventBroadcaster::neu();
        let capture = Arc::new(RemoteCaptureSource::neu(
            broadcaster.clone(),
            config.capture_timeout,
        ));
        let call_events = event_bus();

        let kontext = RoomContext {
            registry: registry.clone(),
            broadcaster: broadcaster.clone(),
            capture: Arc::clone(&capture) as Arc<dyn CaptureSource>,
            call_events: call_events.clone(),
            session: SessionConfig {
                ringing_timeout: config.ringing_timeout,
                tick_intervall: config.tick_intervall,
            },
            postfach_groesse: config.postfach_groesse,
        };

        Arc::new(Self {
            config: Arc::new(config),
            registry,
            broadcaster,
            rooms: RoomDirectory::neu(kontext),
            capture,
            call_events,
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Abonniert die Lebenszyklus-Ereignisse aller Anrufe
    pub fn call_events_abonnieren(&self) -> broadcast::Receiver<CallEvent> {
        self.call_events.subscribe()
    }
}
