//! CallSessionCoordinator – Anruf-Zustandsmaschine eines Raums
//!
//! ```text
//!            start_call              remote_accept
//!   idle ---------------> calling ---------------> connected
//!    ^                     |  |                        |
//!    |  ringing_timeout    |  | hangup                 | hangup
//!    +---------------------+--+------------------------+
//! ```
//!
//! Die Maschine selbst ist synchron und gehoert dem Raum-Actor. Timer
//! (Klingeln, Sekundentakt) sind Tasks, deren Handles am Session-Datensatz
//! haengen; ihre Ereignisse kommen ueber das Timer-Postfach des Actors
//! zurueck und tragen Versuch bzw. Epoche, damit verspaetete Ereignisse
//! nichts mehr veraendern.

use nexus_core::types::{ParticipantId, RoomId};
use nexus_core::{NexusError, Result};
use nexus_media::{RouterEvent, RouterRegistry};
use nexus_protocol::signal::{CallSnapshot, CallState};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::ringing::{RingingSupervisor, STANDARD_RINGING_TIMEOUT};
use crate::timer::{TimerEvent, TimerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub ringing_timeout: Duration,
    pub tick_intervall: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ringing_timeout: STANDARD_RINGING_TIMEOUT,
            tick_intervall: Duration::from_secs(1),
        }
    }
}

/// Session-Datensatz; wird beim Auflegen durch einen frischen ersetzt
#[derive(Debug, Default)]
struct CallSession {
    status: CallState,
    duration: u64,
    anrufer: Option<ParticipantId>,
    epoche: u64,
    ticker: Option<TimerHandle>,
}

pub struct CallSessionCoordinator {
    room_id: RoomId,
    registry: RouterRegistry,
    config: SessionConfig,
    timer_tx: mpsc::Sender<TimerEvent>,
    ringing: RingingSupervisor,
    session: CallSession,
    letzte_epoche: u64,
}

impl CallSessionCoordinator {
    pub fn neu(
        room_id: RoomId,
        registry: RouterRegistry,
        config: SessionConfig,
        timer_tx: mpsc::Sender<TimerEvent>,
    ) -> Self {
        Self {
            room_id,
            registry,
            ringing: RingingSupervisor::neu(config.ringing_timeout),
            config,
            timer_tx,
            session: CallSession::default(),
            letzte_epoche: 0,
        }
    }

    pub fn status(&self) -> CallState {
        self.session.status
    }

    pub fn duration(&self) -> u64 {
        self.session.duration
    }

    pub fn anrufer(&self) -> Option<ParticipantId> {
        self.session.anrufer
    }

    pub fn klingelt(&self) -> bool {
        self.ringing.ist_aktiv()
    }

    pub fn tickt(&self) -> bool {
        self.session.ticker.is_some()
    }

    /// `idle` -> `calling`; startet den Klingel-Timer
    pub fn start_call(&mut self, anrufer: ParticipantId) -> Result<()> {
        if self.session.status != CallState::Idle {
            return Err(NexusError::AlreadyInCall(self.room_id.clone()));
        }

        let versuch = self.ringing.starten(self.timer_tx.clone());
        self.session.status = CallState::Calling;
        self.session.anrufer = Some(anrufer);

        tracing::info!(room_id = %self.room_id, anrufer = %anrufer, versuch, "Anruf gestartet");
        Ok(())
    }

    /// `calling` -> `connected`; Dauer beginnt bei 0
    pub fn remote_accept(&mut self) -> Result<()> {
        if self.session.status != CallState::Calling {
            return Err(NexusError::NotRinging(self.room_id.clone()));
        }

        self.ringing.abbrechen();
        self.letzte_epoche += 1;
        self.session.status = CallState::Connected;
        self.session.duration = 0;
        self.session.epoche = self.letzte_epoche;
        self.session.ticker = Some(TimerHandle::periodisch(
            self.config.tick_intervall,
            self.timer_tx.clone(),
            TimerEvent::Tick {
                epoche: self.letzte_epoche,
            },
        ));

        tracing::info!(room_id = %self.room_id, "Anruf verbunden");
        Ok(())
    }

    /// Klingel-Timeout; `Some` genau dann, wenn der Anruf dadurch verpasst ist
    pub fn ringing_timeout(&mut self, versuch: u64) -> Option<Vec<RouterEvent>> {
        if self.session.status != CallState::Calling || !self.ringing.ausgeloest(versuch) {
            tracing::debug!(room_id = %self.room_id, versuch, "Veraltetes Klingel-Timeout ignoriert");
            return None;
        }

        tracing::info!(room_id = %self.room_id, versuch, "Anruf nicht angenommen");
        Some(self.abbauen())
    }

    /// Auflegen aus `calling` oder `connected`
    pub fn hangup(&mut self) -> Result<Vec<RouterEvent>> {
        if self.session.status == CallState::Idle {
            return Err(NexusError::NotInCall(self.room_id.clone()));
        }

        tracing::info!(
            room_id = %self.room_id,
            status = %self.session.status,
            dauer = self.session.duration,
            "Anruf aufgelegt"
        );
        Ok(self.abbauen())
    }

    /// Sekundentakt; `true` wenn die Dauer erhoeht wurde
    pub fn tick(&mut self, epoche: u64) -> bool {
        if self.session.status != CallState::Connected || self.session.epoche != epoche {
            return false;
        }
        self.session.duration += 1;
        true
    }

    pub fn toggle_mute(&mut self, participant: ParticipantId) -> Result<bool> {
        self.verbunden_pruefen()?;
        self.registry.toggle_mute(&self.room_id, participant)
    }

    pub fn toggle_video(&mut self, participant: ParticipantId) -> Result<bool> {
        self.verbunden_pruefen()?;
        self.registry.toggle_video(&self.room_id, participant)
    }

    pub fn verbunden_pruefen(&self) -> Result<()> {
        if self.session.status == CallState::Connected {
            Ok(())
        } else {
            Err(NexusError::NotConnected(self.room_id.clone()))
        }
    }

    /// Read-only Sicht fuer die Darstellung
    pub fn snapshot(&self) -> CallSnapshot {
        let participants = self
            .registry
            .mit_router(&self.room_id, |r| r.snapshot_teilnehmer())
            .unwrap_or_default();
        CallSnapshot {
            room_id: self.room_id.clone(),
            status: self.session.status,
            duration: self.session.duration,
            screen_sharing: participants.iter().any(|p| p.screen_sharing),
            participants,
        }
    }

    /// Stoppt alle Timer, schliesst alle Transports und ersetzt die Session
    fn abbauen(&mut self) -> Vec<RouterEvent> {
        self.ringing.abbrechen();
        if let Some(ticker) = self.session.ticker.take() {
            ticker.abbrechen();
        }
        let events = self.registry.close_room_transports(&self.room_id);
        self.session = CallSession::default();
        events
    }
}
