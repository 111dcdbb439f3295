//! Lebenszyklus-Ereignisse der Anrufe
//!
//! Jeder Raum-Actor veroeffentlicht diese Ereignisse auf einem
//! `tokio::sync::broadcast`-Bus. Der Server leitet daraus Metriken ab.

use nexus_core::types::{ParticipantId, RoomId};
use nexus_protocol::signal::ErrorCode;
use tokio::sync::broadcast;

/// Kapazitaet des Ereignis-Busses
pub const EVENT_BUS_GROESSE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// `idle` -> `calling`
    Gestartet {
        room_id: RoomId,
        anrufer: ParticipantId,
    },
    /// `calling` -> `connected`
    Verbunden { room_id: RoomId },
    /// Klingel-Timeout, hoechstens einmal pro Anrufversuch
    Verpasst { room_id: RoomId },
    /// Aufgelegt; `dauer` in Sekunden
    Beendet { room_id: RoomId, dauer: u64 },
    /// Verspaetete oder fremde Nachricht, geloggt und verworfen
    ProtokollfehlerVerworfen { room_id: RoomId, code: ErrorCode },
    /// Letzter Teilnehmer hat den Raum verlassen
    RaumGeschlossen { room_id: RoomId },
}

/// Erstellt einen neuen Ereignis-Bus
pub fn event_bus() -> broadcast::Sender<CallEvent> {
    let (tx, _) = broadcast::channel(EVENT_BUS_GROESSE);
    tx
}
