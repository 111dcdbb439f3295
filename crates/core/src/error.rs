//! Fehlertypen des Call-Kerns
//!
//! Zwei Klassen von Fehlern werden unterschieden:
//! - Protokollfehler (veraltete oder fremde IDs nach einem Teardown) werden
//!   geloggt und verworfen.
//! - Kommandofehler (`AlreadyInCall`, `CapturePermissionDenied`, ...) gehen
//!   synchron an den Aufrufer zurueck; der Zustand bleibt unveraendert.

use thiserror::Error;

use crate::types::{ConsumerId, ParticipantId, ProducerId, RoomId, TransportId};

/// Result-Alias fuer den Call-Kern
pub type Result<T> = std::result::Result<T, NexusError>;

/// Alle Fehler von Session, Router und Screen-Share
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NexusError {
    // --- Session ---
    #[error("Im Raum {0} laeuft bereits ein Anruf")]
    AlreadyInCall(RoomId),

    #[error("Im Raum {0} laeuft kein Anruf")]
    NotInCall(RoomId),

    #[error("Anruf im Raum {0} klingelt nicht (mehr)")]
    NotRinging(RoomId),

    #[error("Anruf im Raum {0} ist nicht verbunden")]
    NotConnected(RoomId),

    // --- Transports ---
    #[error("Teilnehmer {participant} hat bereits einen {richtung}-Transport")]
    DuplicateTransport {
        participant: ParticipantId,
        richtung: String,
    },

    #[error("Unbekannter Transport: {0}")]
    UnknownTransport(TransportId),

    #[error("Transport nicht bereit: {0}")]
    TransportNotReady(String),

    #[error("Transport {0} ist bereits mit anderen DTLS-Parametern verbunden")]
    DtlsMismatch(TransportId),

    // --- Producer / Consumer ---
    #[error("Unbekannter Producer: {0}")]
    UnknownProducer(ProducerId),

    #[error("Unbekannter Consumer: {0}")]
    UnknownConsumer(ConsumerId),

    #[error("Teilnehmer {participant} ist nicht im Raum {room}")]
    UnknownParticipant {
        participant: ParticipantId,
        room: RoomId,
    },

    #[error("Raum nicht aktiv: {0}")]
    UnknownRoom(RoomId),

    // --- Bildschirmfreigabe ---
    #[error("Bildschirmaufnahme verweigert")]
    CapturePermissionDenied,

    #[error("Bildschirmaufnahme abgebrochen")]
    CaptureCancelled,

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl NexusError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen `TransportNotReady`-Fehler
    pub fn nicht_bereit(grund: impl Into<String>) -> Self {
        Self::TransportNotReady(grund.into())
    }

    /// Gibt true zurueck wenn der Fehler ein verspaeteter oder fremder
    /// Protokollschritt ist, der nur geloggt und verworfen wird
    pub fn ist_protokollfehler(&self) -> bool {
        matches!(
            self,
            Self::UnknownTransport(_)
                | Self::UnknownProducer(_)
                | Self::UnknownConsumer(_)
                | Self::UnknownParticipant { .. }
                | Self::UnknownRoom(_)
        )
    }
}

impl From<anyhow::Error> for NexusError {
    fn from(e: anyhow::Error) -> Self {
        Self::Intern(e.to_string())
    }
}
