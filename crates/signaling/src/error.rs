//! Fehlertypen fuer den Signaling-Service

use nexus_core::NexusError;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Fehler aus Session, Router oder Bildschirmfreigabe
    #[error(transparent)]
    Kern(#[from] NexusError),

    /// Verbindung wurde getrennt
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,

    /// Protokollfehler (ungueltiges Frame, fremde Absender-ID)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Der Raum-Actor ist beendet (Raum wurde leer)
    #[error("Raum-Actor beendet")]
    RaumBeendet,

    /// Senden an Client fehlgeschlagen (Channel geschlossen)
    #[error("Senden fehlgeschlagen")]
    SendFehler,

    /// Timeout (Keepalive)
    #[error("Timeout")]
    Timeout,

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Kernfehler, falls vorhanden
    pub fn kern(&self) -> Option<&NexusError> {
        match self {
            Self::Kern(e) => Some(e),
            _ => None,
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
