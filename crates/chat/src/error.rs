//! Fehlertypen fuer das Chat-Crate

use thiserror::Error;

/// Chat-Fehlertypen
#[derive(Debug, Error)]
pub enum ChatError {
    /// Anhang ueberschreitet die feste Obergrenze; geprueft vor jeder Uebertragung
    #[error("Anhang zu gross: {size} Bytes (Maximum: {max} Bytes)")]
    AttachmentTooLarge { size: u64, max: u64 },

    /// Profil-Update mit einem nicht unterstuetzten Feld
    #[error("Unbekanntes Feld: {0}")]
    UnknownField(String),

    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("Upload fehlgeschlagen: {0}")]
    UploadFehlgeschlagen(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl ChatError {
    pub fn ungueltig(msg: impl Into<String>) -> Self {
        Self::UngueltigeEingabe(msg.into())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
