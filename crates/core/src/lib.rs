//! nexus-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die IDs und den Fehler-Enum bereit, die von allen
//! anderen Nexus-Crates gemeinsam genutzt werden.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{NexusError, Result};
pub use types::{CaptureId, ConsumerId, ParticipantId, ProducerId, RoomId, TransportId};
