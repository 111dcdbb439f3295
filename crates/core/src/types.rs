//! Identifikationstypen fuer Raeume, Teilnehmer und Medienobjekte
//!
//! Alle IDs verwenden das Newtype-Pattern, damit ein `TransportId` nie
//! versehentlich als `ProducerId` durchgereicht werden kann.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $praefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Erstellt eine neue zufaellige ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Gibt die innere UUID zurueck
            pub fn inner(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($praefix, ":{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// Eindeutige Teilnehmer-ID (eine pro Signaling-Verbindung)
    ParticipantId,
    "participant"
);
uuid_id!(
    /// Eindeutige Transport-ID
    TransportId,
    "transport"
);
uuid_id!(
    /// Eindeutige Producer-ID
    ProducerId,
    "producer"
);
uuid_id!(
    /// Eindeutige Consumer-ID
    ConsumerId,
    "consumer"
);
uuid_id!(
    /// ID einer belegten Bildschirmaufnahme
    CaptureId,
    "capture"
);

/// Raum-ID (entspricht der Voice-Kanal-ID, z.B. `"v1"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "room:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_eindeutig() {
        assert_ne!(ParticipantId::new(), ParticipantId::new());
        assert_ne!(ProducerId::new(), ProducerId::new());
    }

    #[test]
    fn display_praefix() {
        assert!(TransportId(Uuid::nil()).to_string().starts_with("transport:"));
        assert_eq!(RoomId::from("v1").to_string(), "room:v1");
    }

    #[test]
    fn ids_serialisieren_als_blanker_wert() {
        let raum = RoomId::from("v1");
        assert_eq!(serde_json::to_string(&raum).unwrap(), "\"v1\"");

        let pid = ParticipantId(Uuid::nil());
        let json = serde_json::to_string(&pid).unwrap();
        assert_eq!(json, format!("\"{}\"", Uuid::nil()));
        let zurueck: ParticipantId = serde_json::from_str(&json).unwrap();
        assert_eq!(pid, zurueck);
    }
}
