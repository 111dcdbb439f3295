//! Oeffentliche Typen fuer den Chat-Service

use chrono::{DateTime, Utc};
use nexus_core::types::{ParticipantId, RoomId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Feste Obergrenze fuer Anhaenge: 2 GiB
pub const MAX_ANHANG_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Maximale Laenge einer Nachricht in Bytes
pub const MAX_NACHRICHT_LAENGE: usize = 4096;

/// Maximale Laenge eines Benutzernamens in Zeichen
pub const MAX_USERNAME_LAENGE: usize = 32;

/// Metadaten eines Anhangs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// Anhang samt Inhalt, wie er zum Senden uebergeben wird
#[derive(Debug)]
pub struct Anhang {
    pub meta: AttachmentMeta,
    pub daten: Vec<u8>,
}

/// Gespeicherter Anhang einer Nachricht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GespeicherterAnhang {
    #[serde(flatten)]
    pub meta: AttachmentMeta,
    pub storage_path: String,
    /// SHA-256 als Hex
    pub checksum: String,
}

/// Eine gesendete Chat-Nachricht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatNachricht {
    pub id: Uuid,
    pub channel_id: RoomId,
    pub sender: ParticipantId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<GespeicherterAnhang>,
}

/// Aenderung am eigenen Profil
///
/// Nur `username` und `avatar` sind erlaubt; alles andere wird abgelehnt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl ProfileUpdate {
    pub fn ist_leer(&self) -> bool {
        self.username.is_none() && self.avatar.is_none()
    }
}

/// Anzeigeprofil eines Benutzers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profil {
    pub username: String,
    pub avatar: String,
}
