//! Signaling-Protokoll
//!
//! Jede Nachricht ist raum- und absenderbezogen: der Umschlag traegt
//! `roomId` und `senderId`, der Inhalt ist ein Tagged Enum (`"type"`).
//!
//! ## Design
//! - JSON via serde, Feldnamen in camelCase, Typen in kebab-case
//! - `senderId` wird serverseitig aus der Verbindung gestempelt
//! - Server-Nachrichten (`new-producer`, `call-status`, ...) teilen sich
//!   den Enum mit den Client-Nachrichten

use nexus_core::types::{ConsumerId, ParticipantId, ProducerId, RoomId, TransportId};
use nexus_core::NexusError;
use serde::{Deserialize, Serialize};

use crate::params::{DtlsParameters, MediaKind, TransportDescriptor, TransportDirection};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer `error`-Nachrichten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Allgemein
    InternalError,
    InvalidRequest,
    // Session
    AlreadyInCall,
    NotInCall,
    NotRinging,
    NotConnected,
    // Transports
    DuplicateTransport,
    UnknownTransport,
    TransportNotReady,
    DtlsMismatch,
    // Producer / Consumer / Raum
    UnknownProducer,
    UnknownConsumer,
    UnknownParticipant,
    UnknownRoom,
    // Bildschirmfreigabe
    CapturePermissionDenied,
    CaptureCancelled,
}

impl From<&NexusError> for ErrorCode {
    fn from(e: &NexusError) -> Self {
        match e {
            NexusError::AlreadyInCall(_) => Self::AlreadyInCall,
            NexusError::NotInCall(_) => Self::NotInCall,
            NexusError::NotRinging(_) => Self::NotRinging,
            NexusError::NotConnected(_) => Self::NotConnected,
            NexusError::DuplicateTransport { .. } => Self::DuplicateTransport,
            NexusError::UnknownTransport(_) => Self::UnknownTransport,
            NexusError::TransportNotReady(_) => Self::TransportNotReady,
            NexusError::DtlsMismatch(_) => Self::DtlsMismatch,
            NexusError::UnknownProducer(_) => Self::UnknownProducer,
            NexusError::UnknownConsumer(_) => Self::UnknownConsumer,
            NexusError::UnknownParticipant { .. } => Self::UnknownParticipant,
            NexusError::UnknownRoom(_) => Self::UnknownRoom,
            NexusError::CapturePermissionDenied => Self::CapturePermissionDenied,
            NexusError::CaptureCancelled => Self::CaptureCancelled,
            NexusError::Intern(_) => Self::InternalError,
        }
    }
}

// ---------------------------------------------------------------------------
// Status-Oberflaeche
// ---------------------------------------------------------------------------

/// Zustand der Call-Session eines Raums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    #[default]
    Idle,
    Calling,
    Connected,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Calling => write!(f, "calling"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Sicht auf einen Teilnehmer fuer die Darstellung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    pub id: ParticipantId,
    pub muted: bool,
    pub video: bool,
    pub screen_sharing: bool,
}

/// Read-only Status eines Raums: `{status, duration, participants[], screenSharing}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub room_id: RoomId,
    pub status: CallState,
    /// Sekunden seit Eintritt in `connected`
    pub duration: u64,
    pub participants: Vec<ParticipantSnapshot>,
    pub screen_sharing: bool,
}

impl CallSnapshot {
    /// Leerer Snapshot eines Raums ohne Anruf
    pub fn leer(room_id: RoomId) -> Self {
        Self {
            room_id,
            status: CallState::Idle,
            duration: 0,
            participants: Vec::new(),
            screen_sharing: false,
        }
    }
}

/// Bereits vorhandener Producer, der einem neuen Teilnehmer gemeldet wird
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfo {
    pub producer_id: ProducerId,
    pub participant_id: ParticipantId,
    pub kind: MediaKind,
}

// ---------------------------------------------------------------------------
// Nachrichteninhalt
// ---------------------------------------------------------------------------

/// Alle Signaling-Nachrichten (typsicher via Tagged Enum)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SignalPayload {
    // Verbindung
    Welcome {
        participant_id: ParticipantId,
        server_version: String,
    },
    Ping {
        timestamp_ms: u64,
    },
    Pong {
        echo_timestamp_ms: u64,
        server_timestamp_ms: u64,
    },

    // Raum
    JoinRoom {
        room_id: RoomId,
    },
    RoomJoined {
        room_id: RoomId,
        participants: Vec<ParticipantId>,
        producers: Vec<ProducerInfo>,
    },
    LeaveRoom,
    ParticipantJoined {
        participant_id: ParticipantId,
    },
    ParticipantLeft {
        participant_id: ParticipantId,
    },

    // Transports
    CreateTransport {
        direction: TransportDirection,
    },
    TransportCreated(TransportDescriptor),
    ConnectTransport {
        transport_id: TransportId,
        dtls_parameters: DtlsParameters,
    },
    TransportConnected {
        transport_id: TransportId,
    },

    // Producer / Consumer
    Produce {
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    },
    Produced {
        producer_id: ProducerId,
        kind: MediaKind,
    },
    NewProducer {
        producer_id: ProducerId,
        participant_id: ParticipantId,
        kind: MediaKind,
    },
    CloseProducer {
        producer_id: ProducerId,
    },
    ProducerClosed {
        producer_id: ProducerId,
    },
    Consume {
        producer_id: ProducerId,
    },
    Consumed {
        consumer_id: ConsumerId,
        producer_id: ProducerId,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    },
    CloseConsumer {
        consumer_id: ConsumerId,
    },

    // Aushandlung (Relay an `target` oder alle anderen im Raum)
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ParticipantId>,
        sdp: String,
    },
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ParticipantId>,
        sdp: String,
    },
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ParticipantId>,
        candidate: serde_json::Value,
        #[serde(default)]
        generation: u32,
        /// Fehlt bei Clients ohne Nummerierung: Ankunftsreihenfolge gilt
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence: Option<u64>,
    },

    // Anruf-Kommandos
    StartCall,
    RemoteAccept,
    Hangup,
    ToggleMute,
    ToggleVideo,
    ToggleScreenShare,

    // Anruf-Status
    CallStatus(CallSnapshot),
    CallMissed,
    ParticipantStatus {
        participant_id: ParticipantId,
        muted: bool,
        video: bool,
    },

    // Bildschirmaufnahme (Server fragt den Client an)
    CaptureRequest {
        request_id: u64,
    },
    CaptureGranted {
        request_id: u64,
        rtp_parameters: serde_json::Value,
    },
    CaptureDenied {
        request_id: u64,
    },
    CaptureEnded {
        request_id: u64,
    },
    CaptureStop {
        request_id: u64,
    },

    // Fehler
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl SignalPayload {
    /// Kurzname fuer Logs (entspricht dem `type`-Feld)
    pub fn typ(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::JoinRoom { .. } => "join-room",
            Self::RoomJoined { .. } => "room-joined",
            Self::LeaveRoom => "leave-room",
            Self::ParticipantJoined { .. } => "participant-joined",
            Self::ParticipantLeft { .. } => "participant-left",
            Self::CreateTransport { .. } => "create-transport",
            Self::TransportCreated(_) => "transport-created",
            Self::ConnectTransport { .. } => "connect-transport",
            Self::TransportConnected { .. } => "transport-connected",
            Self::Produce { .. } => "produce",
            Self::Produced { .. } => "produced",
            Self::NewProducer { .. } => "new-producer",
            Self::CloseProducer { .. } => "close-producer",
            Self::ProducerClosed { .. } => "producer-closed",
            Self::Consume { .. } => "consume",
            Self::Consumed { .. } => "consumed",
            Self::CloseConsumer { .. } => "close-consumer",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::StartCall => "start-call",
            Self::RemoteAccept => "remote-accept",
            Self::Hangup => "hangup",
            Self::ToggleMute => "toggle-mute",
            Self::ToggleVideo => "toggle-video",
            Self::ToggleScreenShare => "toggle-screen-share",
            Self::CallStatus(_) => "call-status",
            Self::CallMissed => "call-missed",
            Self::ParticipantStatus { .. } => "participant-status",
            Self::CaptureRequest { .. } => "capture-request",
            Self::CaptureGranted { .. } => "capture-granted",
            Self::CaptureDenied { .. } => "capture-denied",
            Self::CaptureEnded { .. } => "capture-ended",
            Self::CaptureStop { .. } => "capture-stop",
            Self::Error { .. } => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Umschlag
// ---------------------------------------------------------------------------

/// Signaling-Nachricht mit Raum- und Absenderbezug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<ParticipantId>,
    pub payload: SignalPayload,
}

impl SignalMessage {
    /// Nachricht ohne Raumbezug (Verbindungsebene)
    pub fn new(payload: SignalPayload) -> Self {
        Self {
            room_id: None,
            sender_id: None,
            payload,
        }
    }

    /// Nachricht im Kontext eines Raums
    pub fn im_raum(room_id: RoomId, payload: SignalPayload) -> Self {
        Self {
            room_id: Some(room_id),
            sender_id: None,
            payload,
        }
    }

    /// Setzt den Absender
    pub fn von(mut self, sender: ParticipantId) -> Self {
        self.sender_id = Some(sender);
        self
    }

    /// Erstellt eine Ping-Nachricht
    pub fn ping(timestamp_ms: u64) -> Self {
        Self::new(SignalPayload::Ping { timestamp_ms })
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::new(SignalPayload::Pong {
            echo_timestamp_ms,
            server_timestamp_ms,
        })
    }

    /// Erstellt eine Fehler-Nachricht
    pub fn error(room_id: Option<RoomId>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            room_id,
            sender_id: None,
            payload: SignalPayload::Error {
                code,
                message: message.into(),
            },
        }
    }

    /// Erstellt eine Fehler-Nachricht aus einem Kernfehler
    pub fn aus_fehler(room_id: Option<RoomId>, fehler: &NexusError) -> Self {
        Self::error(room_id, ErrorCode::from(fehler), fehler.to_string())
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
