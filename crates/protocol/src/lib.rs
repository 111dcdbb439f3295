//! nexus-protocol – Signaling-Protokoll
//!
//! Nachrichtentypen, Transportparameter, Frame-Codec und die
//! Reihenfolgeregeln fuer ICE-Kandidaten.

pub mod ordering;
pub mod params;
pub mod signal;
pub mod wire;

pub use ordering::{Einordnung, IceCandidateSequencer};
pub use params::{
    DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters, MediaKind,
    TransportDescriptor, TransportDirection,
};
pub use signal::{
    CallSnapshot, CallState, ErrorCode, ParticipantSnapshot, ProducerInfo, SignalMessage,
    SignalPayload,
};
pub use wire::FrameCodec;
