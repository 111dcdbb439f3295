//! nexus-media – SFU-Topologie eines Raums
//!
//! Router mit Producern und Consumern, Transport-Lebenszyklus und die
//! Bildschirmfreigabe. Medien selbst fliessen hier nicht: ICE-, DTLS- und
//! RTP-Parameter werden nur vergeben, gespeichert und verglichen.

pub mod allocator;
pub mod registry;
pub mod router;
pub mod screen_share;
pub mod transport;

pub use allocator::{MediaConfig, ParameterAllocator};
pub use registry::{RegistryStatistik, RouterRegistry};
pub use router::{Consumer, Participant, Producer, Router, RouterEvent};
pub use screen_share::{Antwort, Capture, CaptureSource, ScreenShareController, ScreenShareEvent};
pub use transport::{Transport, TransportManager, TransportState};
