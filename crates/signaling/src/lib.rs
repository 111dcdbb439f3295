//! nexus-signaling – Anruf-Signaling ueber TCP
//!
//! Dieser Crate verwaltet die Signaling-Verbindungen, die Raum-Actors mit
//! ihrer Call-Session und die Zustellung von Nachrichten an die
//! Teilnehmer.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |
//!     v
//! MessageDispatcher ---- capture-* ----> RemoteCaptureSource
//!     |
//!     v
//! RoomDirectory -> RoomActor (pro Raum ein Task, einziger Schreiber)
//!                     +-- CallSessionCoordinator (idle/calling/connected)
//!                     |     +-- RingingSupervisor, Sekundentakt
//!                     +-- ScreenShareController (pro Teilnehmer)
//!                     +-- RouterRegistry (nexus-media)
//!
//! EventBroadcaster – Send-Queues aller Teilnehmer
//! CallEvent-Bus    – Lebenszyklus-Ereignisse fuer Metriken
//! ```

pub mod broadcast;
pub mod capture;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod ringing;
pub mod room;
pub mod rooms;
pub mod server_state;
pub mod session;
pub mod tcp;
pub mod timer;

pub use broadcast::EventBroadcaster;
pub use capture::RemoteCaptureSource;
pub use connection::ClientConnection;
pub use dispatcher::{DispatcherContext, MessageDispatcher};
pub use error::{SignalingError, SignalingResult};
pub use events::CallEvent;
pub use room::{RoomContext, RoomHandle};
pub use rooms::RoomDirectory;
pub use server_state::{SignalingConfig, SignalingState};
pub use session::{CallSessionCoordinator, SessionConfig};
pub use tcp::SignalingServer;
