//! nexus-chat – Chat-Nachrichten und Profil-Updates
//!
//! Dieses Crate implementiert:
//! - ChatService: Nachricht senden, optional mit Anhang (feste 2-GiB-Grenze)
//! - StorageBackend-Trait + DiskStorage fuer Anhaenge
//! - ProfileUpdate: nur `username` und `avatar`, unbekannte Felder werden abgelehnt
//!
//! # Beispiel
//!
//! ```no_run
//! use std::sync::Arc;
//! use nexus_chat::{ChatService, DiskStorage};
//! use nexus_core::types::{ParticipantId, RoomId};
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(DiskStorage::new("data/anhaenge"));
//!     let chat = ChatService::neu(storage);
//!     let nachricht = chat
//!         .send_message(&RoomId::from("lobby"), ParticipantId::new(), "Hallo", None)
//!         .await
//!         .unwrap();
//!     println!("{}", nachricht.content);
//! }
//! ```

pub mod error;
pub mod profile;
pub mod service;
pub mod storage;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::{ChatError, ChatResult};
pub use profile::profil_aktualisieren;
pub use service::ChatService;
pub use storage::{DiskStorage, StorageBackend};
pub use types::{
    Anhang, AttachmentMeta, ChatNachricht, GespeicherterAnhang, Profil, ProfileUpdate, MAX_ANHANG_BYTES,
};
