//! ChatService – Nachrichten mit optionalem Anhang senden

use std::sync::Arc;

use chrono::Utc;
use nexus_core::types::{ParticipantId, RoomId};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    error::{ChatError, ChatResult},
    storage::StorageBackend,
    types::{Anhang, ChatNachricht, GespeicherterAnhang, MAX_ANHANG_BYTES, MAX_NACHRICHT_LAENGE},
};

pub struct ChatService<S: StorageBackend> {
    storage: Arc<S>,
}

impl<S: StorageBackend> ChatService<S> {
    pub fn neu(storage: Arc<S>) -> Arc<Self> {
        Arc::new(Self { storage })
    }

    /// Sendet eine Nachricht in einen Kanal
    ///
    /// Die 2-GiB-Grenze fuer Anhaenge wird anhand der Metadaten geprueft,
    /// bevor irgendetwas uebertragen wird. Ohne Text bekommt eine Nachricht
    /// mit Anhang einen Standardtext.
    pub async fn send_message(
        &self,
        channel_id: &RoomId,
        sender: ParticipantId,
        content: &str,
        anhang: Option<Anhang>,
    ) -> ChatResult<ChatNachricht> {
        if let Some(a) = &anhang {
            anhang_pruefen(a)?;
        }

        let content = match (content.trim(), &anhang) {
            ("", None) => {
                return Err(ChatError::ungueltig("Nachrichteninhalt darf nicht leer sein"));
            }
            ("", Some(a)) => format!("Datei geteilt: {}", a.meta.name),
            (text, _) => text.to_string(),
        };

        if content.len() > MAX_NACHRICHT_LAENGE {
            return Err(ChatError::ungueltig(format!(
                "Nachricht zu lang: {} Zeichen (Maximum: {})",
                content.len(),
                MAX_NACHRICHT_LAENGE
            )));
        }

        let id = Uuid::new_v4();
        let attachment = match anhang {
            Some(a) => Some(self.hochladen(channel_id, id, a).await?),
            None => None,
        };

        tracing::debug!(
            channel_id = %channel_id,
            sender = %sender,
            anhang = attachment.is_some(),
            "Chat-Nachricht gesendet"
        );

        Ok(ChatNachricht {
            id,
            channel_id: channel_id.clone(),
            sender,
            content,
            timestamp: Utc::now(),
            attachment,
        })
    }

    /// Liest den Inhalt eines gespeicherten Anhangs
    pub async fn anhang_laden(&self, anhang: &GespeicherterAnhang) -> ChatResult<Vec<u8>> {
        self.storage.retrieve(&anhang.storage_path).await
    }

    /// Loescht einen gespeicherten Anhang
    pub async fn anhang_loeschen(&self, anhang: &GespeicherterAnhang) -> ChatResult<()> {
        self.storage.delete(&anhang.storage_path).await
    }

    async fn hochladen(
        &self,
        channel_id: &RoomId,
        nachricht: Uuid,
        anhang: Anhang,
    ) -> ChatResult<GespeicherterAnhang> {
        let mut hasher = Sha256::new();
        hasher.update(&anhang.daten);
        let checksum = format!("{:x}", hasher.finalize());

        let storage_path = format!("{}/{}_{}", channel_id.as_str(), nachricht, anhang.meta.name);
        self.storage.store(&storage_path, &anhang.daten).await?;

        tracing::info!(
            channel_id = %channel_id,
            datei = %anhang.meta.name,
            bytes = anhang.meta.size,
            "Anhang hochgeladen"
        );

        Ok(GespeicherterAnhang {
            meta: anhang.meta,
            storage_path,
            checksum,
        })
    }
}

/// Prueft Groesse und Namen eines Anhangs vor der Uebertragung
fn anhang_pruefen(anhang: &Anhang) -> ChatResult<()> {
    let size = anhang.meta.size.max(anhang.daten.len() as u64);
    if size > MAX_ANHANG_BYTES {
        return Err(ChatError::AttachmentTooLarge {
            size,
            max: MAX_ANHANG_BYTES,
        });
    }

    let name = anhang.meta.name.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ChatError::ungueltig(format!(
            "Ungueltiger Dateiname: '{}'",
            anhang.meta.name
        )));
    }

    if anhang.daten.len() as u64 != anhang.meta.size {
        return Err(ChatError::ungueltig(format!(
            "Groesse stimmt nicht: {} Bytes angekuendigt, {} Bytes erhalten",
            anhang.meta.size,
            anhang.daten.len()
        )));
    }
    Ok(())
}
