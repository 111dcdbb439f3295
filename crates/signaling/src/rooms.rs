//! RoomDirectory – Raum-ID auf laufenden Raum-Actor
//!
//! Raeume entstehen beim ersten Beitritt und verschwinden, wenn der letzte
//! Teilnehmer geht. Ein Actor, der sich gerade beendet, beantwortet
//! Kommandos nicht mehr; `beitreten` startet dann einen frischen.

use dashmap::DashMap;
use nexus_core::types::{ParticipantId, RoomId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{SignalingError, SignalingResult};
use crate::room::{RoomContext, RoomHandle};

const BEITRITT_VERSUCHE: usize = 3;

pub(crate) struct DirectoryInner {
    pub(crate) raeume: DashMap<RoomId, RoomHandle>,
    kontext: RoomContext,
    naechste_instanz: AtomicU64,
}

#[derive(Clone)]
pub struct RoomDirectory {
    inner: Arc<DirectoryInner>,
}

impl RoomDirectory {
    pub fn neu(kontext: RoomContext) -> Self {
        Self {
            inner: Arc::new(DirectoryInner {
                raeume: DashMap::new(),
                kontext,
                naechste_instanz: AtomicU64::new(1),
            }),
        }
    }

    /// Tritt einem Raum bei und gibt das Handle seines Actors zurueck
    pub async fn beitreten(&self, room_id: &RoomId, participant: ParticipantId) -> SignalingResult<RoomHandle> {
        for _ in 0..BEITRITT_VERSUCHE {
            let handle = self.handle_fuer(room_id);
            match handle.join(participant).await {
                Ok(_) => return Ok(handle),
                Err(SignalingError::RaumBeendet) => {
                    tracing::debug!(room_id = %room_id, "Raum-Actor beendet sich gerade – neuer Versuch");
                    self.inner
                        .raeume
                        .remove_if(room_id, |_, h| h.instanz() == handle.instanz());
                }
                Err(e) => return Err(e),
            }
        }
        Err(SignalingError::RaumBeendet)
    }

    /// Handle eines laufenden Raums
    pub fn raum(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.inner.raeume.get(room_id).map(|h| h.clone())
    }

    pub fn anzahl(&self) -> usize {
        self.inner.raeume.len()
    }

    pub fn raum_ids(&self) -> Vec<RoomId> {
        self.inner.raeume.iter().map(|e| e.key().clone()).collect()
    }

    pub fn kontext(&self) -> &RoomContext {
        &self.inner.kontext
    }

    fn handle_fuer(&self, room_id: &RoomId) -> RoomHandle {
        self.inner
            .raeume
            .entry(room_id.clone())
            .or_insert_with(|| {
                let instanz = self.inner.naechste_instanz.fetch_add(1, Ordering::Relaxed);
                RoomHandle::starten(
                    room_id.clone(),
                    instanz,
                    self.inner.kontext.clone(),
                    Arc::downgrade(&self.inner),
                )
            })
            .clone()
    }
}
