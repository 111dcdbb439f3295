//! RemoteCaptureSource – Bildschirmaufnahme ueber den Client
//!
//! Der Server hat keinen Bildschirm. `acquire` schickt eine
//! `capture-request` an den Client und wartet auf `capture-granted` oder
//! `capture-denied`. Der Client meldet das Ende der Aufnahme mit
//! `capture-ended`; der Server fordert per `capture-stop` zum Beenden auf.

use async_trait::async_trait;
use dashmap::DashMap;
use nexus_core::types::{CaptureId, ParticipantId};
use nexus_core::{NexusError, Result};
use nexus_media::{Capture, CaptureSource};
use nexus_protocol::signal::{SignalMessage, SignalPayload};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::broadcast::EventBroadcaster;

/// Standard-Wartezeit auf die Antwort des Clients
pub const STANDARD_CAPTURE_TIMEOUT: Duration = Duration::from_secs(60);

type Schluessel = (ParticipantId, u64);

pub struct RemoteCaptureSource {
    broadcaster: EventBroadcaster,
    ausstehend: DashMap<Schluessel, oneshot::Sender<Result<Capture>>>,
    aktiv: DashMap<Schluessel, (CaptureId, CancellationToken)>,
    timeout: Duration,
}

impl RemoteCaptureSource {
    pub fn neu(broadcaster: EventBroadcaster, timeout: Duration) -> Self {
        Self {
            broadcaster,
            ausstehend: DashMap::new(),
            aktiv: DashMap::new(),
            timeout,
        }
    }

    /// Client hat die Aufnahme gestartet
    pub fn zugesagt(&self, participant: ParticipantId, request_id: u64, rtp_parameters: serde_json::Value) {
        let Some((_, tx)) = self.ausstehend.remove(&(participant, request_id)) else {
            tracing::debug!(participant = %participant, request_id, "Zusage ohne offene Anfrage");
            self.stop_senden(participant, request_id);
            return;
        };

        let capture = Capture::neu(rtp_parameters);
        self.aktiv
            .insert((participant, request_id), (capture.id, capture.beendet.clone()));
        if tx.send(Ok(capture)).is_err() {
            // Anfrage wurde inzwischen abgebrochen
            self.aktiv.remove(&(participant, request_id));
            self.stop_senden(participant, request_id);
        }
    }

    /// Client (oder Benutzer) hat die Aufnahme verweigert
    pub fn abgelehnt(&self, participant: ParticipantId, request_id: u64) {
        if let Some((_, tx)) = self.ausstehend.remove(&(participant, request_id)) {
            let _ = tx.send(Err(NexusError::CapturePermissionDenied));
        }
    }

    /// Aufnahme wurde auf dem Client beendet
    pub fn beendet(&self, participant: ParticipantId, request_id: u64) {
        if let Some((_, (_, token))) = self.aktiv.remove(&(participant, request_id)) {
            tracing::debug!(participant = %participant, request_id, "Aufnahme vom Client beendet");
            token.cancel();
        }
    }

    /// Verwirft alle Anfragen und Aufnahmen eines Teilnehmers
    pub fn verwerfen(&self, participant: ParticipantId) {
        self.ausstehend.retain(|(p, _), _| *p != participant);
        self.aktiv.retain(|(p, _), _| *p != participant);
    }

    pub fn ausstehend_anzahl(&self) -> usize {
        self.ausstehend.len()
    }

    pub fn aktiv_anzahl(&self) -> usize {
        self.aktiv.len()
    }

    fn stop_senden(&self, participant: ParticipantId, request_id: u64) {
        self.broadcaster.an_teilnehmer_senden(
            &participant,
            SignalMessage::new(SignalPayload::CaptureStop { request_id }),
        );
    }
}

/// Entfernt die offene Anfrage, wenn `acquire` abgebrochen wird
struct AnfrageGuard<'a> {
    ausstehend: &'a DashMap<Schluessel, oneshot::Sender<Result<Capture>>>,
    schluessel: Schluessel,
}

impl Drop for AnfrageGuard<'_> {
    fn drop(&mut self) {
        self.ausstehend.remove(&self.schluessel);
    }
}

#[async_trait]
impl CaptureSource for RemoteCaptureSource {
    async fn acquire(&self, participant: ParticipantId, anfrage: u64) -> Result<Capture> {
        let (tx, rx) = oneshot::channel();
        let schluessel = (participant, anfrage);
        self.ausstehend.insert(schluessel, tx);
        let _guard = AnfrageGuard {
            ausstehend: &self.ausstehend,
            schluessel,
        };

        let anfrage_nachricht = SignalMessage::new(SignalPayload::CaptureRequest { request_id: anfrage });
        if !self.broadcaster.an_teilnehmer_senden(&participant, anfrage_nachricht) {
            return Err(NexusError::CaptureCancelled);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(ergebnis)) => ergebnis,
            Ok(Err(_)) => Err(NexusError::CaptureCancelled),
            Err(_) => {
                tracing::info!(participant = %participant, anfrage, "Keine Antwort auf Aufnahme-Anfrage");
                self.stop_senden(participant, anfrage);
                Err(NexusError::CaptureCancelled)
            }
        }
    }

    fn release(&self, participant: ParticipantId, capture: &Capture) {
        let schluessel = self
            .aktiv
            .iter()
            .find(|e| e.key().0 == participant && e.value().0 == capture.id)
            .map(|e| *e.key());
        if let Some(schluessel) = schluessel {
            self.aktiv.remove(&schluessel);
            self.stop_senden(participant, schluessel.1);
        }
    }
}
