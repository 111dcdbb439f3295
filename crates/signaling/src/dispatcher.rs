//! Message-Dispatcher – Routet SignalMessages einer Verbindung
//!
//! Der Dispatcher stempelt jede Nachricht mit dem Teilnehmer der
//! Verbindung und reicht sie an den zustaendigen Raum-Actor weiter.
//!
//! ## Regeln
//! - Eine fremde `senderId` wird verworfen (kein Spoofing)
//! - `roomId` einer Nachricht muss zum aktuellen Raum passen; nur
//!   `join-room` und `start-call` duerfen den Raum wechseln
//! - Reine Server-Nachrichten vom Client sind `INVALID_REQUEST`

use nexus_core::types::{ParticipantId, RoomId};
use nexus_protocol::signal::{ErrorCode, SignalMessage, SignalPayload};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::SignalingError;
use crate::events::CallEvent;
use crate::room::RoomHandle;
use crate::server_state::SignalingState;

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
pub struct DispatcherContext {
    pub peer_addr: SocketAddr,
    /// Teilnehmer dieser Verbindung (vom Server vergeben)
    pub participant: ParticipantId,
    /// Aktueller Raum
    pub raum: Option<RoomHandle>,
}

impl DispatcherContext {
    pub fn neu(peer_addr: SocketAddr, participant: ParticipantId) -> Self {
        Self {
            peer_addr,
            participant,
            raum: None,
        }
    }

    fn room_id(&self) -> Option<RoomId> {
        self.raum.as_ref().map(|h| h.room_id().clone())
    }
}

pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine eingehende Nachricht
    ///
    /// Gibt die direkte Antwort an den Absender zurueck; Raum-Nachrichten
    /// laufen ueber den Broadcaster.
    pub async fn dispatch(&self, nachricht: SignalMessage, ctx: &mut DispatcherContext) -> Option<SignalMessage> {
        if let Some(sender) = nachricht.sender_id {
            if sender != ctx.participant {
                tracing::warn!(
                    peer = %ctx.peer_addr,
                    participant = %ctx.participant,
                    behauptet = %sender,
                    "Fremde Absender-ID – Nachricht verworfen"
                );
                return None;
            }
        }

        let SignalMessage { room_id, payload, .. } = nachricht;

        match payload {
            SignalPayload::Ping { timestamp_ms } => Some(SignalMessage::pong(timestamp_ms, jetzt_ms())),
            SignalPayload::Pong { .. } => None,

            SignalPayload::JoinRoom { room_id } => self.raum_wechseln(&room_id, ctx).await,
            SignalPayload::LeaveRoom => {
                self.raum_verlassen(ctx).await;
                None
            }

            SignalPayload::StartCall => {
                if let Some(ziel) = &room_id {
                    if ctx.room_id().as_ref() != Some(ziel) {
                        if let Some(fehler) = self.raum_wechseln(ziel, ctx).await {
                            return Some(fehler);
                        }
                    }
                }
                let handle = self.aktueller_raum(ctx, room_id.as_ref())?;
                let ergebnis = handle.start_call(ctx.participant).await;
                self.ergebnis_melden(ctx, ergebnis)
            }
            SignalPayload::RemoteAccept => {
                let handle = self.aktueller_raum(ctx, room_id.as_ref())?;
                let ergebnis = handle.remote_accept(ctx.participant).await;
                self.ergebnis_melden(ctx, ergebnis)
            }
            SignalPayload::Hangup => {
                let handle = self.aktueller_raum(ctx, room_id.as_ref())?;
                let ergebnis = handle.hangup(ctx.participant).await;
                self.ergebnis_melden(ctx, ergebnis)
            }
            SignalPayload::ToggleMute => {
                let handle = self.aktueller_raum(ctx, room_id.as_ref())?;
                let ergebnis = handle.toggle_mute(ctx.participant).await.map(|_| ());
                self.ergebnis_melden(ctx, ergebnis)
            }
            SignalPayload::ToggleVideo => {
                let handle = self.aktueller_raum(ctx, room_id.as_ref())?;
                let ergebnis = handle.toggle_video(ctx.participant).await.map(|_| ());
                self.ergebnis_melden(ctx, ergebnis)
            }
            SignalPayload::ToggleScreenShare => {
                let handle = self.aktueller_raum(ctx, room_id.as_ref())?;
                match handle.toggle_screen_share(ctx.participant).await {
                    Ok(rx) => {
                        self.bildschirm_antwort_abwarten(handle.room_id().clone(), ctx.participant, rx);
                        None
                    }
                    Err(e) => self.ergebnis_melden(ctx, Err(e)),
                }
            }

            // Antworten des Clients auf `capture-request`
            SignalPayload::CaptureGranted {
                request_id,
                rtp_parameters,
            } => {
                self.state
                    .capture
                    .zugesagt(ctx.participant, request_id, rtp_parameters);
                None
            }
            SignalPayload::CaptureDenied { request_id } => {
                self.state.capture.abgelehnt(ctx.participant, request_id);
                None
            }
            SignalPayload::CaptureEnded { request_id } => {
                self.state.capture.beendet(ctx.participant, request_id);
                None
            }

            p @ (SignalPayload::CreateTransport { .. }
            | SignalPayload::ConnectTransport { .. }
            | SignalPayload::Produce { .. }
            | SignalPayload::CloseProducer { .. }
            | SignalPayload::Consume { .. }
            | SignalPayload::CloseConsumer { .. }
            | SignalPayload::Offer { .. }
            | SignalPayload::Answer { .. }
            | SignalPayload::IceCandidate { .. }) => {
                let handle = self.aktueller_raum(ctx, room_id.as_ref())?;
                let ergebnis = handle.signal(ctx.participant, p).await;
                self.ergebnis_melden(ctx, ergebnis)
            }

            andere => {
                tracing::debug!(
                    participant = %ctx.participant,
                    typ = andere.typ(),
                    "Server-Nachricht vom Client abgelehnt"
                );
                Some(SignalMessage::error(
                    room_id,
                    ErrorCode::InvalidRequest,
                    format!("'{}' ist eine Server-Nachricht", andere.typ()),
                ))
            }
        }
    }

    /// Aufraeumen nach Verbindungsende
    pub async fn client_cleanup(&self, ctx: &mut DispatcherContext) {
        self.raum_verlassen(ctx).await;
        self.state.capture.verwerfen(ctx.participant);
        self.state.broadcaster.client_entfernen(&ctx.participant);
        tracing::debug!(participant = %ctx.participant, "Client aufgeraeumt");
    }

    async fn raum_wechseln(&self, ziel: &RoomId, ctx: &mut DispatcherContext) -> Option<SignalMessage> {
        if ctx.room_id().as_ref() != Some(ziel) {
            self.raum_verlassen(ctx).await;
        }

        match self.state.rooms.beitreten(ziel, ctx.participant).await {
            Ok(handle) => {
                ctx.raum = Some(handle);
                None
            }
            Err(e) => {
                tracing::warn!(participant = %ctx.participant, room_id = %ziel, fehler = %e, "Beitritt fehlgeschlagen");
                Some(fehler_nachricht(Some(ziel.clone()), &e))
            }
        }
    }

    async fn raum_verlassen(&self, ctx: &mut DispatcherContext) {
        let Some(handle) = ctx.raum.take() else {
            return;
        };
        match handle.leave(ctx.participant).await {
            Ok(()) | Err(SignalingError::RaumBeendet) => {}
            Err(e) => {
                tracing::debug!(participant = %ctx.participant, room_id = %handle.room_id(), fehler = %e, "Verlassen fehlgeschlagen");
            }
        }
    }

    /// Handle des aktuellen Raums, wenn die Nachricht dazu passt
    fn aktueller_raum(&self, ctx: &DispatcherContext, room_id: Option<&RoomId>) -> Option<RoomHandle> {
        let Some(handle) = ctx.raum.clone() else {
            tracing::debug!(participant = %ctx.participant, "Raum-Nachricht ohne Raum verworfen");
            if let Some(r) = room_id {
                self.protokollfehler(r.clone(), ErrorCode::UnknownRoom);
            }
            return None;
        };
        match room_id {
            Some(r) if r != handle.room_id() => {
                tracing::debug!(
                    participant = %ctx.participant,
                    room_id = %r,
                    aktuell = %handle.room_id(),
                    "Nachricht fuer anderen Raum verworfen"
                );
                self.protokollfehler(r.clone(), ErrorCode::UnknownRoom);
                None
            }
            _ => Some(handle),
        }
    }

    /// Kommandofehler gehen zurueck, Protokollfehler werden verworfen
    fn ergebnis_melden(&self, ctx: &mut DispatcherContext, ergebnis: Result<(), SignalingError>) -> Option<SignalMessage> {
        let fehler = ergebnis.err()?;
        let room_id = ctx.room_id();

        if matches!(fehler, SignalingError::RaumBeendet) {
            ctx.raum = None;
        }

        if let Some(kern) = fehler.kern() {
            if kern.ist_protokollfehler() {
                tracing::debug!(participant = %ctx.participant, fehler = %kern, "Protokollfehler verworfen");
                if let Some(r) = room_id {
                    self.protokollfehler(r, ErrorCode::from(kern));
                }
                return None;
            }
        }
        Some(fehler_nachricht(room_id, &fehler))
    }

    fn protokollfehler(&self, room_id: RoomId, code: ErrorCode) {
        let _ = self
            .state
            .call_events
            .send(CallEvent::ProtokollfehlerVerworfen { room_id, code });
    }

    /// Wartet auf das Ergebnis der Aufnahme-Belegung und meldet Fehler
    fn bildschirm_antwort_abwarten(
        &self,
        room_id: RoomId,
        participant: ParticipantId,
        rx: tokio::sync::oneshot::Receiver<nexus_core::Result<bool>>,
    ) {
        let broadcaster = self.state.broadcaster.clone();
        tokio::spawn(async move {
            match rx.await {
                Ok(Ok(teilt)) => {
                    tracing::debug!(participant = %participant, teilt, "Bildschirmfreigabe umgeschaltet");
                }
                Ok(Err(e)) => {
                    broadcaster.an_teilnehmer_senden(&participant, SignalMessage::aus_fehler(Some(room_id), &e));
                }
                Err(_) => {}
            }
        });
    }
}

fn fehler_nachricht(room_id: Option<RoomId>, fehler: &SignalingError) -> SignalMessage {
    match fehler {
        SignalingError::Kern(e) => SignalMessage::aus_fehler(room_id, e),
        andere => SignalMessage::error(room_id, ErrorCode::InternalError, andere.to_string()),
    }
}

fn jetzt_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
