//! Raum-Actor – einziger Schreiber fuer Session und Router eines Raums
//!
//! Alle Eingaben eines Raums laufen durch ein Postfach: Kommandos der
//! Verbindungen, Timer-Ereignisse und Rueckmeldungen der
//! Bildschirmfreigabe. Der Actor verarbeitet sie strikt nacheinander;
//! nach jedem Ereignis wird der Status-Snapshot neu veroeffentlicht.
//!
//! Verlaesst der letzte Teilnehmer den Raum, traegt sich der Actor aus dem
//! Verzeichnis aus, schliesst sein Postfach und beendet sich.

use nexus_core::types::{ParticipantId, RoomId};
use nexus_core::{NexusError, Result};
use nexus_media::{
    Antwort, CaptureSource, RouterEvent, RouterRegistry, ScreenShareController, ScreenShareEvent,
};
use nexus_protocol::ordering::{Einordnung, IceCandidateSequencer};
use nexus_protocol::signal::{CallSnapshot, CallState, ErrorCode, SignalMessage, SignalPayload};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::broadcast::EventBroadcaster;
use crate::error::{SignalingError, SignalingResult};
use crate::events::CallEvent;
use crate::rooms::DirectoryInner;
use crate::session::{CallSessionCoordinator, SessionConfig};
use crate::timer::TimerEvent;

/// Standard-Groesse des Raum-Postfachs
pub const STANDARD_POSTFACH_GROESSE: usize = 128;

type Rueckmeldung<T> = oneshot::Sender<Result<T>>;

/// Gemeinsame Dienste aller Raeume
#[derive(Clone)]
pub struct RoomContext {
    pub registry: RouterRegistry,
    pub broadcaster: EventBroadcaster,
    pub capture: Arc<dyn CaptureSource>,
    pub call_events: broadcast::Sender<CallEvent>,
    pub session: SessionConfig,
    pub postfach_groesse: usize,
}

/// Kommandos an den Raum-Actor
pub enum RoomCommand {
    Join {
        participant: ParticipantId,
        antwort: Rueckmeldung<bool>,
    },
    Leave {
        participant: ParticipantId,
        antwort: Rueckmeldung<()>,
    },
    StartCall {
        participant: ParticipantId,
        antwort: Rueckmeldung<()>,
    },
    RemoteAccept {
        participant: ParticipantId,
        antwort: Rueckmeldung<()>,
    },
    Hangup {
        participant: ParticipantId,
        antwort: Rueckmeldung<()>,
    },
    ToggleMute {
        participant: ParticipantId,
        antwort: Rueckmeldung<bool>,
    },
    ToggleVideo {
        participant: ParticipantId,
        antwort: Rueckmeldung<bool>,
    },
    ToggleScreenShare {
        participant: ParticipantId,
        antwort: Antwort,
    },
    /// Medien- und Aushandlungsnachricht eines Teilnehmers
    Signal {
        participant: ParticipantId,
        payload: SignalPayload,
    },
    Snapshot {
        antwort: oneshot::Sender<CallSnapshot>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Clone-bares Handle auf einen laufenden Raum-Actor
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    instanz: u64,
    tx: mpsc::Sender<RoomCommand>,
    status: watch::Receiver<CallSnapshot>,
}

impl RoomHandle {
    /// Startet einen neuen Raum-Actor
    pub(crate) fn starten(
        room_id: RoomId,
        instanz: u64,
        kontext: RoomContext,
        verzeichnis: Weak<DirectoryInner>,
    ) -> Self {
        let (tx, postfach) = mpsc::channel(kontext.postfach_groesse);
        let (timer_tx, timer_rx) = mpsc::channel(64);
        let (screen_tx, screen_rx) = mpsc::channel(32);
        let (status_tx, status) = watch::channel(CallSnapshot::leer(room_id.clone()));

        let actor = RoomActor {
            session: CallSessionCoordinator::neu(
                room_id.clone(),
                kontext.registry.clone(),
                kontext.session,
                timer_tx,
            ),
            letzter_status: CallSnapshot::leer(room_id.clone()),
            room_id: room_id.clone(),
            instanz,
            kontext,
            verzeichnis,
            postfach,
            timer_rx,
            screen_tx,
            screen_rx,
            status_tx,
            bildschirm: HashMap::new(),
            kandidaten: HashMap::new(),
        };
        tokio::spawn(actor.laufen());

        tracing::debug!(room_id = %room_id, instanz, "Raum-Actor gestartet");
        Self {
            room_id,
            instanz,
            tx,
            status,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub(crate) fn instanz(&self) -> u64 {
        self.instanz
    }

    pub fn ist_beendet(&self) -> bool {
        self.tx.is_closed()
    }

    /// Tritt dem Raum bei; `false` wenn der Teilnehmer schon drin war
    pub async fn join(&self, participant: ParticipantId) -> SignalingResult<bool> {
        self.anfrage(|antwort| RoomCommand::Join { participant, antwort }).await
    }

    pub async fn leave(&self, participant: ParticipantId) -> SignalingResult<()> {
        self.anfrage(|antwort| RoomCommand::Leave { participant, antwort }).await
    }

    pub async fn start_call(&self, participant: ParticipantId) -> SignalingResult<()> {
        self.anfrage(|antwort| RoomCommand::StartCall { participant, antwort })
            .await
    }

    pub async fn remote_accept(&self, participant: ParticipantId) -> SignalingResult<()> {
        self.anfrage(|antwort| RoomCommand::RemoteAccept { participant, antwort })
            .await
    }

    pub async fn hangup(&self, participant: ParticipantId) -> SignalingResult<()> {
        self.anfrage(|antwort| RoomCommand::Hangup { participant, antwort }).await
    }

    pub async fn toggle_mute(&self, participant: ParticipantId) -> SignalingResult<bool> {
        self.anfrage(|antwort| RoomCommand::ToggleMute { participant, antwort })
            .await
    }

    pub async fn toggle_video(&self, participant: ParticipantId) -> SignalingResult<bool> {
        self.anfrage(|antwort| RoomCommand::ToggleVideo { participant, antwort })
            .await
    }

    /// Schaltet die Bildschirmfreigabe um
    ///
    /// Die Belegung der Aufnahme kann dauern; das Ergebnis kommt ueber den
    /// zurueckgegebenen Kanal, sobald der Actor es kennt.
    pub async fn toggle_screen_share(
        &self,
        participant: ParticipantId,
    ) -> SignalingResult<oneshot::Receiver<Result<bool>>> {
        let (antwort, rx) = oneshot::channel();
        self.senden(RoomCommand::ToggleScreenShare { participant, antwort })
            .await?;
        Ok(rx)
    }

    pub async fn signal(&self, participant: ParticipantId, payload: SignalPayload) -> SignalingResult<()> {
        self.senden(RoomCommand::Signal { participant, payload }).await
    }

    pub async fn snapshot(&self) -> SignalingResult<CallSnapshot> {
        let (antwort, rx) = oneshot::channel();
        self.senden(RoomCommand::Snapshot { antwort }).await?;
        rx.await.map_err(|_| SignalingError::RaumBeendet)
    }

    /// Beobachtet den Status-Snapshot (Aenderungen nach jedem Ereignis)
    pub fn status_abonnieren(&self) -> watch::Receiver<CallSnapshot> {
        self.status.clone()
    }

    async fn senden(&self, kommando: RoomCommand) -> SignalingResult<()> {
        self.tx
            .send(kommando)
            .await
            .map_err(|_| SignalingError::RaumBeendet)
    }

    async fn anfrage<T>(&self, kommando: impl FnOnce(Rueckmeldung<T>) -> RoomCommand) -> SignalingResult<T> {
        let (antwort, rx) = oneshot::channel();
        self.senden(kommando(antwort)).await?;
        let ergebnis = rx.await.map_err(|_| SignalingError::RaumBeendet)?;
        Ok(ergebnis?)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

type KandidatenSchluessel = (ParticipantId, Option<ParticipantId>);

struct RoomActor {
    room_id: RoomId,
    instanz: u64,
    kontext: RoomContext,
    verzeichnis: Weak<DirectoryInner>,
    postfach: mpsc::Receiver<RoomCommand>,
    timer_rx: mpsc::Receiver<TimerEvent>,
    screen_tx: mpsc::Sender<ScreenShareEvent>,
    screen_rx: mpsc::Receiver<ScreenShareEvent>,
    status_tx: watch::Sender<CallSnapshot>,
    letzter_status: CallSnapshot,
    session: CallSessionCoordinator,
    bildschirm: HashMap<ParticipantId, ScreenShareController>,
    kandidaten: HashMap<KandidatenSchluessel, IceCandidateSequencer<SignalPayload>>,
}

impl RoomActor {
    async fn laufen(mut self) {
        loop {
            tokio::select! {
                kommando = self.postfach.recv() => match kommando {
                    Some(k) => self.kommando(k),
                    None => break,
                },
                Some(ereignis) = self.timer_rx.recv() => self.timer(ereignis),
                Some(ereignis) = self.screen_rx.recv() => self.bildschirm_ereignis(ereignis),
            }

            self.status_veroeffentlichen();

            if !self.kontext.registry.ist_aktiv(&self.room_id) {
                break;
            }
        }

        self.beenden().await;
    }

    // -----------------------------------------------------------------------
    // Kommandos
    // -----------------------------------------------------------------------

    fn kommando(&mut self, kommando: RoomCommand) {
        match kommando {
            RoomCommand::Join { participant, antwort } => {
                let _ = antwort.send(Ok(self.beitreten(participant)));
            }
            RoomCommand::Leave { participant, antwort } => {
                let _ = antwort.send(self.verlassen(participant));
            }
            RoomCommand::StartCall { participant, antwort } => {
                let ergebnis = self
                    .mitglied_pruefen(participant)
                    .and_then(|_| self.session.start_call(participant));
                if ergebnis.is_ok() {
                    self.ereignis(CallEvent::Gestartet {
                        room_id: self.room_id.clone(),
                        anrufer: participant,
                    });
                }
                let _ = antwort.send(ergebnis);
            }
            RoomCommand::RemoteAccept { participant, antwort } => {
                let ergebnis = self
                    .mitglied_pruefen(participant)
                    .and_then(|_| self.annahme_pruefen(participant))
                    .and_then(|_| self.session.remote_accept());
                if ergebnis.is_ok() {
                    self.ereignis(CallEvent::Verbunden {
                        room_id: self.room_id.clone(),
                    });
                }
                let _ = antwort.send(ergebnis);
            }
            RoomCommand::Hangup { participant, antwort } => {
                let ergebnis = self
                    .mitglied_pruefen(participant)
                    .and_then(|_| self.auflegen());
                let _ = antwort.send(ergebnis);
            }
            RoomCommand::ToggleMute { participant, antwort } => {
                let ergebnis = self
                    .mitglied_pruefen(participant)
                    .and_then(|_| self.session.toggle_mute(participant));
                if ergebnis.is_ok() {
                    self.teilnehmer_status_senden(participant);
                }
                let _ = antwort.send(ergebnis);
            }
            RoomCommand::ToggleVideo { participant, antwort } => {
                let ergebnis = self
                    .mitglied_pruefen(participant)
                    .and_then(|_| self.session.toggle_video(participant));
                if ergebnis.is_ok() {
                    self.teilnehmer_status_senden(participant);
                }
                let _ = antwort.send(ergebnis);
            }
            RoomCommand::ToggleScreenShare { participant, antwort } => {
                self.bildschirm_umschalten(participant, antwort);
            }
            RoomCommand::Signal { participant, payload } => {
                let typ = payload.typ();
                if let Err(e) = self.signal(participant, payload) {
                    tracing::debug!(room_id = %self.room_id, participant = %participant, typ, fehler = %e, "Signal abgelehnt");
                    self.fehler_melden(participant, &e);
                }
            }
            RoomCommand::Snapshot { antwort } => {
                let _ = antwort.send(self.session.snapshot());
            }
        }
    }

    fn beitreten(&mut self, participant: ParticipantId) -> bool {
        let neu = self.kontext.registry.join_room(&self.room_id, participant);
        if neu {
            self.bildschirm.insert(
                participant,
                ScreenShareController::neu(
                    self.room_id.clone(),
                    participant,
                    Arc::clone(&self.kontext.capture),
                    self.screen_tx.clone(),
                ),
            );
            let andere = self.andere(participant);
            self.kontext.broadcaster.an_mehrere_senden(
                &andere,
                self.nachricht(SignalPayload::ParticipantJoined {
                    participant_id: participant,
                })
                .von(participant),
            );
        }

        let (participants, producers) = self
            .kontext
            .registry
            .mit_router(&self.room_id, |r| (r.teilnehmer_ids(), r.producer_infos(participant)))
            .unwrap_or_default();
        self.kontext.broadcaster.an_teilnehmer_senden(
            &participant,
            self.nachricht(SignalPayload::RoomJoined {
                room_id: self.room_id.clone(),
                participants,
                producers,
            }),
        );
        self.kontext.broadcaster.an_teilnehmer_senden(
            &participant,
            self.nachricht(SignalPayload::CallStatus(self.session.snapshot())),
        );
        neu
    }

    fn verlassen(&mut self, participant: ParticipantId) -> Result<()> {
        self.mitglied_pruefen(participant)?;

        if let Some(mut controller) = self.bildschirm.remove(&participant) {
            let events = controller.stop(&self.kontext.registry);
            self.router_events_verteilen(events);
        }
        self.kandidaten
            .retain(|(von, an), _| *von != participant && *an != Some(participant));

        let events = self.kontext.registry.leave_room(&self.room_id, participant)?;
        self.router_events_verteilen(events);

        let andere = self.andere(participant);
        self.kontext.broadcaster.an_mehrere_senden(
            &andere,
            self.nachricht(SignalPayload::ParticipantLeft {
                participant_id: participant,
            })
            .von(participant),
        );

        // Ein Anruf ohne Teilnehmer endet
        if !self.kontext.registry.ist_aktiv(&self.room_id) && self.session.status() != CallState::Idle {
            let _ = self.auflegen();
        }
        Ok(())
    }

    /// Stoppt alle Bildschirmfreigaben, dann baut die Session ab
    fn auflegen(&mut self) -> Result<()> {
        if self.session.status() == CallState::Idle {
            return Err(NexusError::NotInCall(self.room_id.clone()));
        }

        self.bildschirm_alle_stoppen();
        let dauer = self.session.duration();
        let events = self.session.hangup()?;
        self.router_events_verteilen(events);
        self.ereignis(CallEvent::Beendet {
            room_id: self.room_id.clone(),
            dauer,
        });
        Ok(())
    }

    fn bildschirm_umschalten(&mut self, participant: ParticipantId, antwort: Antwort) {
        let startet = match self.bildschirm.get(&participant) {
            None => {
                let _ = antwort.send(Err(NexusError::UnknownParticipant {
                    participant,
                    room: self.room_id.clone(),
                }));
                return;
            }
            Some(c) => !c.ist_aktiv() && !c.ist_im_aufbau(),
        };

        if startet {
            if let Err(e) = self.session.verbunden_pruefen() {
                let _ = antwort.send(Err(e));
                return;
            }
        }

        let registry = self.kontext.registry.clone();
        let events = match self.bildschirm.get_mut(&participant) {
            Some(c) => c.toggle(&registry, Some(antwort)),
            None => Vec::new(),
        };
        self.router_events_verteilen(events);
    }

    fn bildschirm_alle_stoppen(&mut self) {
        let registry = self.kontext.registry.clone();
        let events: Vec<RouterEvent> = self
            .bildschirm
            .values_mut()
            .flat_map(|c| c.stop(&registry))
            .collect();
        self.router_events_verteilen(events);
    }

    // -----------------------------------------------------------------------
    // Medien und Aushandlung
    // -----------------------------------------------------------------------

    fn signal(&mut self, participant: ParticipantId, payload: SignalPayload) -> Result<()> {
        self.mitglied_pruefen(participant)?;
        let registry = self.kontext.registry.clone();
        let room = self.room_id.clone();

        match payload {
            SignalPayload::CreateTransport { direction } => {
                let descriptor = registry.create_transport(&room, participant, direction)?;
                self.an(participant, SignalPayload::TransportCreated(descriptor));
            }
            SignalPayload::ConnectTransport {
                transport_id,
                dtls_parameters,
            } => {
                registry.connect_transport(&room, participant, transport_id, dtls_parameters)?;
                self.an(participant, SignalPayload::TransportConnected { transport_id });
            }
            SignalPayload::Produce {
                transport_id,
                kind,
                rtp_parameters,
            } => {
                let (producer_id, events) =
                    registry.produce(&room, participant, transport_id, kind, rtp_parameters)?;
                self.an(participant, SignalPayload::Produced { producer_id, kind });
                self.router_events_verteilen(events);
            }
            SignalPayload::CloseProducer { producer_id } => {
                let screen = self
                    .bildschirm
                    .get(&participant)
                    .and_then(|c| c.producer_id())
                    == Some(producer_id);
                let events = if screen {
                    self.bildschirm
                        .get_mut(&participant)
                        .map(|c| c.stop(&registry))
                        .unwrap_or_default()
                } else {
                    registry.close_producer_von(&room, participant, producer_id)?
                };
                self.router_events_verteilen(events);
            }
            SignalPayload::Consume { producer_id } => {
                let consumer = registry.consume(&room, participant, producer_id)?;
                self.an(
                    participant,
                    SignalPayload::Consumed {
                        consumer_id: consumer.id,
                        producer_id: consumer.producer_id,
                        kind: consumer.kind,
                        rtp_parameters: consumer.rtp_parameters,
                    },
                );
            }
            SignalPayload::CloseConsumer { consumer_id } => {
                registry.close_consumer(&room, participant, consumer_id)?;
            }
            SignalPayload::Offer { target, .. } | SignalPayload::Answer { target, .. } => {
                self.ziel_pruefen(target)?;
                self.weiterleiten(participant, target, payload);
            }
            SignalPayload::IceCandidate {
                target,
                generation,
                sequence,
                ..
            } => {
                self.ziel_pruefen(target)?;
                let einordnung = self
                    .kandidaten
                    .entry((participant, target))
                    .or_insert_with(IceCandidateSequencer::new)
                    .einordnen(generation, sequence, payload);
                match einordnung {
                    Einordnung::Freigegeben(kandidaten) => {
                        for k in kandidaten {
                            self.weiterleiten(participant, target, k);
                        }
                    }
                    Einordnung::Gepuffert => {
                        tracing::trace!(room_id = %room, participant = %participant, generation, sequence = ?sequence, "ICE-Kandidat gepuffert");
                    }
                    Einordnung::Verworfen => {
                        tracing::debug!(room_id = %room, participant = %participant, generation, sequence = ?sequence, "Veralteter ICE-Kandidat verworfen");
                        self.ereignis(CallEvent::ProtokollfehlerVerworfen {
                            room_id: room,
                            code: ErrorCode::InvalidRequest,
                        });
                    }
                }
            }
            andere => {
                self.kontext.broadcaster.an_teilnehmer_senden(
                    &participant,
                    SignalMessage::error(
                        Some(room),
                        ErrorCode::InvalidRequest,
                        format!("'{}' wird im Raum nicht verarbeitet", andere.typ()),
                    ),
                );
            }
        }
        Ok(())
    }

    fn ziel_pruefen(&self, target: Option<ParticipantId>) -> Result<()> {
        match target {
            Some(t) => self.mitglied_pruefen(t),
            None => Ok(()),
        }
    }

    /// Relay an `target` oder alle anderen Teilnehmer
    fn weiterleiten(&self, von: ParticipantId, target: Option<ParticipantId>, payload: SignalPayload) {
        let nachricht = self.nachricht(payload).von(von);
        match target {
            Some(t) => {
                self.kontext.broadcaster.an_teilnehmer_senden(&t, nachricht);
            }
            None => {
                self.kontext
                    .broadcaster
                    .an_mehrere_senden(&self.andere(von), nachricht);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Timer und Bildschirmfreigabe
    // -----------------------------------------------------------------------

    fn timer(&mut self, ereignis: TimerEvent) {
        match ereignis {
            TimerEvent::RingingTimeout { versuch } => {
                let Some(events) = self.session.ringing_timeout(versuch) else {
                    return;
                };
                self.bildschirm_alle_stoppen();
                self.router_events_verteilen(events);
                let alle = self.alle();
                self.kontext
                    .broadcaster
                    .an_mehrere_senden(&alle, self.nachricht(SignalPayload::CallMissed));
                self.ereignis(CallEvent::Verpasst {
                    room_id: self.room_id.clone(),
                });
            }
            TimerEvent::Tick { epoche } => {
                self.session.tick(epoche);
            }
        }
    }

    fn bildschirm_ereignis(&mut self, ereignis: ScreenShareEvent) {
        let participant = match &ereignis {
            ScreenShareEvent::Erworben { participant, .. } | ScreenShareEvent::Beendet { participant, .. } => {
                *participant
            }
        };

        let registry = self.kontext.registry.clone();
        match self.bildschirm.get_mut(&participant) {
            Some(controller) => {
                let events = controller.ereignis(&registry, ereignis);
                self.router_events_verteilen(events);
            }
            None => {
                // Teilnehmer ist weg; eine verspaetete Aufnahme sofort freigeben
                if let ScreenShareEvent::Erworben {
                    ergebnis: Ok(capture),
                    ..
                } = ereignis
                {
                    self.kontext.capture.release(participant, &capture);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Verteilung
    // -----------------------------------------------------------------------

    fn router_events_verteilen(&self, events: Vec<RouterEvent>) {
        for event in events {
            match event {
                RouterEvent::NewProducer {
                    producer_id,
                    owner,
                    kind,
                    empfaenger,
                } => {
                    self.kontext.broadcaster.an_mehrere_senden(
                        &empfaenger,
                        self.nachricht(SignalPayload::NewProducer {
                            producer_id,
                            participant_id: owner,
                            kind,
                        })
                        .von(owner),
                    );
                }
                RouterEvent::ProducerClosed {
                    producer_id,
                    owner,
                    empfaenger,
                    ..
                } => {
                    self.kontext.broadcaster.an_mehrere_senden(
                        &empfaenger,
                        self.nachricht(SignalPayload::ProducerClosed { producer_id })
                            .von(owner),
                    );
                }
            }
        }
    }

    fn teilnehmer_status_senden(&self, participant: ParticipantId) {
        let flags = self.kontext.registry.mit_router(&self.room_id, |r| {
            r.teilnehmer(&participant).map(|p| (p.muted, p.video))
        });
        if let Some(Some((muted, video))) = flags {
            self.kontext.broadcaster.an_mehrere_senden(
                &self.alle(),
                self.nachricht(SignalPayload::ParticipantStatus {
                    participant_id: participant,
                    muted,
                    video,
                })
                .von(participant),
            );
        }
    }

    fn status_veroeffentlichen(&mut self) {
        let snapshot = self.session.snapshot();
        if snapshot == self.letzter_status {
            return;
        }
        self.status_tx.send_replace(snapshot.clone());
        self.kontext.broadcaster.an_mehrere_senden(
            &self.alle(),
            self.nachricht(SignalPayload::CallStatus(snapshot.clone())),
        );
        self.letzter_status = snapshot;
    }

    /// Kommandofehler gehen an den Absender, Protokollfehler nur ins Log
    fn fehler_melden(&self, participant: ParticipantId, fehler: &NexusError) {
        if fehler.ist_protokollfehler() {
            tracing::debug!(room_id = %self.room_id, participant = %participant, fehler = %fehler, "Protokollfehler verworfen");
            self.ereignis(CallEvent::ProtokollfehlerVerworfen {
                room_id: self.room_id.clone(),
                code: ErrorCode::from(fehler),
            });
            return;
        }
        self.kontext.broadcaster.an_teilnehmer_senden(
            &participant,
            SignalMessage::aus_fehler(Some(self.room_id.clone()), fehler),
        );
    }

    fn ereignis(&self, ereignis: CallEvent) {
        // Ohne Abonnenten ist das kein Fehler
        let _ = self.kontext.call_events.send(ereignis);
    }

    // -----------------------------------------------------------------------
    // Hilfen
    // -----------------------------------------------------------------------

    fn mitglied_pruefen(&self, participant: ParticipantId) -> Result<()> {
        let drin = self
            .kontext
            .registry
            .mit_router(&self.room_id, |r| r.ist_teilnehmer(&participant))
            .unwrap_or(false);
        if drin {
            Ok(())
        } else {
            Err(NexusError::UnknownParticipant {
                participant,
                room: self.room_id.clone(),
            })
        }
    }

    /// Der Anrufer kann seinen eigenen Anruf nicht annehmen
    fn annahme_pruefen(&self, participant: ParticipantId) -> Result<()> {
        if self.session.anrufer() == Some(participant) {
            return Err(NexusError::NotRinging(self.room_id.clone()));
        }
        Ok(())
    }

    fn alle(&self) -> Vec<ParticipantId> {
        self.kontext
            .registry
            .mit_router(&self.room_id, |r| r.teilnehmer_ids())
            .unwrap_or_default()
    }

    fn andere(&self, ausser: ParticipantId) -> Vec<ParticipantId> {
        self.alle().into_iter().filter(|p| *p != ausser).collect()
    }

    fn nachricht(&self, payload: SignalPayload) -> SignalMessage {
        SignalMessage::im_raum(self.room_id.clone(), payload)
    }

    fn an(&self, participant: ParticipantId, payload: SignalPayload) {
        self.kontext
            .broadcaster
            .an_teilnehmer_senden(&participant, self.nachricht(payload));
    }

    async fn beenden(mut self) {
        if let Some(verzeichnis) = self.verzeichnis.upgrade() {
            verzeichnis
                .raeume
                .remove_if(&self.room_id, |_, h| h.instanz() == self.instanz);
        }

        // Nachzuegler bekommen `RaumBeendet` ueber die verworfene Antwort
        self.postfach.close();
        let mut verworfen = 0usize;
        while self.postfach.recv().await.is_some() {
            verworfen += 1;
        }

        self.bildschirm.clear();
        self.ereignis(CallEvent::RaumGeschlossen {
            room_id: self.room_id.clone(),
        });
        tracing::info!(room_id = %self.room_id, instanz = self.instanz, verworfen, "Raum-Actor beendet");
    }
}
