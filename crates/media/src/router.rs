//! SFU-Router eines Raums
//!
//! Der `Router` besitzt Teilnehmer, Transports, Producer und Consumer eines
//! Raums. Er wird ausschliesslich vom Raum-Actor veraendert und ist daher
//! selbst nicht synchronisiert.
//!
//! ## Invarianten
//! - Ein Consumer ueberlebt seinen Producer nie: das Entfernen eines
//!   Producers entfernt alle abhaengigen Consumer.
//! - Pro Teilnehmer hoechstens ein `screen`-Producer; ein neuer ersetzt den
//!   alten (vorher geschlossen).
//! - `new-producer` wird erst nach der Registrierung gemeldet.
//! - Schliessen ist idempotent.

use nexus_core::types::{ConsumerId, ParticipantId, ProducerId, RoomId, TransportId};
use nexus_core::{NexusError, Result};
use nexus_protocol::params::{DtlsParameters, MediaKind, TransportDescriptor, TransportDirection};
use nexus_protocol::signal::{ParticipantSnapshot, ProducerInfo};
use std::collections::{HashMap, HashSet};

use crate::allocator::ParameterAllocator;
use crate::transport::TransportManager;

// ---------------------------------------------------------------------------
// Datensaetze
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub muted: bool,
    pub video: bool,
    pub producers: HashSet<ProducerId>,
    beitritt: u64,
}

#[derive(Debug, Clone)]
pub struct Producer {
    pub id: ProducerId,
    pub owner: ParticipantId,
    pub kind: MediaKind,
    pub rtp_parameters: serde_json::Value,
    pub transport_id: TransportId,
}

#[derive(Debug, Clone)]
pub struct Consumer {
    pub id: ConsumerId,
    pub subscriber: ParticipantId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: serde_json::Value,
    /// Receive-Transport des Abonnenten
    pub transport_id: TransportId,
}

/// Benachrichtigungen, die nach einer Router-Aenderung verteilt werden
#[derive(Debug, Clone, PartialEq)]
pub enum RouterEvent {
    NewProducer {
        producer_id: ProducerId,
        owner: ParticipantId,
        kind: MediaKind,
        empfaenger: Vec<ParticipantId>,
    },
    ProducerClosed {
        producer_id: ProducerId,
        owner: ParticipantId,
        kind: MediaKind,
        empfaenger: Vec<ParticipantId>,
    },
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Router {
    room_id: RoomId,
    teilnehmer: HashMap<ParticipantId, Participant>,
    transports: TransportManager,
    producers: HashMap<ProducerId, Producer>,
    consumers: HashMap<ConsumerId, Consumer>,
    /// Producer -> abhaengige Consumer
    abonnenten: HashMap<ProducerId, HashSet<ConsumerId>>,
    naechster_beitritt: u64,
}

impl Router {
    pub fn neu(room_id: RoomId) -> Self {
        Self {
            transports: TransportManager::neu(room_id.clone()),
            room_id,
            teilnehmer: HashMap::new(),
            producers: HashMap::new(),
            consumers: HashMap::new(),
            abonnenten: HashMap::new(),
            naechster_beitritt: 0,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    // -----------------------------------------------------------------------
    // Teilnehmer
    // -----------------------------------------------------------------------

    /// Nimmt einen Teilnehmer auf; `false` wenn er schon im Raum ist
    pub fn beitreten(&mut self, id: ParticipantId) -> bool {
        if self.teilnehmer.contains_key(&id) {
            return false;
        }
        self.naechster_beitritt += 1;
        self.teilnehmer.insert(
            id,
            Participant {
                id,
                muted: false,
                video: false,
                producers: HashSet::new(),
                beitritt: self.naechster_beitritt,
            },
        );
        true
    }

    /// Entfernt einen Teilnehmer
    ///
    /// Beide Transports werden geschlossen bevor der Datensatz freigegeben
    /// wird, damit kein Producer den Teilnehmer ueberlebt.
    pub fn verlassen(&mut self, id: ParticipantId) -> Result<Vec<RouterEvent>> {
        self.teilnehmer_pruefen(id)?;

        let mut events = Vec::new();
        for tid in self.transports.ids_von(id) {
            events.extend(self.close_transport(tid));
        }
        let rest: Vec<ProducerId> = self
            .teilnehmer
            .get(&id)
            .map(|p| p.producers.iter().copied().collect())
            .unwrap_or_default();
        for pid in rest {
            events.extend(self.close_producer(pid));
        }

        self.teilnehmer.remove(&id);
        Ok(events)
    }

    pub fn ist_teilnehmer(&self, id: &ParticipantId) -> bool {
        self.teilnehmer.contains_key(id)
    }

    pub fn ist_leer(&self) -> bool {
        self.teilnehmer.is_empty()
    }

    pub fn teilnehmer(&self, id: &ParticipantId) -> Option<&Participant> {
        self.teilnehmer.get(id)
    }

    /// Teilnehmer in Beitrittsreihenfolge
    pub fn teilnehmer_ids(&self) -> Vec<ParticipantId> {
        let mut alle: Vec<&Participant> = self.teilnehmer.values().collect();
        alle.sort_by_key(|p| p.beitritt);
        alle.into_iter().map(|p| p.id).collect()
    }

    /// Schaltet das Mikrofon um und gibt den neuen Zustand zurueck
    pub fn stumm_umschalten(&mut self, id: ParticipantId) -> Result<bool> {
        let p = self.teilnehmer_mut(id)?;
        p.muted = !p.muted;
        Ok(p.muted)
    }

    /// Schaltet die Kamera um und gibt den neuen Zustand zurueck
    pub fn video_umschalten(&mut self, id: ParticipantId) -> Result<bool> {
        let p = self.teilnehmer_mut(id)?;
        p.video = !p.video;
        Ok(p.video)
    }

    /// Setzt Mute- und Video-Flag aller Teilnehmer zurueck
    pub fn flags_zuruecksetzen(&mut self) {
        for p in self.teilnehmer.values_mut() {
            p.muted = false;
            p.video = false;
        }
    }

    pub fn snapshot_teilnehmer(&self) -> Vec<ParticipantSnapshot> {
        self.teilnehmer_ids()
            .into_iter()
            .filter_map(|id| self.teilnehmer.get(&id))
            .map(|p| ParticipantSnapshot {
                id: p.id,
                muted: p.muted,
                video: p.video,
                screen_sharing: self.screen_producer_von(p.id).is_some(),
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Transports
    // -----------------------------------------------------------------------

    pub fn create_transport(
        &mut self,
        owner: ParticipantId,
        direction: TransportDirection,
        alloc: &ParameterAllocator,
    ) -> Result<TransportDescriptor> {
        self.teilnehmer_pruefen(owner)?;
        self.transports.create(owner, direction, alloc)
    }

    pub fn connect_transport(
        &mut self,
        owner: ParticipantId,
        id: TransportId,
        dtls: DtlsParameters,
    ) -> Result<bool> {
        self.transports.connect(owner, id, dtls)
    }

    /// Verbundener Send-Transport eines Teilnehmers
    pub fn send_transport_von(&self, owner: ParticipantId) -> Option<TransportId> {
        self.transports
            .transport_von(owner, TransportDirection::Send)
            .filter(|t| t.ist_verbunden())
            .map(|t| t.id)
    }

    /// Schliesst einen Transport samt aller Producer und Consumer darauf
    pub fn close_transport(&mut self, id: TransportId) -> Vec<RouterEvent> {
        let Some(transport) = self.transports.close(id) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        match transport.direction {
            TransportDirection::Send => {
                let betroffen: Vec<ProducerId> = self
                    .producers
                    .values()
                    .filter(|p| p.transport_id == id)
                    .map(|p| p.id)
                    .collect();
                for pid in betroffen {
                    events.extend(self.close_producer(pid));
                }
            }
            TransportDirection::Receive => {
                let betroffen: Vec<ConsumerId> = self
                    .consumers
                    .values()
                    .filter(|c| c.transport_id == id)
                    .map(|c| c.id)
                    .collect();
                for cid in betroffen {
                    self.close_consumer(cid);
                }
            }
        }
        events
    }

    /// Schliesst alle Transports des Raums (Auflegen)
    pub fn alle_transports_schliessen(&mut self) -> Vec<RouterEvent> {
        let mut events = Vec::new();
        for id in self.transports.alle_ids() {
            events.extend(self.close_transport(id));
        }
        events
    }

    // -----------------------------------------------------------------------
    // Producer
    // -----------------------------------------------------------------------

    /// Registriert einen Producer auf einem verbundenen Send-Transport
    ///
    /// Bei `screen` wird ein vorhandener Screen-Producer des Teilnehmers
    /// zuerst geschlossen. Das `NewProducer`-Event steht am Ende der Liste.
    pub fn produce(
        &mut self,
        owner: ParticipantId,
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> Result<(ProducerId, Vec<RouterEvent>)> {
        self.teilnehmer_pruefen(owner)?;
        self.transports
            .bereit_fuer(transport_id, owner, TransportDirection::Send)?;

        let mut events = Vec::new();
        if kind == MediaKind::Screen {
            if let Some(alt) = self.screen_producer_von(owner) {
                events.extend(self.close_producer(alt));
            }
        }

        let producer = Producer {
            id: ProducerId::new(),
            owner,
            kind,
            rtp_parameters,
            transport_id,
        };
        let id = producer.id;
        self.producers.insert(id, producer);
        self.abonnenten.insert(id, HashSet::new());
        if let Some(p) = self.teilnehmer.get_mut(&owner) {
            p.producers.insert(id);
        }

        tracing::info!(
            room_id = %self.room_id,
            participant = %owner,
            producer_id = %id,
            kind = ?kind,
            "Producer registriert"
        );

        events.push(RouterEvent::NewProducer {
            producer_id: id,
            owner,
            kind,
            empfaenger: self.andere_als(owner),
        });
        Ok((id, events))
    }

    /// Entfernt einen Producer samt Consumern; leer wenn unbekannt
    pub fn close_producer(&mut self, id: ProducerId) -> Vec<RouterEvent> {
        let Some(producer) = self.producers.remove(&id) else {
            return Vec::new();
        };

        let abhaengig = self.abonnenten.remove(&id).unwrap_or_default();
        for cid in &abhaengig {
            self.consumers.remove(cid);
        }
        if let Some(p) = self.teilnehmer.get_mut(&producer.owner) {
            p.producers.remove(&id);
        }

        tracing::info!(
            room_id = %self.room_id,
            producer_id = %id,
            consumer_entfernt = abhaengig.len(),
            "Producer geschlossen"
        );

        vec![RouterEvent::ProducerClosed {
            producer_id: id,
            owner: producer.owner,
            kind: producer.kind,
            empfaenger: self.andere_als(producer.owner),
        }]
    }

    /// Schliesst einen Producer im Auftrag seines Besitzers
    pub fn close_producer_von(
        &mut self,
        owner: ParticipantId,
        id: ProducerId,
    ) -> Result<Vec<RouterEvent>> {
        match self.producers.get(&id) {
            None => Ok(Vec::new()),
            Some(p) if p.owner != owner => Err(NexusError::UnknownProducer(id)),
            Some(_) => Ok(self.close_producer(id)),
        }
    }

    pub fn producer(&self, id: &ProducerId) -> Option<&Producer> {
        self.producers.get(id)
    }

    pub fn screen_producer_von(&self, owner: ParticipantId) -> Option<ProducerId> {
        self.teilnehmer.get(&owner).and_then(|p| {
            p.producers
                .iter()
                .copied()
                .find(|id| matches!(self.producers.get(id), Some(pr) if pr.kind == MediaKind::Screen))
        })
    }

    /// Producer aller Teilnehmer ausser `ausser` (fuer Neuankoemmlinge)
    pub fn producer_infos(&self, ausser: ParticipantId) -> Vec<ProducerInfo> {
        self.producers
            .values()
            .filter(|p| p.owner != ausser)
            .map(|p| ProducerInfo {
                producer_id: p.id,
                participant_id: p.owner,
                kind: p.kind,
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Consumer
    // -----------------------------------------------------------------------

    /// Abonniert einen Producer ueber den verbundenen Receive-Transport
    pub fn consume(&mut self, subscriber: ParticipantId, producer_id: ProducerId) -> Result<Consumer> {
        self.teilnehmer_pruefen(subscriber)?;
        let producer = self
            .producers
            .get(&producer_id)
            .ok_or(NexusError::UnknownProducer(producer_id))?;
        let transport = self
            .transports
            .transport_von(subscriber, TransportDirection::Receive)
            .filter(|t| t.ist_verbunden())
            .ok_or_else(|| {
                NexusError::nicht_bereit(format!("{} hat keinen verbundenen Receive-Transport", subscriber))
            })?;

        let consumer = Consumer {
            id: ConsumerId::new(),
            subscriber,
            producer_id,
            kind: producer.kind,
            rtp_parameters: producer.rtp_parameters.clone(),
            transport_id: transport.id,
        };
        self.consumers.insert(consumer.id, consumer.clone());
        self.abonnenten
            .entry(producer_id)
            .or_default()
            .insert(consumer.id);

        tracing::debug!(
            room_id = %self.room_id,
            subscriber = %subscriber,
            producer_id = %producer_id,
            consumer_id = %consumer.id,
            "Consumer angelegt"
        );
        Ok(consumer)
    }

    /// Entfernt einen einzelnen Consumer; `false` wenn unbekannt
    pub fn close_consumer(&mut self, id: ConsumerId) -> bool {
        let Some(consumer) = self.consumers.remove(&id) else {
            return false;
        };
        if let Some(set) = self.abonnenten.get_mut(&consumer.producer_id) {
            set.remove(&id);
        }
        true
    }

    /// Schliesst einen Consumer im Auftrag seines Abonnenten
    pub fn close_consumer_von(&mut self, subscriber: ParticipantId, id: ConsumerId) -> Result<bool> {
        match self.consumers.get(&id) {
            None => Ok(false),
            Some(c) if c.subscriber != subscriber => Err(NexusError::UnknownConsumer(id)),
            Some(_) => Ok(self.close_consumer(id)),
        }
    }

    // -----------------------------------------------------------------------
    // Zaehler
    // -----------------------------------------------------------------------

    pub fn transport_anzahl(&self) -> usize {
        self.transports.anzahl()
    }

    pub fn producer_anzahl(&self) -> usize {
        self.producers.len()
    }

    pub fn consumer_anzahl(&self) -> usize {
        self.consumers.len()
    }

    pub fn teilnehmer_anzahl(&self) -> usize {
        self.teilnehmer.len()
    }

    /// Lebende Consumer eines Producers
    pub fn consumer_von(&self, producer_id: &ProducerId) -> usize {
        self.abonnenten.get(producer_id).map(|s| s.len()).unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    fn teilnehmer_pruefen(&self, id: ParticipantId) -> Result<()> {
        if self.teilnehmer.contains_key(&id) {
            Ok(())
        } else {
            Err(NexusError::UnknownParticipant {
                participant: id,
                room: self.room_id.clone(),
            })
        }
    }

    fn teilnehmer_mut(&mut self, id: ParticipantId) -> Result<&mut Participant> {
        let room = self.room_id.clone();
        self.teilnehmer
            .get_mut(&id)
            .ok_or(NexusError::UnknownParticipant {
                participant: id,
                room,
            })
    }

    fn andere_als(&self, id: ParticipantId) -> Vec<ParticipantId> {
        self.teilnehmer_ids()
            .into_iter()
            .filter(|p| *p != id)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_protocol::params::{DtlsFingerprint, DtlsRole};
    use serde_json::json;

    fn dtls() -> DtlsParameters {
        DtlsParameters {
            role: DtlsRole::Client,
            fingerprints: vec![DtlsFingerprint {
                algorithm: "sha-256".into(),
                value: "AA:BB".into(),
            }],
        }
    }

    /// Teilnehmer mit verbundenem Send- und Receive-Transport
    fn bereiter_teilnehmer(router: &mut Router, alloc: &ParameterAllocator) -> (ParticipantId, TransportId) {
        let p = ParticipantId::new();
        router.beitreten(p);
        let send = router
            .create_transport(p, TransportDirection::Send, alloc)
            .unwrap();
        let recv = router
            .create_transport(p, TransportDirection::Receive, alloc)
            .unwrap();
        router.connect_transport(p, send.id, dtls()).unwrap();
        router.connect_transport(p, recv.id, dtls()).unwrap();
        (p, send.id)
    }

    #[test]
    fn produce_meldet_nur_andere_teilnehmer() {
        let alloc = ParameterAllocator::default();
        let mut router = Router::neu(RoomId::from("v1"));
        let (a, send_a) = bereiter_teilnehmer(&mut router, &alloc);
        let (b, _) = bereiter_teilnehmer(&mut router, &alloc);
        let (c, _) = bereiter_teilnehmer(&mut router, &alloc);

        let (pid, events) = router
            .produce(a, send_a, MediaKind::Audio, json!({"codecs": []}))
            .unwrap();

        assert!(router.producer(&pid).is_some(), "Vor dem Event registriert");
        assert_eq!(
            events,
            vec![RouterEvent::NewProducer {
                producer_id: pid,
                owner: a,
                kind: MediaKind::Audio,
                empfaenger: vec![b, c],
            }]
        );
    }

    #[test]
    fn produce_ohne_verbindung_abgelehnt() {
        let alloc = ParameterAllocator::default();
        let mut router = Router::neu(RoomId::from("v1"));
        let p = ParticipantId::new();
        router.beitreten(p);
        let t = router
            .create_transport(p, TransportDirection::Send, &alloc)
            .unwrap();

        let err = router
            .produce(p, t.id, MediaKind::Video, json!({}))
            .unwrap_err();
        assert!(matches!(err, NexusError::TransportNotReady(_)));
        assert_eq!(router.producer_anzahl(), 0);
    }

    #[test]
    fn screen_wird_ersetzt_nicht_gestapelt() {
        let alloc = ParameterAllocator::default();
        let mut router = Router::neu(RoomId::from("v1"));
        let (a, send) = bereiter_teilnehmer(&mut router, &alloc);

        let (erster, _) = router.produce(a, send, MediaKind::Screen, json!({})).unwrap();
        let (zweiter, events) = router.produce(a, send, MediaKind::Screen, json!({})).unwrap();

        assert_eq!(router.screen_producer_von(a), Some(zweiter));
        assert!(router.producer(&erster).is_none());
        assert!(matches!(
            events.first(),
            Some(RouterEvent::ProducerClosed { producer_id, .. }) if *producer_id == erster
        ));
        assert!(matches!(events.last(), Some(RouterEvent::NewProducer { .. })));
    }

    #[test]
    fn consumer_zaehlung_und_kaskade() {
        let alloc = ParameterAllocator::default();
        let mut router = Router::neu(RoomId::from("v1"));
        let (a, send) = bereiter_teilnehmer(&mut router, &alloc);
        let (b, _) = bereiter_teilnehmer(&mut router, &alloc);
        let (c, _) = bereiter_teilnehmer(&mut router, &alloc);

        let (pid, _) = router.produce(a, send, MediaKind::Audio, json!({})).unwrap();
        let cb = router.consume(b, pid).unwrap();
        router.consume(c, pid).unwrap();
        router.consume(c, pid).unwrap();
        assert_eq!(router.consumer_von(&pid), 3);

        assert!(router.close_consumer(cb.id));
        assert!(!router.close_consumer(cb.id));
        assert_eq!(router.consumer_von(&pid), 2);

        let events = router.close_producer(pid);
        assert_eq!(events.len(), 1);
        assert_eq!(router.consumer_von(&pid), 0);
        assert_eq!(router.consumer_anzahl(), 0);

        // Idempotent
        assert!(router.close_producer(pid).is_empty());
    }

    #[test]
    fn consume_braucht_receive_transport() {
        let alloc = ParameterAllocator::default();
        let mut router = Router::neu(RoomId::from("v1"));
        let (a, send) = bereiter_teilnehmer(&mut router, &alloc);
        let (pid, _) = router.produce(a, send, MediaKind::Audio, json!({})).unwrap();

        let ohne = ParticipantId::new();
        router.beitreten(ohne);
        assert!(matches!(
            router.consume(ohne, pid),
            Err(NexusError::TransportNotReady(_))
        ));
        assert!(matches!(
            router.consume(a, ProducerId::new()),
            Err(NexusError::UnknownProducer(_))
        ));
    }

    #[test]
    fn verlassen_raeumt_alles_ab() {
        let alloc = ParameterAllocator::default();
        let mut router = Router::neu(RoomId::from("v1"));
        let (a, send) = bereiter_teilnehmer(&mut router, &alloc);
        let (b, send_b) = bereiter_teilnehmer(&mut router, &alloc);

        let (pa, _) = router.produce(a, send, MediaKind::Audio, json!({})).unwrap();
        let (pb, _) = router.produce(b, send_b, MediaKind::Video, json!({})).unwrap();
        router.consume(b, pa).unwrap();
        router.consume(a, pb).unwrap();

        let events = router.verlassen(a).unwrap();
        assert!(matches!(
            events.as_slice(),
            [RouterEvent::ProducerClosed { producer_id, empfaenger, .. }]
                if *producer_id == pa && *empfaenger == vec![b]
        ));
        assert!(!router.ist_teilnehmer(&a));
        assert_eq!(router.producer_anzahl(), 1);
        assert_eq!(router.consumer_anzahl(), 0, "Consumer von a auf pb mit entfernt");
        assert_eq!(router.transport_anzahl(), 2);
        assert!(router.verlassen(a).is_err());
    }

    #[test]
    fn alle_transports_schliessen_leert_medien() {
        let alloc = ParameterAllocator::default();
        let mut router = Router::neu(RoomId::from("v1"));
        let (a, send) = bereiter_teilnehmer(&mut router, &alloc);
        let (b, _) = bereiter_teilnehmer(&mut router, &alloc);
        let (pid, _) = router.produce(a, send, MediaKind::Audio, json!({})).unwrap();
        router.consume(b, pid).unwrap();

        router.alle_transports_schliessen();
        assert_eq!(router.transport_anzahl(), 0);
        assert_eq!(router.producer_anzahl(), 0);
        assert_eq!(router.consumer_anzahl(), 0);
        assert_eq!(router.teilnehmer_anzahl(), 2, "Teilnehmer bleiben im Raum");
    }

    #[test]
    fn fremder_producer_nicht_schliessbar() {
        let alloc = ParameterAllocator::default();
        let mut router = Router::neu(RoomId::from("v1"));
        let (a, send) = bereiter_teilnehmer(&mut router, &alloc);
        let (b, _) = bereiter_teilnehmer(&mut router, &alloc);
        let (pid, _) = router.produce(a, send, MediaKind::Audio, json!({})).unwrap();

        assert_eq!(
            router.close_producer_von(b, pid).unwrap_err(),
            NexusError::UnknownProducer(pid)
        );
        assert_eq!(router.close_producer_von(a, pid).unwrap().len(), 1);
        assert!(router.close_producer_von(a, pid).unwrap().is_empty());
    }

    #[test]
    fn flags_umschalten() {
        let mut router = Router::neu(RoomId::from("v1"));
        let p = ParticipantId::new();
        router.beitreten(p);
        assert!(router.stumm_umschalten(p).unwrap());
        assert!(router.video_umschalten(p).unwrap());
        assert!(!router.stumm_umschalten(p).unwrap());

        let snap = router.snapshot_teilnehmer();
        assert_eq!(snap.len(), 1);
        assert!(!snap[0].muted);
        assert!(snap[0].video);

        router.flags_zuruecksetzen();
        assert!(!router.teilnehmer(&p).unwrap().video);
    }
}
