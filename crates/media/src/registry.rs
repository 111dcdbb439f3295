//! RouterRegistry – ein Router pro aktivem Raum
//!
//! Router entstehen beim ersten `join-room` und verschwinden, sobald der
//! letzte Teilnehmer den Raum verlaesst.
//!
//! ## Nebenlaeufigkeit
//! - DashMap fuer den Zugriff auf die Raum-Tabelle aus mehreren Actors
//! - Pro Raum schreibt nur dessen Actor; Lesezugriffe (Metriken, Tests)
//!   sind von ueberall erlaubt
//! - Kein Guard wird ueber einen `.await` gehalten (alle Methoden sind sync)

use dashmap::DashMap;
use nexus_core::types::{ConsumerId, ParticipantId, ProducerId, RoomId, TransportId};
use nexus_core::{NexusError, Result};
use nexus_protocol::params::{DtlsParameters, MediaKind, TransportDescriptor, TransportDirection};
use std::sync::Arc;

use crate::allocator::{MediaConfig, ParameterAllocator};
use crate::router::{Consumer, Router, RouterEvent};

/// Summen ueber alle Raeume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStatistik {
    pub raeume: usize,
    pub teilnehmer: usize,
    pub transports: usize,
    pub producers: usize,
    pub consumers: usize,
}

/// Thread-safe und `Clone`-faehig (innerer Arc)
#[derive(Clone)]
pub struct RouterRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    router: DashMap<RoomId, Router>,
    parameter: ParameterAllocator,
}

impl RouterRegistry {
    pub fn neu(config: MediaConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                router: DashMap::new(),
                parameter: ParameterAllocator::neu(config),
            }),
        }
    }

    /// Tritt einem Raum bei; legt den Router bei Bedarf an
    ///
    /// Gibt `false` zurueck wenn der Teilnehmer bereits im Raum war.
    pub fn join_room(&self, room: &RoomId, participant: ParticipantId) -> bool {
        let mut router = self.inner.router.entry(room.clone()).or_insert_with(|| {
            tracing::info!(room_id = %room, "Router angelegt");
            Router::neu(room.clone())
        });
        let neu = router.beitreten(participant);
        if neu {
            tracing::info!(room_id = %room, participant = %participant, "Teilnehmer beigetreten");
        }
        neu
    }

    /// Verlaesst einen Raum; ein leerer Router wird entfernt
    pub fn leave_room(&self, room: &RoomId, participant: ParticipantId) -> Result<Vec<RouterEvent>> {
        let (events, leer) = self.mit_router_mut(room, |r| {
            let events = r.verlassen(participant)?;
            Ok((events, r.ist_leer()))
        })?;

        tracing::info!(room_id = %room, participant = %participant, "Teilnehmer hat Raum verlassen");

        if leer {
            self.inner.router.remove_if(room, |_, r| r.ist_leer());
            tracing::info!(room_id = %room, "Leerer Router entfernt");
        }
        Ok(events)
    }

    pub fn create_transport(
        &self,
        room: &RoomId,
        participant: ParticipantId,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor> {
        let alloc = &self.inner.parameter;
        self.mit_router_mut(room, |r| r.create_transport(participant, direction, alloc))
    }

    pub fn connect_transport(
        &self,
        room: &RoomId,
        participant: ParticipantId,
        transport_id: TransportId,
        dtls: DtlsParameters,
    ) -> Result<bool> {
        self.mit_router_mut(room, |r| r.connect_transport(participant, transport_id, dtls))
    }

    pub fn produce(
        &self,
        room: &RoomId,
        participant: ParticipantId,
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> Result<(ProducerId, Vec<RouterEvent>)> {
        self.mit_router_mut(room, |r| r.produce(participant, transport_id, kind, rtp_parameters))
    }

    /// Registriert einen Screen-Producer auf dem Send-Transport des Teilnehmers
    pub fn produce_screen(
        &self,
        room: &RoomId,
        participant: ParticipantId,
        rtp_parameters: serde_json::Value,
    ) -> Result<(ProducerId, Vec<RouterEvent>)> {
        self.mit_router_mut(room, |r| {
            let transport_id = r.send_transport_von(participant).ok_or_else(|| {
                NexusError::nicht_bereit(format!(
                    "{} hat keinen verbundenen Send-Transport",
                    participant
                ))
            })?;
            r.produce(participant, transport_id, MediaKind::Screen, rtp_parameters)
        })
    }

    pub fn consume(
        &self,
        room: &RoomId,
        participant: ParticipantId,
        producer_id: ProducerId,
    ) -> Result<Consumer> {
        self.mit_router_mut(room, |r| r.consume(participant, producer_id))
    }

    pub fn close_consumer(
        &self,
        room: &RoomId,
        participant: ParticipantId,
        consumer_id: ConsumerId,
    ) -> Result<bool> {
        self.mit_router_mut(room, |r| r.close_consumer_von(participant, consumer_id))
    }

    /// Idempotentes Entfernen eines Producers (auch ohne aktiven Raum)
    pub fn close_producer(&self, room: &RoomId, producer_id: ProducerId) -> Vec<RouterEvent> {
        self.inner
            .router
            .get_mut(room)
            .map(|mut r| r.close_producer(producer_id))
            .unwrap_or_default()
    }

    /// Entfernen eines Producers im Auftrag des Besitzers
    pub fn close_producer_von(
        &self,
        room: &RoomId,
        participant: ParticipantId,
        producer_id: ProducerId,
    ) -> Result<Vec<RouterEvent>> {
        self.mit_router_mut(room, |r| r.close_producer_von(participant, producer_id))
    }

    /// Schliesst alle Transports eines Raums (kaskadiert Producer/Consumer)
    pub fn close_room_transports(&self, room: &RoomId) -> Vec<RouterEvent> {
        self.inner
            .router
            .get_mut(room)
            .map(|mut r| {
                let events = r.alle_transports_schliessen();
                r.flags_zuruecksetzen();
                events
            })
            .unwrap_or_default()
    }

    pub fn toggle_mute(&self, room: &RoomId, participant: ParticipantId) -> Result<bool> {
        self.mit_router_mut(room, |r| r.stumm_umschalten(participant))
    }

    pub fn toggle_video(&self, room: &RoomId, participant: ParticipantId) -> Result<bool> {
        self.mit_router_mut(room, |r| r.video_umschalten(participant))
    }

    /// Lesezugriff auf den Router eines Raums
    pub fn mit_router<R>(&self, room: &RoomId, f: impl FnOnce(&Router) -> R) -> Option<R> {
        self.inner.router.get(room).map(|r| f(&r))
    }

    pub fn ist_aktiv(&self, room: &RoomId) -> bool {
        self.inner.router.contains_key(room)
    }

    pub fn aktive_raeume(&self) -> Vec<RoomId> {
        self.inner.router.iter().map(|e| e.key().clone()).collect()
    }

    pub fn statistik(&self) -> RegistryStatistik {
        self.inner
            .router
            .iter()
            .fold(RegistryStatistik::default(), |mut s, r| {
                s.raeume += 1;
                s.teilnehmer += r.teilnehmer_anzahl();
                s.transports += r.transport_anzahl();
                s.producers += r.producer_anzahl();
                s.consumers += r.consumer_anzahl();
                s
            })
    }

    fn mit_router_mut<R>(
        &self,
        room: &RoomId,
        f: impl FnOnce(&mut Router) -> Result<R>,
    ) -> Result<R> {
        let mut router = self
            .inner
            .router
            .get_mut(room)
            .ok_or_else(|| NexusError::UnknownRoom(room.clone()))?;
        f(&mut router)
    }
}

impl Default for RouterRegistry {
    fn default() -> Self {
        Self::neu(MediaConfig::default())
    }
}

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
                value: "01:02".into(),
            }],
        }
    }

    fn verbinden(reg: &RouterRegistry, room: &RoomId, p: ParticipantId) -> TransportId {
        let send = reg
            .create_transport(room, p, TransportDirection::Send)
            .unwrap();
        let recv = reg
            .create_transport(room, p, TransportDirection::Receive)
            .unwrap();
        reg.connect_transport(room, p, send.id, dtls()).unwrap();
        reg.connect_transport(room, p, recv.id, dtls()).unwrap();
        send.id
    }

    #[test]
    fn router_lazy_angelegt_und_leer_entfernt() {
        let reg = RouterRegistry::default();
        let room = RoomId::from("v1");
        let a = ParticipantId::new();
        let b = ParticipantId::new();

        assert!(!reg.ist_aktiv(&room));
        assert!(reg.join_room(&room, a));
        assert!(!reg.join_room(&room, a));
        reg.join_room(&room, b);
        assert!(reg.ist_aktiv(&room));

        reg.leave_room(&room, a).unwrap();
        assert!(reg.ist_aktiv(&room));
        reg.leave_room(&room, b).unwrap();
        assert!(!reg.ist_aktiv(&room));
        assert!(reg.aktive_raeume().is_empty());
    }

    #[test]
    fn unbekannter_raum_ist_protokollfehler() {
        let reg = RouterRegistry::default();
        let err = reg
            .create_transport(&RoomId::from("x"), ParticipantId::new(), TransportDirection::Send)
            .unwrap_err();
        assert!(err.ist_protokollfehler());
        assert!(reg
            .close_producer(&RoomId::from("x"), ProducerId::new())
            .is_empty());
    }

    #[test]
    fn raeume_sind_isoliert() {
        let reg = RouterRegistry::default();
        let r1 = RoomId::from("v1");
        let r2 = RoomId::from("v2");
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        reg.join_room(&r1, a);
        reg.join_room(&r2, b);

        let send = verbinden(&reg, &r1, a);
        let (pid, _) = reg
            .produce(&r1, a, send, MediaKind::Audio, json!({}))
            .unwrap();

        // b ist nicht in r1
        assert!(reg.consume(&r1, b, pid).is_err());
        assert!(reg.consume(&r2, b, pid).is_err());
    }

    #[test]
    fn auflegen_schliesst_alle_transports() {
        let reg = RouterRegistry::default();
        let room = RoomId::from("v1");
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        reg.join_room(&room, a);
        reg.join_room(&room, b);
        let send = verbinden(&reg, &room, a);
        verbinden(&reg, &room, b);
        let (pid, _) = reg
            .produce(&room, a, send, MediaKind::Audio, json!({}))
            .unwrap();
        reg.consume(&room, b, pid).unwrap();
        reg.toggle_mute(&room, a).unwrap();

        let events = reg.close_room_transports(&room);
        assert_eq!(events.len(), 1);
        let stat = reg.statistik();
        assert_eq!(stat.transports, 0);
        assert_eq!(stat.producers, 0);
        assert_eq!(stat.consumers, 0);
        assert_eq!(stat.teilnehmer, 2);
        assert_eq!(
            reg.mit_router(&room, |r| r.teilnehmer(&a).map(|p| p.muted)),
            Some(Some(false))
        );
    }

    #[test]
    fn screen_ohne_send_transport_nicht_bereit() {
        let reg = RouterRegistry::default();
        let room = RoomId::from("v1");
        let a = ParticipantId::new();
        reg.join_room(&room, a);
        assert!(matches!(
            reg.produce_screen(&room, a, json!({})),
            Err(NexusError::TransportNotReady(_))
        ));

        verbinden(&reg, &room, a);
        let (pid, _) = reg.produce_screen(&room, a, json!({})).unwrap();
        assert_eq!(
            reg.mit_router(&room, |r| r.screen_producer_von(a)),
            Some(Some(pid))
        );
    }
}
