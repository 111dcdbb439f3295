//! Transport-Verwaltung eines Raums
//!
//! Lebenszyklus pro Transport: `pending` -> `connected` -> `closed`.
//! Pro Teilnehmer existiert hoechstens ein Send- und ein Receive-Transport.
//! Geschlossene Transports werden sofort aus der Tabelle entfernt.

use nexus_core::types::{ParticipantId, RoomId, TransportId};
use nexus_core::{NexusError, Result};
use nexus_protocol::params::{
    DtlsParameters, IceCandidate, IceParameters, TransportDescriptor, TransportDirection,
};
use std::collections::HashMap;

use crate::allocator::ParameterAllocator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Pending,
    Connected,
    Closed,
}

/// Ein ausgehandelter Transport eines Teilnehmers
#[derive(Debug, Clone)]
pub struct Transport {
    pub id: TransportId,
    pub owner: ParticipantId,
    pub room_id: RoomId,
    pub direction: TransportDirection,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    /// Lokale (serverseitige) DTLS-Parameter
    pub dtls_parameters: DtlsParameters,
    /// DTLS-Parameter des Clients nach `connect`
    pub remote_dtls: Option<DtlsParameters>,
    pub state: TransportState,
}

impl Transport {
    pub fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor {
            id: self.id,
            direction: self.direction,
            ice_parameters: self.ice_parameters.clone(),
            ice_candidates: self.ice_candidates.clone(),
            dtls_parameters: self.dtls_parameters.clone(),
        }
    }

    pub fn ist_verbunden(&self) -> bool {
        self.state == TransportState::Connected
    }
}

/// Transports eines Raums
#[derive(Debug)]
pub struct TransportManager {
    room_id: RoomId,
    transports: HashMap<TransportId, Transport>,
    slots: HashMap<(ParticipantId, TransportDirection), TransportId>,
}

impl TransportManager {
    pub fn neu(room_id: RoomId) -> Self {
        Self {
            room_id,
            transports: HashMap::new(),
            slots: HashMap::new(),
        }
    }

    /// Legt einen Transport im Zustand `pending` an
    ///
    /// Schlaegt mit `DuplicateTransport` fehl wenn der Teilnehmer in dieser
    /// Richtung bereits einen Transport haelt.
    pub fn create(
        &mut self,
        owner: ParticipantId,
        direction: TransportDirection,
        alloc: &ParameterAllocator,
    ) -> Result<TransportDescriptor> {
        if self.slots.contains_key(&(owner, direction)) {
            return Err(NexusError::DuplicateTransport {
                participant: owner,
                richtung: direction.to_string(),
            });
        }

        let transport = Transport {
            id: TransportId::new(),
            owner,
            room_id: self.room_id.clone(),
            direction,
            ice_parameters: alloc.ice_parameter(),
            ice_candidates: alloc.ice_kandidaten(),
            dtls_parameters: alloc.dtls_parameter(),
            remote_dtls: None,
            state: TransportState::Pending,
        };
        let descriptor = transport.descriptor();

        self.slots.insert((owner, direction), transport.id);
        self.transports.insert(transport.id, transport);

        tracing::debug!(
            room_id = %self.room_id,
            participant = %owner,
            transport_id = %descriptor.id,
            richtung = %direction,
            "Transport angelegt"
        );
        Ok(descriptor)
    }

    /// Verbindet einen Transport mit den DTLS-Parametern des Clients
    ///
    /// Gibt `true` zurueck wenn der Transport dadurch verbunden wurde und
    /// `false` bei einer Wiederholung mit identischen Parametern.
    pub fn connect(
        &mut self,
        owner: ParticipantId,
        id: TransportId,
        dtls: DtlsParameters,
    ) -> Result<bool> {
        let transport = self
            .transports
            .get_mut(&id)
            .filter(|t| t.owner == owner)
            .ok_or(NexusError::UnknownTransport(id))?;

        match transport.state {
            TransportState::Connected => {
                if transport.remote_dtls.as_ref() == Some(&dtls) {
                    Ok(false)
                } else {
                    Err(NexusError::DtlsMismatch(id))
                }
            }
            TransportState::Pending => {
                transport.remote_dtls = Some(dtls);
                transport.state = TransportState::Connected;
                tracing::debug!(room_id = %self.room_id, transport_id = %id, "Transport verbunden");
                Ok(true)
            }
            TransportState::Closed => Err(NexusError::UnknownTransport(id)),
        }
    }

    /// Prueft ob ein Transport fuer Medien in der gegebenen Richtung bereit ist
    pub fn bereit_fuer(
        &self,
        id: TransportId,
        owner: ParticipantId,
        direction: TransportDirection,
    ) -> Result<&Transport> {
        let transport = self
            .transports
            .get(&id)
            .ok_or(NexusError::UnknownTransport(id))?;

        if transport.owner != owner {
            return Err(NexusError::nicht_bereit(format!(
                "{} gehoert nicht {}",
                id, owner
            )));
        }
        if transport.direction != direction {
            return Err(NexusError::nicht_bereit(format!(
                "{} ist ein {}-Transport",
                id, transport.direction
            )));
        }
        if !transport.ist_verbunden() {
            return Err(NexusError::nicht_bereit(format!("{} ist nicht verbunden", id)));
        }
        Ok(transport)
    }

    pub fn get(&self, id: &TransportId) -> Option<&Transport> {
        self.transports.get(id)
    }

    /// Transport eines Teilnehmers in einer Richtung
    pub fn transport_von(
        &self,
        owner: ParticipantId,
        direction: TransportDirection,
    ) -> Option<&Transport> {
        self.slots
            .get(&(owner, direction))
            .and_then(|id| self.transports.get(id))
    }

    /// Schliesst einen Transport; `None` wenn er nicht (mehr) existiert
    pub fn close(&mut self, id: TransportId) -> Option<Transport> {
        let mut transport = self.transports.remove(&id)?;
        self.slots.remove(&(transport.owner, transport.direction));
        transport.state = TransportState::Closed;
        tracing::debug!(room_id = %self.room_id, transport_id = %id, "Transport geschlossen");
        Some(transport)
    }

    /// IDs aller Transports eines Teilnehmers
    pub fn ids_von(&self, owner: ParticipantId) -> Vec<TransportId> {
        [TransportDirection::Send, TransportDirection::Receive]
            .iter()
            .filter_map(|d| self.slots.get(&(owner, *d)).copied())
            .collect()
    }

    pub fn alle_ids(&self) -> Vec<TransportId> {
        self.transports.keys().copied().collect()
    }

    pub fn anzahl(&self) -> usize {
        self.transports.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_protocol::params::{DtlsFingerprint, DtlsRole};

    fn client_dtls(wert: &str) -> DtlsParameters {
        DtlsParameters {
            role: DtlsRole::Client,
            fingerprints: vec![DtlsFingerprint {
                algorithm: "sha-256".into(),
                value: wert.into(),
            }],
        }
    }

    fn manager() -> (TransportManager, ParameterAllocator) {
        (
            TransportManager::neu(RoomId::from("v1")),
            ParameterAllocator::default(),
        )
    }

    #[test]
    fn ein_send_und_ein_receive_pro_teilnehmer() {
        let (mut tm, alloc) = manager();
        let p = ParticipantId::new();

        tm.create(p, TransportDirection::Send, &alloc).unwrap();
        tm.create(p, TransportDirection::Receive, &alloc).unwrap();
        let err = tm.create(p, TransportDirection::Send, &alloc).unwrap_err();
        assert!(matches!(err, NexusError::DuplicateTransport { .. }));
        assert_eq!(tm.anzahl(), 2);

        // Anderer Teilnehmer ist unabhaengig
        tm.create(ParticipantId::new(), TransportDirection::Send, &alloc)
            .unwrap();
        assert_eq!(tm.anzahl(), 3);
    }

    #[test]
    fn connect_ist_idempotent() {
        let (mut tm, alloc) = manager();
        let p = ParticipantId::new();
        let t = tm.create(p, TransportDirection::Send, &alloc).unwrap();

        assert!(tm.connect(p, t.id, client_dtls("AA")).unwrap());
        assert!(!tm.connect(p, t.id, client_dtls("AA")).unwrap());
        assert_eq!(
            tm.connect(p, t.id, client_dtls("BB")).unwrap_err(),
            NexusError::DtlsMismatch(t.id)
        );
        assert!(tm.get(&t.id).unwrap().ist_verbunden());
    }

    #[test]
    fn connect_unbekannt_oder_fremd() {
        let (mut tm, alloc) = manager();
        let p = ParticipantId::new();
        let t = tm.create(p, TransportDirection::Send, &alloc).unwrap();

        let fremd = ParticipantId::new();
        assert_eq!(
            tm.connect(fremd, t.id, client_dtls("AA")).unwrap_err(),
            NexusError::UnknownTransport(t.id)
        );
        let unbekannt = TransportId::new();
        assert_eq!(
            tm.connect(p, unbekannt, client_dtls("AA")).unwrap_err(),
            NexusError::UnknownTransport(unbekannt)
        );
    }

    #[test]
    fn bereit_erst_nach_connect() {
        let (mut tm, alloc) = manager();
        let p = ParticipantId::new();
        let t = tm.create(p, TransportDirection::Send, &alloc).unwrap();

        assert!(matches!(
            tm.bereit_fuer(t.id, p, TransportDirection::Send),
            Err(NexusError::TransportNotReady(_))
        ));
        tm.connect(p, t.id, client_dtls("AA")).unwrap();
        assert!(tm.bereit_fuer(t.id, p, TransportDirection::Send).is_ok());
        assert!(matches!(
            tm.bereit_fuer(t.id, p, TransportDirection::Receive),
            Err(NexusError::TransportNotReady(_))
        ));
        assert!(matches!(
            tm.bereit_fuer(t.id, ParticipantId::new(), TransportDirection::Send),
            Err(NexusError::TransportNotReady(_))
        ));
    }

    #[test]
    fn close_gibt_slot_frei() {
        let (mut tm, alloc) = manager();
        let p = ParticipantId::new();
        let t = tm.create(p, TransportDirection::Send, &alloc).unwrap();

        let geschlossen = tm.close(t.id).unwrap();
        assert_eq!(geschlossen.state, TransportState::Closed);
        assert!(tm.close(t.id).is_none());
        assert!(tm.ids_von(p).is_empty());

        // Slot wieder frei
        tm.create(p, TransportDirection::Send, &alloc).unwrap();
    }
}
