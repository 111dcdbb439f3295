//! Event-Broadcaster – Zustellung von Signaling-Nachrichten an Teilnehmer
//!
//! Verwaltet die Send-Queues aller verbundenen Teilnehmer. Wer in welchem
//! Raum ist, weiss der Router; der Broadcaster bekommt die Empfaengerliste
//! jeweils mitgeliefert.

use dashmap::DashMap;
use nexus_core::types::ParticipantId;
use nexus_protocol::signal::SignalMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Groesse der Send-Queue pro Teilnehmer
const SEND_QUEUE_GROESSE: usize = 256;

/// Handle auf die Send-Queue eines verbundenen Teilnehmers
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub participant: ParticipantId,
    pub tx: mpsc::Sender<SignalMessage>,
}

/// Ergebnis eines nicht-blockierenden Sendeversuchs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zustellung {
    Zugestellt,
    /// Queue voll: der Client kommt nicht hinterher
    Voll,
    /// Client bereits getrennt
    Geschlossen,
}

impl ClientSender {
    pub fn senden(&self, nachricht: SignalMessage) -> Zustellung {
        match self.tx.try_send(nachricht) {
            Ok(()) => Zustellung::Zugestellt,
            Err(mpsc::error::TrySendError::Full(n)) => {
                tracing::warn!(
                    participant = %self.participant,
                    typ = n.payload.typ(),
                    "Send-Queue voll"
                );
                Zustellung::Voll
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(participant = %self.participant, "Send-Queue geschlossen (Client getrennt)");
                Zustellung::Geschlossen
            }
        }
    }
}

/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<DashMap<ParticipantId, ClientSender>>,
}

impl EventBroadcaster {
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Registriert einen Teilnehmer und gibt seine Empfangs-Queue zurueck
    pub fn client_registrieren(&self, participant: ParticipantId) -> mpsc::Receiver<SignalMessage> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        self.inner.insert(participant, ClientSender { participant, tx });
        tracing::debug!(participant = %participant, "Client im Broadcaster registriert");
        rx
    }

    pub fn client_entfernen(&self, participant: &ParticipantId) {
        self.inner.remove(participant);
        tracing::debug!(participant = %participant, "Client aus Broadcaster entfernt");
    }

    /// Sendet an einen einzelnen Teilnehmer
    ///
    /// Laeuft die Queue ueber, wird der Client entfernt: sein Sender wird
    /// fallen gelassen, die Verbindung leert den Rest der Queue und trennt.
    /// Spaetere Nachrichten erreichen ihn nie mehr, es entsteht keine Luecke.
    pub fn an_teilnehmer_senden(&self, participant: &ParticipantId, nachricht: SignalMessage) -> bool {
        let zustellung = match self.inner.get(participant) {
            Some(sender) => sender.senden(nachricht),
            None => {
                tracing::debug!(participant = %participant, "Senden an unbekannten Client");
                return false;
            }
        };
        match zustellung {
            Zustellung::Zugestellt => true,
            Zustellung::Voll => {
                // Guard aus `get` ist hier bereits freigegeben
                self.inner.remove(participant);
                tracing::warn!(participant = %participant, "Client kommt nicht hinterher – wird getrennt");
                false
            }
            Zustellung::Geschlossen => false,
        }
    }

    /// Sendet an alle aufgefuehrten Teilnehmer; gibt die Anzahl Zustellungen zurueck
    pub fn an_mehrere_senden(&self, empfaenger: &[ParticipantId], nachricht: SignalMessage) -> usize {
        empfaenger
            .iter()
            .filter(|p| self.an_teilnehmer_senden(p, nachricht.clone()))
            .count()
    }

    pub fn client_anzahl(&self) -> usize {
        self.inner.len()
    }

    pub fn ist_registriert(&self, participant: &ParticipantId) -> bool {
        self.inner.contains_key(participant)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_nachricht(ts: u64) -> SignalMessage {
        SignalMessage::ping(ts)
    }

    #[tokio::test]
    async fn registrieren_und_senden() {
        let b = EventBroadcaster::neu();
        let p = ParticipantId::new();
        let mut rx = b.client_registrieren(p);
        assert!(b.ist_registriert(&p));

        assert!(b.an_teilnehmer_senden(&p, test_nachricht(1)));
        assert_eq!(rx.try_recv().unwrap(), test_nachricht(1));
        assert!(!b.an_teilnehmer_senden(&ParticipantId::new(), test_nachricht(2)));
    }

    #[tokio::test]
    async fn nur_aufgefuehrte_empfaenger() {
        let b = EventBroadcaster::neu();
        let p1 = ParticipantId::new();
        let p2 = ParticipantId::new();
        let p3 = ParticipantId::new();
        let mut rx1 = b.client_registrieren(p1);
        let mut rx2 = b.client_registrieren(p2);
        let mut rx3 = b.client_registrieren(p3);

        assert_eq!(b.an_mehrere_senden(&[p1, p2], test_nachricht(5)), 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err(), "p3 darf nichts empfangen");
    }

    #[tokio::test]
    async fn geschlossene_queue_zaehlt_nicht() {
        let b = EventBroadcaster::neu();
        let p1 = ParticipantId::new();
        let p2 = ParticipantId::new();
        let rx1 = b.client_registrieren(p1);
        let _rx2 = b.client_registrieren(p2);
        drop(rx1);

        assert_eq!(b.an_mehrere_senden(&[p1, p2], test_nachricht(1)), 1);

        b.client_entfernen(&p2);
        assert_eq!(b.client_anzahl(), 1);
    }

    #[tokio::test]
    async fn ueberlauf_trennt_den_client() {
        let b = EventBroadcaster::neu();
        let langsam = ParticipantId::new();
        let andere = ParticipantId::new();
        let mut rx = b.client_registrieren(langsam);
        let mut rx_andere = b.client_registrieren(andere);

        let zugestellt = (0..SEND_QUEUE_GROESSE as u64 + 10)
            .filter(|ts| b.an_teilnehmer_senden(&langsam, test_nachricht(*ts)))
            .count();
        assert_eq!(zugestellt, SEND_QUEUE_GROESSE);
        assert!(!b.ist_registriert(&langsam));

        // Nach dem Ueberlauf kommt nichts mehr an, auch wenn wieder Platz waere
        assert_eq!(b.an_mehrere_senden(&[langsam, andere], test_nachricht(9999)), 1);

        for ts in 0..SEND_QUEUE_GROESSE as u64 {
            assert_eq!(rx.recv().await, Some(test_nachricht(ts)));
        }
        assert_eq!(rx.recv().await, None, "Queue muss nach dem Rest geschlossen sein");
        assert_eq!(rx_andere.try_recv().unwrap(), test_nachricht(9999));
    }
}
