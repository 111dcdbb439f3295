//! ScreenShareController – Lebenszyklus des Screen-Producers
//!
//! Ein Slot pro Teilnehmer: `Idle` -> `Acquiring` -> `Active` -> `Idle`.
//!
//! - Die Aufnahme wird asynchron ueber eine `CaptureSource` belegt. Das
//!   Ergebnis kommt als `ScreenShareEvent` ueber den Event-Kanal des
//!   Raum-Actors zurueck.
//! - Nur das Ergebnis der juengsten Anfrage darf den Zustand aendern;
//!   veraltete Ergebnisse werden verworfen, eine dabei belegte Aufnahme
//!   wird sofort wieder freigegeben.
//! - Endet die Aufnahme von aussen (Betriebssystem, Client), laeuft
//!   derselbe Stop-Pfad wie beim Umschalten.

use async_trait::async_trait;
use nexus_core::types::{CaptureId, ParticipantId, ProducerId, RoomId};
use nexus_core::{NexusError, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::registry::RouterRegistry;
use crate::router::RouterEvent;

/// Eine belegte Bildschirmaufnahme
#[derive(Debug, Clone)]
pub struct Capture {
    pub id: CaptureId,
    pub rtp_parameters: serde_json::Value,
    /// Wird von der Quelle ausgeloest wenn die Aufnahme von aussen endet
    pub beendet: CancellationToken,
}

impl Capture {
    pub fn neu(rtp_parameters: serde_json::Value) -> Self {
        Self {
            id: CaptureId::new(),
            rtp_parameters,
            beendet: CancellationToken::new(),
        }
    }
}

/// Quelle fuer Bildschirmaufnahmen
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Belegt eine Aufnahme; `CapturePermissionDenied` bei Ablehnung
    async fn acquire(&self, participant: ParticipantId, anfrage: u64) -> Result<Capture>;

    /// Gibt eine belegte Aufnahme frei
    fn release(&self, participant: ParticipantId, capture: &Capture);
}

/// Rueckmeldungen an den Raum-Actor
#[derive(Debug)]
pub enum ScreenShareEvent {
    Erworben {
        participant: ParticipantId,
        anfrage: u64,
        ergebnis: Result<Capture>,
    },
    Beendet {
        participant: ParticipantId,
        anfrage: u64,
    },
}

/// Antwortkanal fuer `toggle`: `Ok(true)` wenn danach geteilt wird
pub type Antwort = oneshot::Sender<Result<bool>>;

enum Slot {
    Idle,
    Acquiring {
        anfrage: u64,
        abbruch: CancellationToken,
        antwort: Option<Antwort>,
    },
    Active {
        anfrage: u64,
        producer_id: ProducerId,
        capture: Capture,
        waechter: CancellationToken,
    },
}

pub struct ScreenShareController {
    room_id: RoomId,
    participant: ParticipantId,
    quelle: Arc<dyn CaptureSource>,
    events: mpsc::Sender<ScreenShareEvent>,
    letzte_anfrage: u64,
    slot: Slot,
}

impl ScreenShareController {
    pub fn neu(
        room_id: RoomId,
        participant: ParticipantId,
        quelle: Arc<dyn CaptureSource>,
        events: mpsc::Sender<ScreenShareEvent>,
    ) -> Self {
        Self {
            room_id,
            participant,
            quelle,
            events,
            letzte_anfrage: 0,
            slot: Slot::Idle,
        }
    }

    pub fn ist_aktiv(&self) -> bool {
        matches!(self.slot, Slot::Active { .. })
    }

    pub fn ist_im_aufbau(&self) -> bool {
        matches!(self.slot, Slot::Acquiring { .. })
    }

    pub fn producer_id(&self) -> Option<ProducerId> {
        match &self.slot {
            Slot::Active { producer_id, .. } => Some(*producer_id),
            _ => None,
        }
    }

    /// Startet im Leerlauf, stoppt sonst (auch eine laufende Belegung)
    pub fn toggle(&mut self, registry: &RouterRegistry, antwort: Option<Antwort>) -> Vec<RouterEvent> {
        match self.slot {
            Slot::Idle => {
                self.start(antwort);
                Vec::new()
            }
            Slot::Acquiring { .. } | Slot::Active { .. } => {
                let events = self.stop(registry);
                antworten(antwort, Ok(false));
                events
            }
        }
    }

    /// Beginnt eine neue Belegung
    pub fn start(&mut self, antwort: Option<Antwort>) {
        if !matches!(self.slot, Slot::Idle) {
            antworten(antwort, Ok(self.ist_aktiv()));
            return;
        }

        self.letzte_anfrage += 1;
        let anfrage = self.letzte_anfrage;
        let abbruch = CancellationToken::new();

        let quelle = Arc::clone(&self.quelle);
        let tx = self.events.clone();
        let participant = self.participant;
        let token = abbruch.clone();
        tokio::spawn(async move {
            let ergebnis = tokio::select! {
                biased;
                r = quelle.acquire(participant, anfrage) => r,
                _ = token.cancelled() => Err(NexusError::CaptureCancelled),
            };
            let _ = tx
                .send(ScreenShareEvent::Erworben {
                    participant,
                    anfrage,
                    ergebnis,
                })
                .await;
        });

        tracing::debug!(
            room_id = %self.room_id,
            participant = %self.participant,
            anfrage,
            "Bildschirmaufnahme angefragt"
        );
        self.slot = Slot::Acquiring {
            anfrage,
            abbruch,
            antwort,
        };
    }

    /// Beendet Freigabe oder laufende Belegung; idempotent
    pub fn stop(&mut self, registry: &RouterRegistry) -> Vec<RouterEvent> {
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Idle => Vec::new(),
            Slot::Acquiring {
                anfrage,
                abbruch,
                antwort,
            } => {
                abbruch.cancel();
                antworten(antwort, Err(NexusError::CaptureCancelled));
                tracing::debug!(participant = %self.participant, anfrage, "Belegung abgebrochen");
                Vec::new()
            }
            Slot::Active {
                producer_id,
                capture,
                waechter,
                ..
            } => {
                waechter.cancel();
                self.quelle.release(self.participant, &capture);
                tracing::info!(
                    room_id = %self.room_id,
                    participant = %self.participant,
                    producer_id = %producer_id,
                    "Bildschirmfreigabe beendet"
                );
                registry.close_producer(&self.room_id, producer_id)
            }
        }
    }

    /// Verarbeitet ein Ereignis aus dem Event-Kanal
    pub fn ereignis(&mut self, registry: &RouterRegistry, event: ScreenShareEvent) -> Vec<RouterEvent> {
        match event {
            ScreenShareEvent::Erworben {
                anfrage, ergebnis, ..
            } => self.erworben(registry, anfrage, ergebnis),
            ScreenShareEvent::Beendet { anfrage, .. } => match self.slot {
                Slot::Active { anfrage: aktiv, .. } if aktiv == anfrage => {
                    tracing::info!(participant = %self.participant, "Aufnahme von aussen beendet");
                    self.stop(registry)
                }
                _ => Vec::new(),
            },
        }
    }

    fn erworben(
        &mut self,
        registry: &RouterRegistry,
        anfrage: u64,
        ergebnis: Result<Capture>,
    ) -> Vec<RouterEvent> {
        let aktuell = matches!(self.slot, Slot::Acquiring { anfrage: a, .. } if a == anfrage);
        if !aktuell {
            if let Ok(capture) = ergebnis {
                tracing::debug!(participant = %self.participant, anfrage, "Veraltete Aufnahme freigegeben");
                self.quelle.release(self.participant, &capture);
            }
            return Vec::new();
        }

        let Slot::Acquiring { antwort, .. } = std::mem::replace(&mut self.slot, Slot::Idle) else {
            return Vec::new();
        };

        let capture = match ergebnis {
            Ok(c) => c,
            Err(e) => {
                tracing::info!(participant = %self.participant, fehler = %e, "Bildschirmaufnahme fehlgeschlagen");
                antworten(antwort, Err(e));
                return Vec::new();
            }
        };

        match registry.produce_screen(&self.room_id, self.participant, capture.rtp_parameters.clone()) {
            Ok((producer_id, events)) => {
                let waechter = self.ende_beobachten(anfrage, &capture);
                self.slot = Slot::Active {
                    anfrage,
                    producer_id,
                    capture,
                    waechter,
                };
                antworten(antwort, Ok(true));
                events
            }
            Err(e) => {
                self.quelle.release(self.participant, &capture);
                antworten(antwort, Err(e));
                Vec::new()
            }
        }
    }

    fn ende_beobachten(&self, anfrage: u64, capture: &Capture) -> CancellationToken {
        let waechter = CancellationToken::new();
        let stop = waechter.clone();
        let ende = capture.beendet.clone();
        let tx = self.events.clone();
        let participant = self.participant;
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = ende.cancelled() => {
                    let _ = tx.send(ScreenShareEvent::Beendet { participant, anfrage }).await;
                }
            }
        });
        waechter
    }
}

impl Drop for ScreenShareController {
    fn drop(&mut self) {
        match &self.slot {
            Slot::Acquiring { abbruch, .. } => abbruch.cancel(),
            Slot::Active {
                capture, waechter, ..
            } => {
                waechter.cancel();
                self.quelle.release(self.participant, capture);
            }
            Slot::Idle => {}
        }
    }
}

fn antworten(antwort: Option<Antwort>, ergebnis: Result<bool>) {
    if let Some(tx) = antwort {
        let _ = tx.send(ergebnis);
    }
}
