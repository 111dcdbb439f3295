//! RingingSupervisor – Klingel-Timeout eines Anrufversuchs
//!
//! Genau ein abbrechbarer Timer pro Session im Zustand `calling`. Jeder
//! Versuch traegt eine fortlaufende Nummer; ein Timeout wird nur fuer den
//! gerade laufenden Versuch angenommen. Beim Verlassen von `calling` wird
//! der Timer sofort abgebrochen, nicht erst beim Feuern verworfen.

use std::time::Duration;
use tokio::sync::mpsc;

use crate::timer::{TimerEvent, TimerHandle};

/// Standard-Klingeldauer
pub const STANDARD_RINGING_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct RingingSupervisor {
    timeout: Duration,
    laufend: Option<(u64, TimerHandle)>,
    letzter_versuch: u64,
}

impl RingingSupervisor {
    pub fn neu(timeout: Duration) -> Self {
        Self {
            timeout,
            laufend: None,
            letzter_versuch: 0,
        }
    }

    /// Startet einen neuen Versuch; ein laufender wird vorher abgebrochen
    pub fn starten(&mut self, tx: mpsc::Sender<TimerEvent>) -> u64 {
        self.abbrechen();
        self.letzter_versuch += 1;
        let versuch = self.letzter_versuch;
        let timer = TimerHandle::einmalig(self.timeout, tx, TimerEvent::RingingTimeout { versuch });
        self.laufend = Some((versuch, timer));
        versuch
    }

    /// Bricht den laufenden Timer ab; `true` wenn einer lief
    pub fn abbrechen(&mut self) -> bool {
        match self.laufend.take() {
            Some((versuch, timer)) => {
                timer.abbrechen();
                tracing::trace!(versuch, "Klingel-Timer abgebrochen");
                true
            }
            None => false,
        }
    }

    /// Nimmt ein gefeuertes Timeout an, falls es zum laufenden Versuch gehoert
    pub fn ausgeloest(&mut self, versuch: u64) -> bool {
        match &self.laufend {
            Some((aktuell, _)) if *aktuell == versuch => {
                self.laufend = None;
                true
            }
            _ => false,
        }
    }

    pub fn ist_aktiv(&self) -> bool {
        self.laufend.is_some()
    }

    pub fn versuch(&self) -> Option<u64> {
        self.laufend.as_ref().map(|(v, _)| *v)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for RingingSupervisor {
    fn default() -> Self {
        Self::neu(STANDARD_RINGING_TIMEOUT)
    }
}
