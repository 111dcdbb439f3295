//! Verfolgte Timer
//!
//! Jeder Timer ist ein tokio-Task, der sein Ereignis in das Postfach des
//! Raum-Actors legt. Der Handle bricht den Task beim `Drop` ab; kein Timer
//! laeuft unbeobachtet weiter.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Timer-Ereignisse an den Raum-Actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Klingel-Timeout fuer einen bestimmten Anrufversuch
    RingingTimeout { versuch: u64 },
    /// Sekundentakt einer verbundenen Session
    Tick { epoche: u64 },
}

#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Feuert einmal nach `nach`
    pub fn einmalig(nach: Duration, tx: mpsc::Sender<TimerEvent>, ereignis: TimerEvent) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(nach).await;
            let _ = tx.send(ereignis).await;
        });
        Self { task }
    }

    /// Feuert alle `periode`, erstmals nach einer vollen Periode
    pub fn periodisch(periode: Duration, tx: mpsc::Sender<TimerEvent>, ereignis: TimerEvent) -> Self {
        let task = tokio::spawn(async move {
            let mut takt = interval_at(Instant::now() + periode, periode);
            takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                takt.tick().await;
                if tx.send(ereignis).await.is_err() {
                    break;
                }
            }
        });
        Self { task }
    }

    pub fn abbrechen(&self) {
        self.task.abort();
    }

    pub fn ist_beendet(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn einmalig_feuert_nach_ablauf() {
        let (tx, mut rx) = mpsc::channel(4);
        let start = Instant::now();
        let _t = TimerHandle::einmalig(
            Duration::from_secs(30),
            tx,
            TimerEvent::RingingTimeout { versuch: 1 },
        );
        assert_eq!(rx.recv().await, Some(TimerEvent::RingingTimeout { versuch: 1 }));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_bricht_ab() {
        let (tx, mut rx) = mpsc::channel(4);
        let t = TimerHandle::einmalig(
            Duration::from_secs(1),
            tx,
            TimerEvent::RingingTimeout { versuch: 1 },
        );
        drop(t);
        // Sender ist mit dem Task verschwunden
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn periodisch_im_sekundentakt() {
        let (tx, mut rx) = mpsc::channel(16);
        let start = Instant::now();
        let t = TimerHandle::periodisch(Duration::from_secs(1), tx, TimerEvent::Tick { epoche: 7 });
        for i in 1..=3u64 {
            assert_eq!(rx.recv().await, Some(TimerEvent::Tick { epoche: 7 }));
            assert_eq!(start.elapsed(), Duration::from_secs(i));
        }
        t.abbrechen();
        assert_eq!(rx.recv().await, None);
    }
}
