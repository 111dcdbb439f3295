//! nexus-server – Bibliotheks-Root
//!
//! Verbindet Signaling, Metriken und Health zu einem laufenden Server.

pub mod config;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use config::ServerConfig;
use nexus_observability::{
    observability_router, observability_server_starten, HealthState, MedienStand, NexusMetrics,
};
use nexus_signaling::{CallEvent, SignalingServer, SignalingState};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        self.laufen(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Ctrl-C-Handler fehlgeschlagen: {e}");
            }
            tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
        })
        .await
    }

    /// Startet alle Subsysteme und laeuft bis `shutdown` abgeschlossen ist
    ///
    /// Reihenfolge:
    /// 1. Signaling-Listener binden
    /// 2. Observability-Server starten (falls aktiviert)
    /// 3. Metrik-Abtaster und Ereignis-Verfolgung starten
    /// 4. Auf Shutdown warten, dann alle Tasks beenden
    pub async fn laufen(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let state = SignalingState::neu(self.config.signaling_config(), self.config.media_config());
        let metriken = NexusMetrics::neu()?;
        let health = HealthState::neu();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let signaling_addr = self.config.signaling_bind_adresse()?;
        let listener = TcpListener::bind(signaling_addr)
            .await
            .with_context(|| format!("Signaling-Port {signaling_addr} nicht verfuegbar"))?;
        tracing::info!(
            server_name = %self.config.server.name,
            adresse = ?listener.local_addr().ok(),
            "Signaling bereit"
        );
        let signaling = SignalingServer::neu(Arc::clone(&state), signaling_addr);
        let signaling_task = tokio::spawn(signaling.mit_listener(listener, shutdown_rx.clone()));
        health.signaling_status_setzen(true);

        let observability_task = if self.config.observability.aktiviert {
            let addr = self.config.observability_bind_adresse()?;
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Observability-Port {addr} nicht verfuegbar"))?;
            let router = observability_router(metriken.clone(), health.clone());
            let mut rx = shutdown_rx.clone();
            Some(tokio::spawn(observability_server_starten(
                listener,
                router,
                async move {
                    let _ = rx.wait_for(|beendet| *beendet).await;
                },
            )))
        } else {
            tracing::info!("Observability-Server deaktiviert");
            None
        };

        let intervall = Duration::from_secs(self.config.observability.abtast_intervall_sek);
        let abtaster = tokio::spawn(abtasten(
            Arc::clone(&state),
            metriken.clone(),
            health.clone(),
            intervall,
            shutdown_rx.clone(),
        ));
        let verfolgung = tokio::spawn(ereignisse_verfolgen(
            state.call_events_abonnieren(),
            metriken,
            shutdown_rx,
        ));

        tracing::info!("Server laeuft");
        shutdown.await;

        health.signaling_status_setzen(false);
        let _ = shutdown_tx.send(true);

        match signaling_task.await {
            Ok(Err(e)) => tracing::error!("Signaling-Server beendet mit Fehler: {e}"),
            Err(e) => tracing::error!("Signaling-Task abgebrochen: {e}"),
            Ok(Ok(())) => {}
        }
        if let Some(task) = observability_task {
            match task.await {
                Ok(Err(e)) => tracing::error!("Observability-Server beendet mit Fehler: {e}"),
                Err(e) => tracing::error!("Observability-Task abgebrochen: {e}"),
                Ok(Ok(())) => {}
            }
        }
        let _ = abtaster.await;
        let _ = verfolgung.await;

        tracing::info!(uptime_sek = state.uptime_sek(), "Server beendet");
        Ok(())
    }
}

/// Zaehlt ein Lebenszyklus-Ereignis in den Metriken
pub fn ereignis_erfassen(metriken: &NexusMetrics, ereignis: &CallEvent) {
    match ereignis {
        CallEvent::Gestartet { .. } => metriken.calls_started_total.inc(),
        CallEvent::Verbunden { .. } => metriken.calls_connected_total.inc(),
        CallEvent::Verpasst { .. } => metriken.calls_missed_total.inc(),
        CallEvent::Beendet { dauer, .. } => metriken.call_duration_seconds.observe(*dauer as f64),
        CallEvent::ProtokollfehlerVerworfen { code, .. } => {
            metriken.protokollfehler_zaehlen(&format!("{code:?}"))
        }
        CallEvent::RaumGeschlossen { .. } => {}
    }
}

/// Uebernimmt die aktuelle Last aus Registry und Broadcaster
pub fn stand_uebernehmen(state: &SignalingState, metriken: &NexusMetrics, health: &HealthState) {
    let statistik = state.registry.statistik();
    let clients = state.broadcaster.client_anzahl();

    metriken.medien_stand_setzen(MedienStand {
        raeume: statistik.raeume,
        transports: statistik.transports,
        producers: statistik.producers,
        consumers: statistik.consumers,
    });
    metriken.connected_clients.set(clients as i64);
    health.last_setzen(state.rooms.anzahl() as u64, clients as u64);
}

async fn abtasten(
    state: Arc<SignalingState>,
    metriken: NexusMetrics,
    health: HealthState,
    intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut takt = tokio::time::interval(intervall);
    loop {
        tokio::select! {
            _ = takt.tick() => stand_uebernehmen(&state, &metriken, &health),
            _ = shutdown_rx.wait_for(|beendet| *beendet) => break,
        }
    }
}

async fn ereignisse_verfolgen(
    mut rx: broadcast::Receiver<CallEvent>,
    metriken: NexusMetrics,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            ereignis = rx.recv() => match ereignis {
                Ok(ereignis) => ereignis_erfassen(&metriken, &ereignis),
                Err(broadcast::error::RecvError::Lagged(verpasst)) => {
                    tracing::warn!(verpasst, "Ereignis-Bus ueberlaufen, Metriken unvollstaendig");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown_rx.wait_for(|beendet| *beendet) => break,
        }
    }
}
