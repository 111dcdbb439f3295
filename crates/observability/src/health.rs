//! Health-Check-Endpunkt fuer Nexus
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Signaling-Last

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub signaling_bereit: bool,
    pub aktive_raeume: u64,
    pub verbundene_clients: u64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
///
/// Der Server setzt `signaling_bereit`, sobald der Listener gebunden ist,
/// und aktualisiert die Lastwerte zusammen mit den Metriken.
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    signaling_bereit: Arc<AtomicBool>,
    aktive_raeume: Arc<AtomicU64>,
    verbundene_clients: Arc<AtomicU64>,
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            signaling_bereit: Arc::new(AtomicBool::new(false)),
            aktive_raeume: Arc::new(AtomicU64::new(0)),
            verbundene_clients: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn signaling_status_setzen(&self, bereit: bool) {
        self.signaling_bereit.store(bereit, Ordering::Relaxed);
    }

    pub fn last_setzen(&self, raeume: u64, clients: u64) {
        self.aktive_raeume.store(raeume, Ordering::Relaxed);
        self.verbundene_clients.store(clients, Ordering::Relaxed);
    }

    /// Baut die aktuelle Antwort
    pub fn bericht(&self) -> HealthResponse {
        let bereit = self.signaling_bereit.load(Ordering::Relaxed);
        HealthResponse {
            status: if bereit {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            signaling_bereit: bereit,
            aktive_raeume: self.aktive_raeume.load(Ordering::Relaxed),
            verbundene_clients: self.verbundene_clients.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.bericht();
    let http_status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}
