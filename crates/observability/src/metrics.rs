//! Prometheus-kompatible Metriken fuer Nexus
//!
//! Registrierte Metriken:
//! - `nexus_connected_clients` – Gauge: Verbundene Signaling-Clients
//! - `nexus_rooms_active` – Gauge: Raeume mit Router
//! - `nexus_transports_active` – Gauge: Offene WebRTC-Transports
//! - `nexus_producers_active` – Gauge: Aktive Producer
//! - `nexus_consumers_active` – Gauge: Aktive Consumer
//! - `nexus_calls_started_total` – Counter: Gestartete Anrufe
//! - `nexus_calls_connected_total` – Counter: Angenommene Anrufe
//! - `nexus_calls_missed_total` – Counter: Verpasste Anrufe
//! - `nexus_call_duration_seconds` – Histogram: Gespraechsdauer beendeter Anrufe
//! - `nexus_protocol_errors_total` – Counter: Verworfene Nachrichten (code)

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Momentaufnahme der Medienlast, vom Server periodisch gesetzt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MedienStand {
    pub raeume: usize,
    pub transports: usize,
    pub producers: usize,
    pub consumers: usize,
}

/// Alle Nexus-Prometheus-Metriken
#[derive(Clone)]
pub struct NexusMetrics {
    pub registry: Arc<Registry>,

    pub connected_clients: IntGauge,
    pub rooms_active: IntGauge,
    pub transports_active: IntGauge,
    pub producers_active: IntGauge,
    pub consumers_active: IntGauge,

    pub calls_started_total: IntCounter,
    pub calls_connected_total: IntCounter,
    pub calls_missed_total: IntCounter,
    pub call_duration_seconds: Histogram,
    pub protocol_errors_total: IntCounterVec,
}

fn gauge(registry: &Registry, name: &str, hilfe: &str) -> Result<IntGauge> {
    let g = IntGauge::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

fn zaehler(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let c = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl NexusMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_clients = gauge(
            &registry,
            "nexus_connected_clients",
            "Anzahl verbundener Signaling-Clients",
        )?;
        let rooms_active = gauge(&registry, "nexus_rooms_active", "Anzahl Raeume mit Router")?;
        let transports_active = gauge(
            &registry,
            "nexus_transports_active",
            "Anzahl offener WebRTC-Transports",
        )?;
        let producers_active =
            gauge(&registry, "nexus_producers_active", "Anzahl aktiver Producer")?;
        let consumers_active =
            gauge(&registry, "nexus_consumers_active", "Anzahl aktiver Consumer")?;

        let calls_started_total = zaehler(
            &registry,
            "nexus_calls_started_total",
            "Gesamtanzahl gestarteter Anrufe",
        )?;
        let calls_connected_total = zaehler(
            &registry,
            "nexus_calls_connected_total",
            "Gesamtanzahl angenommener Anrufe",
        )?;
        let calls_missed_total = zaehler(
            &registry,
            "nexus_calls_missed_total",
            "Gesamtanzahl verpasster Anrufe",
        )?;

        let call_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "nexus_call_duration_seconds",
                "Gespraechsdauer beendeter Anrufe in Sekunden",
            )
            .buckets(vec![
                5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
            ]),
        )?;
        registry.register(Box::new(call_duration_seconds.clone()))?;

        let protocol_errors_total = IntCounterVec::new(
            Opts::new(
                "nexus_protocol_errors_total",
                "Verworfene Nachrichten mit ungueltigem Bezug",
            ),
            &["code"],
        )?;
        registry.register(Box::new(protocol_errors_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            rooms_active,
            transports_active,
            producers_active,
            consumers_active,
            calls_started_total,
            calls_connected_total,
            calls_missed_total,
            call_duration_seconds,
            protocol_errors_total,
        })
    }

    /// Uebernimmt eine Momentaufnahme der Medienlast
    pub fn medien_stand_setzen(&self, stand: MedienStand) {
        self.rooms_active.set(stand.raeume as i64);
        self.transports_active.set(stand.transports as i64);
        self.producers_active.set(stand.producers as i64);
        self.consumers_active.set(stand.consumers as i64);
    }

    pub fn protokollfehler_zaehlen(&self, code: &str) {
        self.protocol_errors_total.with_label_values(&[code]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: NexusMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<NexusMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medien_stand_setzt_alle_gauges() {
        let metriken = NexusMetrics::neu().unwrap();
        metriken.medien_stand_setzen(MedienStand {
            raeume: 2,
            transports: 8,
            producers: 5,
            consumers: 6,
        });
        assert_eq!(metriken.rooms_active.get(), 2);
        assert_eq!(metriken.transports_active.get(), 8);
        assert_eq!(metriken.producers_active.get(), 5);
        assert_eq!(metriken.consumers_active.get(), 6);

        metriken.medien_stand_setzen(MedienStand::default());
        assert_eq!(metriken.transports_active.get(), 0);
    }

    #[test]
    fn protokollfehler_nach_code() {
        let metriken = NexusMetrics::neu().unwrap();
        metriken.protokollfehler_zaehlen("UnknownTransport");
        metriken.protokollfehler_zaehlen("UnknownTransport");
        metriken.protokollfehler_zaehlen("UnknownProducer");

        let wert = |code: &str| {
            metriken
                .protocol_errors_total
                .with_label_values(&[code])
                .get()
        };
        assert_eq!(wert("UnknownTransport"), 2);
        assert_eq!(wert("UnknownProducer"), 1);
    }

    #[test]
    fn export_enthaelt_anrufzaehler() {
        let metriken = NexusMetrics::neu().unwrap();
        metriken.calls_started_total.inc();
        metriken.calls_missed_total.inc();
        metriken.call_duration_seconds.observe(42.0);

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("nexus_calls_started_total 1"));
        assert!(output.contains("nexus_calls_missed_total 1"));
        assert!(output.contains("nexus_call_duration_seconds_count 1"));
        assert!(output.contains("# TYPE nexus_rooms_active gauge"));
    }

    #[test]
    fn getrennte_registries() {
        // Jede Instanz hat ihre eigene Registry, keine Doppelregistrierung
        let a = NexusMetrics::neu().unwrap();
        let b = NexusMetrics::neu().unwrap();
        a.calls_started_total.inc();
        assert_eq!(b.calls_started_total.get(), 0);
    }
}
