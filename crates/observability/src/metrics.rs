//! Prometheus-kompatible Metriken fuer Plauder
//!
//! Registrierte Metriken:
//! - `plauder_sessions_active` – Gauge: Aktuell angemeldete Clients
//! - `plauder_messages_received_total` – Counter: Von Clients empfangene Nachrichten (type)
//! - `plauder_messages_sent_total` – Counter: Vom Relay gesendete Nachrichten (type)
//! - `plauder_status_errors_total` – Counter: Fehler-Statusmeldungen des Relays

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Plauder-Prometheus-Metriken
#[derive(Clone)]
pub struct PlauderMetrics {
    pub registry: Arc<Registry>,

    pub sessions_active: IntGauge,
    pub messages_received_total: IntCounterVec,
    pub messages_sent_total: IntCounterVec,
    pub status_errors_total: IntCounter,
}

impl PlauderMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let sessions_active = IntGauge::with_opts(Opts::new(
            "plauder_sessions_active",
            "Anzahl aktuell angemeldeter Clients",
        ))?;
        registry.register(Box::new(sessions_active.clone()))?;

        let messages_received_total = IntCounterVec::new(
            Opts::new(
                "plauder_messages_received_total",
                "Gesamtanzahl von Clients empfangener Nachrichten",
            ),
            &["type"],
        )?;
        registry.register(Box::new(messages_received_total.clone()))?;

        let messages_sent_total = IntCounterVec::new(
            Opts::new(
                "plauder_messages_sent_total",
                "Gesamtanzahl vom Relay gesendeter Nachrichten",
            ),
            &["type"],
        )?;
        registry.register(Box::new(messages_sent_total.clone()))?;

        let status_errors_total = IntCounter::with_opts(Opts::new(
            "plauder_status_errors_total",
            "Gesamtanzahl gemeldeter Fehler-Status",
        ))?;
        registry.register(Box::new(status_errors_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            sessions_active,
            messages_received_total,
            messages_sent_total,
            status_errors_total,
        })
    }

    pub fn empfangen_zaehlen(&self, art: &str) {
        self.messages_received_total.with_label_values(&[art]).inc();
    }

    pub fn gesendet_zaehlen(&self, art: &str) {
        self.messages_sent_total.with_label_values(&[art]).inc();
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
pub fn metrics_router(metriken: PlauderMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<PlauderMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
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
    fn metriken_erstellen_erfolgreich() {
        let metriken = PlauderMetrics::neu().unwrap();
        // Gauge und einfacher Counter erscheinen sofort, Vecs erst nach erstem Label
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn zwei_instanzen_kollidieren_nicht() {
        // Jede Instanz hat ihre eigene Registry
        assert!(PlauderMetrics::neu().is_ok());
        assert!(PlauderMetrics::neu().is_ok());
    }

    #[test]
    fn gauge_folgt_sitzungen() {
        let metriken = PlauderMetrics::neu().unwrap();
        metriken.sessions_active.inc();
        metriken.sessions_active.inc();
        metriken.sessions_active.dec();
        assert_eq!(metriken.sessions_active.get(), 1);
    }

    #[test]
    fn counter_pro_nachrichtentyp() {
        let metriken = PlauderMetrics::neu().unwrap();
        metriken.empfangen_zaehlen("chat_all");
        metriken.empfangen_zaehlen("chat_all");
        metriken.gesendet_zaehlen("login_request");

        assert_eq!(
            metriken
                .messages_received_total
                .with_label_values(&["chat_all"])
                .get(),
            2
        );
        assert_eq!(
            metriken
                .messages_sent_total
                .with_label_values(&["login_request"])
                .get(),
            1
        );
    }

    #[test]
    fn export_enthaelt_metriknamen() {
        let metriken = PlauderMetrics::neu().unwrap();
        metriken.status_errors_total.inc();
        metriken.empfangen_zaehlen("login");
        metriken.gesendet_zaehlen("login_response");

        let text = metriken.exportieren().unwrap();
        assert!(text.contains("plauder_sessions_active"));
        assert!(text.contains("plauder_status_errors_total 1"));
        assert!(text.contains("plauder_messages_received_total{type=\"login\"} 1"));
        assert!(text.contains("plauder_messages_sent_total{type=\"login_response\"} 1"));
    }
}
