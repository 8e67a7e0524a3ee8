//! Health-Check-Endpunkt fuer Plauder
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime, Relay-Zustand und Sitzungsanzahl

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use prometheus::IntGauge;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub relay_running: bool,
    pub active_sessions: i64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub gestartet_um: DateTime<Utc>,
    pub relay_aktiv: Arc<AtomicBool>,
    pub aktive_sitzungen: IntGauge,
}

impl HealthState {
    /// `aktive_sitzungen` ist typischerweise `PlauderMetrics::sessions_active`
    pub fn neu(aktive_sitzungen: IntGauge) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            gestartet_um: Utc::now(),
            relay_aktiv: Arc::new(AtomicBool::new(false)),
            aktive_sitzungen,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn relay_laeuft(&self) -> bool {
        self.relay_aktiv.load(Ordering::Relaxed)
    }

    pub fn relay_status_setzen(&self, laeuft: bool) {
        self.relay_aktiv.store(laeuft, Ordering::Relaxed);
    }

    fn antwort(&self) -> HealthResponse {
        let relay_running = self.relay_laeuft();
        HealthResponse {
            status: if relay_running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: self.gestartet_um,
            uptime_seconds: self.uptime_seconds(),
            relay_running,
            active_sessions: self.aktive_sitzungen.get(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – 503 solange das Relay nicht laeuft
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();
    let http_status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}
