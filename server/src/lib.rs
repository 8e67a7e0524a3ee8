//! plauder-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Relay und Observability und stellt den
//! oeffentlichen Einstiegspunkt fuer Tests bereit.

pub mod config;
pub mod listener;

use anyhow::Result;
use config::ServerConfig;
use listener::MetrikListener;
use plauder_observability::{observability_server_starten, HealthState, PlauderMetrics};
use plauder_relay::ConnectionAcceptor;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Haelt den Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

/// Ein gestarteter Server bis zum Herunterfahren
pub struct LaufenderServer {
    acceptor: ConnectionAcceptor,
    metriken: PlauderMetrics,
    health: HealthState,
    adresse: SocketAddr,
    observability: Option<JoinHandle<()>>,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis zum Shutdown-Signal
    pub async fn starten(self) -> Result<()> {
        let laufend = self.hochfahren().await?;

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        laufend.herunterfahren().await
    }

    /// Startet Relay und (falls aktiviert) den Observability-Server
    ///
    /// Reihenfolge:
    /// 1. Metriken anlegen
    /// 2. Relay-Konfiguration bauen und Listen-Socket binden
    /// 3. Observability-Server (`/metrics`, `/health`) starten
    pub async fn hochfahren(self) -> Result<LaufenderServer> {
        let metriken = PlauderMetrics::neu()?;
        let relay_config = self.config.relay_config()?;

        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %relay_config.bind_adresse,
            max_sitzungen = relay_config.max_sitzungen,
            "Server startet"
        );

        let acceptor = ConnectionAcceptor::neu(
            relay_config,
            Arc::new(MetrikListener::neu(metriken.clone())),
        );
        let adresse = acceptor.starten().await?;

        let health = HealthState::neu(metriken.sessions_active.clone());
        health.relay_status_setzen(true);

        let observability = if self.config.observability.aktiviert {
            let bind_addr = self.config.observability_bind_adresse()?;
            let metriken = metriken.clone();
            let health = health.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(bind_addr, metriken, health).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            }))
        } else {
            None
        };

        Ok(LaufenderServer {
            acceptor,
            metriken,
            health,
            adresse,
            observability,
        })
    }
}

impl LaufenderServer {
    /// Tatsaechlich gebundene Adresse des Relays
    pub fn adresse(&self) -> SocketAddr {
        self.adresse
    }

    pub fn metriken(&self) -> &PlauderMetrics {
        &self.metriken
    }

    pub fn acceptor(&self) -> &ConnectionAcceptor {
        &self.acceptor
    }

    /// Stoppt das Relay und danach den Observability-Server
    pub async fn herunterfahren(self) -> Result<()> {
        self.health.relay_status_setzen(false);
        self.acceptor.stoppen().await?;

        if let Some(task) = self.observability {
            task.abort();
        }
        tracing::info!("Server beendet");
        Ok(())
    }
}
