//! Gemeinsamer Relay-Zustand
//!
//! Haelt Konfiguration und alle geteilten Bausteine als Arc-Referenzen, die
//! sicher zwischen tokio-Tasks geteilt werden koennen. Sitzungen bekommen
//! nur diesen Zustand, nie Referenzen aufeinander.

use plauder_core::NamensRegel;
use plauder_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditLog;
use crate::listener::GeteilterListener;
use crate::registry::ClientRegistry;
use crate::router::MessageRouter;

/// Unveraenderliche Laufzeit-Konfiguration des Relays
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Adresse des Listen-Sockets (Port 0 = beliebiger freier Port)
    pub bind_adresse: SocketAddr,
    /// Groesse des Worker-Pools (gleichzeitig bediente Sitzungen)
    pub max_sitzungen: usize,
    /// Regel fuer gueltige Anzeigenamen
    pub namens_regel: NamensRegel,
    /// Leerlaufzeit nach der eine unangemeldete Sitzung erneut zum Login aufgefordert wird
    pub login_aufforderung: Duration,
    /// Obergrenze fuer jeden einzelnen Schreibvorgang auf einen Socket
    pub schreib_timeout: Duration,
    /// Kapazitaet der Send-Queue pro Sitzung
    pub sende_queue_groesse: usize,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_bytes: usize,
    /// Wartezeit beim Stoppen bevor verbliebene Sitzungen abgebrochen werden
    pub gnadenfrist: Duration,
    /// Kapazitaet des Audit-Logs
    pub audit_kapazitaet: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_adresse: SocketAddr::from(([0, 0, 0, 0], 56101)),
            max_sitzungen: 64,
            namens_regel: NamensRegel::default(),
            login_aufforderung: Duration::from_secs(30),
            schreib_timeout: Duration::from_millis(5000),
            sende_queue_groesse: 64,
            max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
            gnadenfrist: Duration::from_millis(1000),
            audit_kapazitaet: 1024,
        }
    }
}

/// Gemeinsamer Zustand (thread-safe, Arc-geteilt)
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub registry: Arc<ClientRegistry>,
    pub audit: Arc<AuditLog>,
    pub router: MessageRouter,
    pub listener: GeteilterListener,
}

impl RelayState {
    pub fn neu(config: RelayConfig, listener: GeteilterListener) -> Arc<Self> {
        let registry = Arc::new(ClientRegistry::neu(
            config.namens_regel.clone(),
            Arc::clone(&listener),
        ));
        let audit = Arc::new(AuditLog::neu(config.audit_kapazitaet));
        let router = MessageRouter::neu(
            Arc::clone(&registry),
            Arc::clone(&audit),
            Arc::clone(&listener),
        );
        Arc::new(Self {
            config: Arc::new(config),
            registry,
            audit,
            router,
            listener,
        })
    }

    /// Leitet eine Statusmeldung an den Listener weiter
    pub fn status(&self, text: &str, ist_fehler: bool) {
        self.listener.on_status(text, ist_fehler);
    }
}
