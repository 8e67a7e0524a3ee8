//! Connection-Acceptor – Bindet den Socket, akzeptiert Verbindungen
//!
//! Der `ConnectionAcceptor` besitzt den Listen-Socket und einen begrenzten
//! Pool von Sitzungs-Slots. Jede angenommene Verbindung wird sofort als Task
//! gestartet, wartet aber auf einen freien Slot bevor ihr `SessionHandler`
//! laeuft. Verbindungen ueber dem Limit stehen also in der Warteschlange,
//! abgelehnt wird niemand.
//!
//! ## Stoppen
//! 1. Shutdown-Signal setzen: Accept-Loop endet und schliesst den Socket,
//!    wartende Verbindungen werden verworfen, Sitzungen verabschieden sich
//! 2. Bis zur Gnadenfrist auf alle Sitzungs-Tasks warten
//! 3. Verbliebene Tasks abbrechen (ihr `Drop` raeumt auf)
//! 4. Registry und Audit-Log leeren

use parking_lot::Mutex;
use plauder_protocol::ChatMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::error::{RelayError, RelayResult};
use crate::listener::GeteilterListener;
use crate::session::SessionHandler;
use crate::state::{RelayConfig, RelayState};

/// Laufender Betrieb (nur zwischen `starten` und `stoppen` vorhanden)
struct Betrieb {
    adresse: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<JoinSet<()>>,
}

/// Steuerflaeche des Relays: starten, stoppen, laeuft, broadcast
pub struct ConnectionAcceptor {
    state: Arc<RelayState>,
    betrieb: Mutex<Option<Betrieb>>,
}

impl ConnectionAcceptor {
    pub fn neu(config: RelayConfig, listener: GeteilterListener) -> Self {
        Self::mit_state(RelayState::neu(config, listener))
    }

    pub fn mit_state(state: Arc<RelayState>) -> Self {
        Self {
            state,
            betrieb: Mutex::new(None),
        }
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Bindet den Socket und startet die Accept-Loop
    ///
    /// Gibt die tatsaechlich gebundene Adresse zurueck (wichtig bei Port 0).
    pub async fn starten(&self) -> RelayResult<SocketAddr> {
        if self.laeuft() {
            return Err(RelayError::BereitsGestartet);
        }

        let listener = match TcpListener::bind(self.state.config.bind_adresse).await {
            Ok(l) => l,
            Err(e) => {
                self.state.status(
                    &format!(
                        "Server konnte {} nicht binden: {e}",
                        self.state.config.bind_adresse
                    ),
                    true,
                );
                return Err(e.into());
            }
        };
        let adresse = listener.local_addr()?;

        let mut betrieb = self.betrieb.lock();
        if betrieb.is_some() {
            // Paralleler Start hat gewonnen
            return Err(RelayError::BereitsGestartet);
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(Arc::clone(&self.state), listener, shutdown_rx));
        *betrieb = Some(Betrieb {
            adresse,
            shutdown_tx,
            accept_task,
        });
        drop(betrieb);

        tracing::info!(
            adresse = %adresse,
            max_sitzungen = self.state.config.max_sitzungen,
            "Chat-Relay gestartet"
        );
        self.state
            .status(&format!("Server laeuft auf {adresse} ..."), false);
        Ok(adresse)
    }

    /// Stoppt den Server und wartet bis alle Sitzungen beendet sind
    pub async fn stoppen(&self) -> RelayResult<()> {
        let betrieb = self.betrieb.lock().take().ok_or(RelayError::NichtGestartet)?;
        self.state.status("Server wird gestoppt ...", false);

        // Fehler nur wenn die Accept-Loop schon weg ist; dann ist auch nichts zu signalisieren
        let _ = betrieb.shutdown_tx.send(true);

        let mut sitzungen = match betrieb.accept_task.await {
            Ok(sitzungen) => sitzungen,
            Err(e) => {
                self.state
                    .status(&format!("Accept-Loop abgebrochen: {e}"), true);
                JoinSet::new()
            }
        };

        let gnadenfrist = self.state.config.gnadenfrist;
        let alle_beendet = tokio::time::timeout(gnadenfrist, async {
            while sitzungen.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !alle_beendet {
            tracing::warn!(
                verbleibend = sitzungen.len(),
                "Gnadenfrist abgelaufen – Sitzungen werden abgebrochen"
            );
            sitzungen.abort_all();
            while sitzungen.join_next().await.is_some() {}
        }

        let entfernt = self.state.registry.leeren();
        if entfernt > 0 {
            tracing::debug!(entfernt, "Verbliebene Registry-Eintraege entfernt");
        }
        self.state.audit.leeren();

        tracing::info!(adresse = %betrieb.adresse, "Chat-Relay gestoppt");
        self.state.status("Server gestoppt", false);
        Ok(())
    }

    pub fn laeuft(&self) -> bool {
        self.betrieb.lock().is_some()
    }

    /// Gebundene Adresse, solange der Server laeuft
    pub fn adresse(&self) -> Option<SocketAddr> {
        self.betrieb.lock().as_ref().map(|b| b.adresse)
    }

    /// Server-Rundnachricht an alle angemeldeten Clients
    ///
    /// # Fehler
    /// - `NichtGestartet` wenn der Server nicht laeuft
    /// - `SendFehler` wenn mindestens eine Zustellung fehlgeschlagen ist
    pub fn broadcast(&self, text: impl Into<String>) -> RelayResult<()> {
        if !self.laeuft() {
            self.state.status("Server ist noch nicht gestartet!", true);
            return Err(RelayError::NichtGestartet);
        }
        if self.state.router.route(ChatMessage::broadcast(text)) {
            Ok(())
        } else {
            Err(RelayError::SendFehler)
        }
    }
}

/// Accept-Loop: laeuft bis zum Shutdown-Signal, gibt dann die Sitzungs-Tasks zurueck
async fn accept_loop(
    state: Arc<RelayState>,
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinSet<()> {
    let slots = Arc::new(Semaphore::new(state.config.max_sitzungen.max(1)));
    let mut sitzungen = JoinSet::new();

    loop {
        tokio::select! {
            // Neue eingehende Verbindung
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        tracing::debug!(
                            peer = %peer_addr,
                            freie_slots = slots.available_permits(),
                            "Verbindung akzeptiert"
                        );
                        sitzungen.spawn(sitzung_ausfuehren(
                            Arc::clone(&state),
                            Arc::clone(&slots),
                            stream,
                            peer_addr,
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    }
                }
            }

            // Beendete Sitzungen einsammeln
            Some(ergebnis) = sitzungen.join_next(), if !sitzungen.is_empty() => {
                if let Err(e) = ergebnis {
                    if e.is_panic() {
                        tracing::error!(fehler = %e, "Sitzungs-Task ist abgestuerzt");
                        state.status("Sitzungs-Task ist abgestuerzt", true);
                    }
                }
            }

            // Shutdown-Signal
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Accept-Loop: Shutdown-Signal empfangen");
                    break;
                }
            }
        }
    }

    // Listen-Socket schliessen bevor auf die Sitzungen gewartet wird
    drop(listener);
    sitzungen
}

/// Wartet auf einen freien Slot und fuehrt dann die Sitzung aus
async fn sitzung_ausfuehren(
    state: Arc<RelayState>,
    slots: Arc<Semaphore>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let _slot = tokio::select! {
        slot = slots.acquire_owned() => match slot {
            Ok(slot) => slot,
            Err(_) => return,
        },
        _ = shutdown_rx.wait_for(|stoppt| *stoppt) => {
            tracing::debug!(peer = %peer_addr, "Wartende Verbindung beim Stoppen verworfen");
            return;
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
    }

    SessionHandler::neu(state, peer_addr)
        .verarbeiten(stream, shutdown_rx)
        .await;
}
