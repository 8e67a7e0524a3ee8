//! Client-Registry – Wer ist online?
//!
//! Zuordnung Anzeigename -> Send-Queue der Sitzung. Alle zusammengesetzten
//! Operationen (pruefen und einfuegen, Momentaufnahme) laufen unter genau
//! einem Mutex, damit Anmelden, Abmelden und das Aufzaehlen fuer Broadcasts
//! sich gegenseitig ausschliessen.

use parking_lot::Mutex;
use plauder_core::{NamensRegel, NamensVerstoss};
use plauder_protocol::{ChatMessage, LoginAblehnung};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::mpsc;

use crate::listener::GeteilterListener;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Warum eine Nachricht nicht eingereiht werden konnte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zustellfehler {
    /// Empfaenger liest zu langsam
    QueueVoll,
    /// Sitzung des Empfaengers ist bereits beendet
    Getrennt,
}

/// Handle auf die Send-Queue einer angemeldeten Sitzung
#[derive(Clone, Debug)]
pub struct ClientSender {
    name: String,
    tx: mpsc::Sender<ChatMessage>,
}

impl ClientSender {
    pub fn neu(name: impl Into<String>, tx: mpsc::Sender<ChatMessage>) -> Self {
        Self {
            name: name.into(),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reiht eine Nachricht nicht-blockierend ein
    ///
    /// Die Nachricht wird verworfen wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: ChatMessage) -> Result<(), Zustellfehler> {
        match self.tx.try_send(nachricht) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(name = %self.name, "Send-Queue voll – Nachricht verworfen");
                Err(Zustellfehler::QueueVoll)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(name = %self.name, "Send-Queue geschlossen (Client getrennt)");
                Err(Zustellfehler::Getrennt)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ClientRegistry
// ---------------------------------------------------------------------------

/// Thread-sichere Registry aller angemeldeten Clients
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, ClientSender>>,
    regel: NamensRegel,
    listener: GeteilterListener,
}

impl ClientRegistry {
    pub fn neu(regel: NamensRegel, listener: GeteilterListener) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            regel,
            listener,
        }
    }

    /// Registriert den Sender unter seinem Namen, falls gueltig und frei
    ///
    /// Pruefen und Einfuegen sind atomar: zwei gleichzeitige Versuche mit
    /// demselben Namen koennen nie beide erfolgreich sein.
    pub fn versuche_registrieren(&self, sender: ClientSender) -> Result<(), LoginAblehnung> {
        self.regel.pruefen(&sender.name).map_err(|verstoss| match verstoss {
            NamensVerstoss::Ungueltig => LoginAblehnung::NameInvalid,
            NamensVerstoss::Reserviert => LoginAblehnung::NameReserved,
        })?;

        let mut clients = self.clients.lock();
        if clients.contains_key(&sender.name) {
            return Err(LoginAblehnung::NameTaken);
        }
        tracing::debug!(name = %sender.name, "Client registriert");
        clients.insert(sender.name.clone(), sender);
        Ok(())
    }

    /// Entfernt einen Namen; gibt `true` zurueck wenn er vorhanden war
    pub fn entfernen(&self, name: &str) -> bool {
        let entfernt = self.clients.lock().remove(name).is_some();
        if entfernt {
            tracing::debug!(name, "Client aus Registry entfernt");
        } else {
            self.listener
                .on_status(&format!("Benutzer {name} ist nicht angemeldet"), false);
        }
        entfernt
    }

    /// Sucht die Send-Queue zu einem Namen
    pub fn nachschlagen(&self, name: &str) -> Option<ClientSender> {
        self.clients.lock().get(name).cloned()
    }

    /// Kopie aller angemeldeten Namen (kein Live-View)
    pub fn momentaufnahme(&self) -> BTreeSet<String> {
        self.clients.lock().keys().cloned().collect()
    }

    /// Kopie aller Sender fuer die Verteilung an alle
    pub fn empfaenger(&self) -> Vec<ClientSender> {
        self.clients.lock().values().cloned().collect()
    }

    pub fn ist_registriert(&self, name: &str) -> bool {
        self.clients.lock().contains_key(name)
    }

    pub fn anzahl(&self) -> usize {
        self.clients.lock().len()
    }

    /// Entfernt alle Eintraege, gibt die Anzahl der entfernten zurueck
    pub fn leeren(&self) -> usize {
        let mut clients = self.clients.lock();
        let anzahl = clients.len();
        clients.clear();
        anzahl
    }
}
