//! Audit-Log – Protokoll aller beobachteten Nachrichten
//!
//! Ringpuffer mit fester Kapazitaet: wenn voll, faellt der aelteste Eintrag
//! heraus. Die Reihenfolge entspricht der Reihenfolge der Aufrufe.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use plauder_protocol::ChatMessage;
use std::collections::VecDeque;

/// Richtung einer Nachricht aus Sicht des Servers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Richtung {
    Empfangen,
    Gesendet,
}

/// Ein einzelner Eintrag im Audit-Log
#[derive(Debug, Clone)]
pub struct AuditEintrag {
    pub zeitpunkt: DateTime<Utc>,
    pub richtung: Richtung,
    pub nachricht: ChatMessage,
}

/// Begrenztes, geordnetes Nachrichtenprotokoll
#[derive(Debug)]
pub struct AuditLog {
    eintraege: Mutex<VecDeque<AuditEintrag>>,
    kapazitaet: usize,
}

impl AuditLog {
    pub fn neu(kapazitaet: usize) -> Self {
        Self {
            eintraege: Mutex::new(VecDeque::with_capacity(kapazitaet.min(4096))),
            kapazitaet,
        }
    }

    /// Haengt eine Nachricht an; verdraengt bei voller Kapazitaet den aeltesten Eintrag
    pub fn anhaengen(&self, richtung: Richtung, nachricht: &ChatMessage) {
        if self.kapazitaet == 0 {
            return;
        }
        let eintrag = AuditEintrag {
            zeitpunkt: Utc::now(),
            richtung,
            nachricht: nachricht.clone(),
        };
        let mut eintraege = self.eintraege.lock();
        if eintraege.len() >= self.kapazitaet {
            eintraege.pop_front();
        }
        eintraege.push_back(eintrag);
    }

    /// Kopie aller Eintraege, aelteste zuerst
    pub fn eintraege(&self) -> Vec<AuditEintrag> {
        self.eintraege.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.eintraege.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.eintraege.lock().is_empty()
    }

    pub fn kapazitaet(&self) -> usize {
        self.kapazitaet
    }

    /// Leert das Log (beim Stoppen des Servers)
    pub fn leeren(&self) {
        self.eintraege.lock().clear();
    }
}
