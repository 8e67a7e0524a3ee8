//! Fehlertypen fuer Plauder
//!
//! Zentraler Fehler-Enum fuer Konfigurations- und Validierungsfehler die
//! bereits beim Aufbau des Servers auftreten koennen. Laufzeitfehler einer
//! Verbindung definiert das Relay-Crate selbst.

use thiserror::Error;

/// Globaler Result-Alias fuer Plauder
pub type Result<T> = std::result::Result<T, PlauderError>;

/// Fehler beim Aufbau der gemeinsamen Bausteine
#[derive(Debug, Error)]
pub enum PlauderError {
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Ungueltiges Namensmuster '{muster}': {grund}")]
    Namensmuster { muster: String, grund: String },
}

impl PlauderError {
    /// Erstellt einen Konfigurationsfehler aus einer beliebigen Nachricht
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = PlauderError::konfiguration("max_sitzungen darf nicht 0 sein");
        assert_eq!(
            e.to_string(),
            "Konfigurationsfehler: max_sitzungen darf nicht 0 sein"
        );
    }

    #[test]
    fn namensmuster_fehler_enthaelt_muster() {
        let e = PlauderError::Namensmuster {
            muster: "(".into(),
            grund: "unclosed group".into(),
        };
        assert!(e.to_string().contains("'('"));
    }
}
