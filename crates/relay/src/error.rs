//! Fehlertypen fuer das Relay

use thiserror::Error;

/// Fehlertyp fuer Relay und Sitzungen
///
/// Innerhalb einer Sitzung ist jeder dieser Fehler fatal fuer genau diese
/// Sitzung; abgelehnte Logins und unbekannte Ziele sind keine Fehler, sondern
/// werden als normale Antwortnachricht zurueckgemeldet.
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO-Fehler (TCP, Socket, Frame-Dekodierung)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Protokollfehler (Nachricht im falschen Zustand)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Zustellung an mindestens einen Empfaenger fehlgeschlagen
    #[error("Senden fehlgeschlagen")]
    SendFehler,

    /// Schreiben auf den Socket hat zu lange gedauert
    #[error("Timeout beim Schreiben")]
    Timeout,

    /// Server ist nicht gestartet
    #[error("Server ist nicht gestartet")]
    NichtGestartet,

    /// Server laeuft bereits
    #[error("Server laeuft bereits")]
    BereitsGestartet,

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl RelayError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }
}

/// Result-Typ fuer das Relay
pub type RelayResult<T> = Result<T, RelayError>;
