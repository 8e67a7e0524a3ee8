//! Fehlertypen des Clients

use plauder_core::PlauderError;
use plauder_protocol::LoginAblehnung;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Regel(#[from] PlauderError),

    /// Name passt nicht auf das Namensmuster, wurde nicht gesendet
    #[error("Ungueltiger Name '{0}'")]
    UngueltigerName(String),

    /// Server hat die Anmeldung abgelehnt, ein neuer Versuch ist erlaubt
    #[error("Anmeldung als '{name}' abgelehnt: {}", .grund.beschreibung())]
    Abgelehnt { name: String, grund: LoginAblehnung },

    #[error("Nicht angemeldet")]
    NichtAngemeldet,

    #[error("Verbindung zum Server getrennt")]
    Getrennt,
}

pub type ClientResult<T> = Result<T, ClientError>;
