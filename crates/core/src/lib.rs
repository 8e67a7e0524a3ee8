//! plauder-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die von Protokoll, Relay und
//! Server gemeinsam genutzt werden: Sitzungs-IDs, die reservierten
//! Sentinel-Namen und die Regel fuer gueltige Anzeigenamen.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{PlauderError, Result};
pub use types::{
    NamensRegel, NamensVerstoss, SessionId, ALLE_ZIEL, SERVER_QUELLE, STANDARD_NAMENSMUSTER,
};
