//! Gemeinsame Typen fuer Plauder
//!
//! - `SessionId`: Newtype um Verbindungen in Logs eindeutig zuzuordnen
//! - Sentinel-Namen fuer Server-Quelle und "an alle"-Ziel
//! - `NamensRegel`: Validierung der Anzeigenamen (Muster + reservierte Woerter)

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PlauderError, Result};

/// Quelle aller vom Server erzeugten Nachrichten
pub const SERVER_QUELLE: &str = "server";

/// Ziel-Sentinel fuer "an alle angemeldeten Clients"
pub const ALLE_ZIEL: &str = "all";

/// Standard-Namensmuster: ein Wort aus ASCII-Buchstaben, Ziffern und Unterstrichen
pub const STANDARD_NAMENSMUSTER: &str = r"\w+";

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Eindeutige ID einer Verbindung (nur fuer Diagnose, nicht auf dem Draht)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// NamensRegel
// ---------------------------------------------------------------------------

/// Grund warum ein Name die Regel verletzt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamensVerstoss {
    /// Name passt nicht auf das Muster
    Ungueltig,
    /// Name ist ein reserviertes Wort
    Reserviert,
}

/// Regel fuer gueltige Anzeigenamen
///
/// Das Muster muss den gesamten Namen abdecken; Gross-/Kleinschreibung
/// wird unterschieden. Reservierte Namen werden exakt verglichen.
///
/// Zeichenklassen wie `\w` und `\d` gelten nur fuer ASCII: `\w` ist
/// `[a-zA-Z0-9_]`. Muster die ungueltiges UTF-8 treffen koennten (etwa `.`)
/// werden deshalb abgelehnt.
#[derive(Debug, Clone)]
pub struct NamensRegel {
    muster: Regex,
    reserviert: Vec<String>,
}

impl NamensRegel {
    /// Erstellt eine Regel aus einem Muster und einer Liste reservierter Namen
    pub fn neu<I, S>(muster: &str, reserviert: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let verankert = format!("^(?:{muster})$");
        let muster_regex = RegexBuilder::new(&verankert)
            .unicode(false)
            .build()
            .map_err(|e| PlauderError::Namensmuster {
                muster: muster.to_string(),
                grund: e.to_string(),
            })?;
        Ok(Self {
            muster: muster_regex,
            reserviert: reserviert.into_iter().map(Into::into).collect(),
        })
    }

    /// Prueft einen Namen gegen Muster und reservierte Woerter
    ///
    /// Prueft nicht ob der Name bereits vergeben ist, das ist Sache der Registry.
    pub fn pruefen(&self, name: &str) -> std::result::Result<(), NamensVerstoss> {
        if self.reserviert.iter().any(|r| r == name) {
            return Err(NamensVerstoss::Reserviert);
        }
        if !self.muster.is_match(name) {
            return Err(NamensVerstoss::Ungueltig);
        }
        Ok(())
    }

    /// Gibt true zurueck wenn der Name gueltig und nicht reserviert ist
    pub fn ist_gueltig(&self, name: &str) -> bool {
        self.pruefen(name).is_ok()
    }
}

impl Default for NamensRegel {
    fn default() -> Self {
        Self::neu(STANDARD_NAMENSMUSTER, [SERVER_QUELLE])
            .expect("Standard-Namensmuster muss kompilieren")
    }
}
