//! Chat-Nachrichten (TCP)
//!
//! Definiert alle Nachrichten die ueber die Verbindung zwischen Client und
//! Server ausgetauscht werden.
//!
//! ## Design
//! - Ein geschlossenes Tagged Enum fuer alle Nachrichtenarten, jede Stelle
//!   die Nachrichten verarbeitet matcht erschoepfend
//! - JSON-Serialisierung via serde
//! - Nachrichten sind nach dem Erzeugen unveraenderlich

use plauder_core::{ALLE_ZIEL, SERVER_QUELLE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Login-Ablehnung
// ---------------------------------------------------------------------------

/// Grund fuer eine abgelehnte Anmeldung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginAblehnung {
    /// Name wird bereits von einer anderen Sitzung verwendet
    NameTaken,
    /// Name passt nicht auf das Namensmuster
    NameInvalid,
    /// Name ist reserviert (z.B. "server")
    NameReserved,
    /// Sitzung ist bereits angemeldet
    AlreadyLoggedIn,
}

impl LoginAblehnung {
    /// Menschenlesbare Begruendung
    pub fn beschreibung(&self) -> &'static str {
        match self {
            LoginAblehnung::NameTaken => "Name ist bereits vergeben",
            LoginAblehnung::NameInvalid => "Name ist ungueltig",
            LoginAblehnung::NameReserved => "Name ist reserviert",
            LoginAblehnung::AlreadyLoggedIn => "Bereits angemeldet",
        }
    }
}

// ---------------------------------------------------------------------------
// Ziel
// ---------------------------------------------------------------------------

/// Ziel einer Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ziel<'a> {
    /// Alle angemeldeten Clients
    Alle,
    /// Der Server selbst (wird nicht weitergeleitet)
    Server,
    /// Genau ein benannter Client
    Name(&'a str),
}

impl<'a> Ziel<'a> {
    fn aus_name(name: &'a str) -> Self {
        if name == ALLE_ZIEL {
            Ziel::Alle
        } else {
            Ziel::Name(name)
        }
    }
}

// ---------------------------------------------------------------------------
// Nachrichtenart
// ---------------------------------------------------------------------------

/// Art einer Nachricht ohne Nutzdaten (fuer Logs und Metriken)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Login,
    Logout,
    ChatAll,
    ChatOne,
    ListNamesRequest,
    NameList,
    Broadcast,
    ClientJoined,
    ClientLeft,
    InvalidUser,
    LoginRequest,
    LoginResponse,
}

impl MessageKind {
    /// Stabiler Bezeichner (gleich dem Tag auf dem Draht)
    pub fn als_str(&self) -> &'static str {
        match self {
            MessageKind::Login => "login",
            MessageKind::Logout => "logout",
            MessageKind::ChatAll => "chat_all",
            MessageKind::ChatOne => "chat_one",
            MessageKind::ListNamesRequest => "list_names_request",
            MessageKind::NameList => "name_list",
            MessageKind::Broadcast => "broadcast",
            MessageKind::ClientJoined => "client_joined",
            MessageKind::ClientLeft => "client_left",
            MessageKind::InvalidUser => "invalid_user",
            MessageKind::LoginRequest => "login_request",
            MessageKind::LoginResponse => "login_response",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.als_str())
    }
}

// ---------------------------------------------------------------------------
// Haupt-Enum: ChatMessage
// ---------------------------------------------------------------------------

/// Alle moeglichen Chat-Nachrichten (typsicher via Tagged Enum)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatMessage {
    // Client -> Server
    Login { name: String },
    Logout { name: String },
    ChatAll { source: String, text: String },
    ChatOne { source: String, dest: String, text: String },
    ListNamesRequest { source: String },

    // Server -> Client
    NameList { dest: String, names: BTreeSet<String> },
    Broadcast { text: String },
    ClientJoined { name: String },
    ClientLeft { name: String },
    InvalidUser { dest: String, user: String },
    LoginRequest,
    LoginResponse {
        name: String,
        accepted: bool,
        reason: Option<LoginAblehnung>,
    },
}

impl ChatMessage {
    /// Erzeugt eine Anmeldung
    pub fn login(name: impl Into<String>) -> Self {
        ChatMessage::Login { name: name.into() }
    }

    /// Erzeugt eine Abmeldung
    pub fn logout(name: impl Into<String>) -> Self {
        ChatMessage::Logout { name: name.into() }
    }

    /// Erzeugt eine Nachricht an alle
    pub fn chat_all(source: impl Into<String>, text: impl Into<String>) -> Self {
        ChatMessage::ChatAll {
            source: source.into(),
            text: text.into(),
        }
    }

    /// Erzeugt eine Direktnachricht
    pub fn chat_one(
        source: impl Into<String>,
        dest: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        ChatMessage::ChatOne {
            source: source.into(),
            dest: dest.into(),
            text: text.into(),
        }
    }

    /// Erzeugt eine Server-Rundnachricht
    pub fn broadcast(text: impl Into<String>) -> Self {
        ChatMessage::Broadcast { text: text.into() }
    }

    /// Erzeugt eine positive Login-Antwort
    pub fn login_akzeptiert(name: impl Into<String>) -> Self {
        ChatMessage::LoginResponse {
            name: name.into(),
            accepted: true,
            reason: None,
        }
    }

    /// Erzeugt eine negative Login-Antwort
    pub fn login_abgelehnt(name: impl Into<String>, grund: LoginAblehnung) -> Self {
        ChatMessage::LoginResponse {
            name: name.into(),
            accepted: false,
            reason: Some(grund),
        }
    }

    /// Quelle der Nachricht (Client-Name oder "server")
    pub fn quelle(&self) -> &str {
        match self {
            ChatMessage::Login { name } | ChatMessage::Logout { name } => name,
            ChatMessage::ChatAll { source, .. }
            | ChatMessage::ChatOne { source, .. }
            | ChatMessage::ListNamesRequest { source } => source,
            ChatMessage::NameList { .. }
            | ChatMessage::Broadcast { .. }
            | ChatMessage::ClientJoined { .. }
            | ChatMessage::ClientLeft { .. }
            | ChatMessage::InvalidUser { .. }
            | ChatMessage::LoginRequest
            | ChatMessage::LoginResponse { .. } => SERVER_QUELLE,
        }
    }

    /// Ziel der Nachricht
    ///
    /// `LoginRequest` und `LoginResponse` richten sich an eine noch nicht
    /// angemeldete Verbindung und werden nie ueber die Registry zugestellt.
    pub fn ziel(&self) -> Ziel<'_> {
        match self {
            ChatMessage::Login { .. }
            | ChatMessage::Logout { .. }
            | ChatMessage::ListNamesRequest { .. } => Ziel::Server,
            ChatMessage::ChatAll { .. }
            | ChatMessage::Broadcast { .. }
            | ChatMessage::ClientJoined { .. }
            | ChatMessage::ClientLeft { .. } => Ziel::Alle,
            ChatMessage::ChatOne { dest, .. } => Ziel::aus_name(dest),
            ChatMessage::NameList { dest, .. } | ChatMessage::InvalidUser { dest, .. } => {
                Ziel::Name(dest)
            }
            ChatMessage::LoginRequest => Ziel::Server,
            ChatMessage::LoginResponse { name, .. } => Ziel::Name(name),
        }
    }

    /// Art der Nachricht
    pub fn art(&self) -> MessageKind {
        match self {
            ChatMessage::Login { .. } => MessageKind::Login,
            ChatMessage::Logout { .. } => MessageKind::Logout,
            ChatMessage::ChatAll { .. } => MessageKind::ChatAll,
            ChatMessage::ChatOne { .. } => MessageKind::ChatOne,
            ChatMessage::ListNamesRequest { .. } => MessageKind::ListNamesRequest,
            ChatMessage::NameList { .. } => MessageKind::NameList,
            ChatMessage::Broadcast { .. } => MessageKind::Broadcast,
            ChatMessage::ClientJoined { .. } => MessageKind::ClientJoined,
            ChatMessage::ClientLeft { .. } => MessageKind::ClientLeft,
            ChatMessage::InvalidUser { .. } => MessageKind::InvalidUser,
            ChatMessage::LoginRequest => MessageKind::LoginRequest,
            ChatMessage::LoginResponse { .. } => MessageKind::LoginResponse,
        }
    }

    /// Gibt true zurueck wenn ein Client diese Art legitim senden darf
    pub fn vom_client(&self) -> bool {
        matches!(
            self,
            ChatMessage::Login { .. }
                | ChatMessage::Logout { .. }
                | ChatMessage::ChatAll { .. }
                | ChatMessage::ChatOne { .. }
                | ChatMessage::ListNamesRequest { .. }
        )
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatMessage::Login { name } => write!(f, "{name} meldet sich an"),
            ChatMessage::Logout { name } => write!(f, "{name} meldet sich ab"),
            ChatMessage::ChatAll { source, text } => write!(f, "{source} an alle: {text}"),
            ChatMessage::ChatOne { source, dest, text } => write!(f, "{source} an {dest}: {text}"),
            ChatMessage::ListNamesRequest { source } => write!(f, "{source} fragt die Namensliste an"),
            ChatMessage::NameList { names, .. } => {
                let liste: Vec<&str> = names.iter().map(String::as_str).collect();
                write!(f, "Alle Clients: {}", liste.join(" "))
            }
            ChatMessage::Broadcast { text } => write!(f, "<{text}>"),
            ChatMessage::ClientJoined { name } => write!(f, "{name} ist beigetreten"),
            ChatMessage::ClientLeft { name } => write!(f, "{name} hat den Chat verlassen"),
            ChatMessage::InvalidUser { user, .. } => write!(f, "Benutzer {user} existiert nicht"),
            ChatMessage::LoginRequest => f.write_str("Bitte anmelden"),
            ChatMessage::LoginResponse {
                name,
                accepted: true,
                ..
            } => write!(f, "Angemeldet als {name}"),
            ChatMessage::LoginResponse { name, reason, .. } => {
                let grund = reason.map_or("unbekannter Grund", |r| r.beschreibung());
                write!(f, "Anmeldung als {name} abgelehnt: {grund}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
