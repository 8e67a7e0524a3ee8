//! Rueckmeldungen des Clients an die Anwendung

use plauder_protocol::ChatMessage;
use std::sync::Arc;

/// Wird aus dem Verbindungs-Task aufgerufen und darf nicht blockieren
pub trait ClientListener: Send + Sync {
    /// Nachricht vom Server (nur Server-Arten, siehe `ChatMessage::vom_client`)
    fn on_message_received(&self, nachricht: &ChatMessage);

    /// Nachricht wurde vollstaendig auf den Socket geschrieben
    fn on_message_sent(&self, _nachricht: &ChatMessage) {}

    fn on_status(&self, text: &str, ist_fehler: bool);
}

pub type GeteilterClientListener = Arc<dyn ClientListener>;
