//! Listener-Schnittstelle fuer Beobachter ausserhalb des Relays
//!
//! Der Kern ruft den Listener synchron auf: bei jeder empfangenen Nachricht,
//! bei jeder gesendeten Nachricht und fuer Statusmeldungen. Implementierungen
//! muessen daher schnell sein und duerfen nicht blockieren.

use plauder_protocol::ChatMessage;
use std::sync::Arc;

/// Beobachter fuer Nachrichtenfluss und Statusmeldungen
pub trait ChatListener: Send + Sync {
    /// Eine Nachricht wurde von einem Client empfangen
    fn on_message_received(&self, nachricht: &ChatMessage);

    /// Eine Nachricht wurde zugestellt oder zur Zustellung eingereiht
    fn on_message_sent(&self, nachricht: &ChatMessage);

    /// Statusmeldung; `ist_fehler` markiert Fehlerzustaende
    fn on_status(&self, text: &str, ist_fehler: bool);
}

/// Geteilter Listener (Arc + dyn)
pub type GeteilterListener = Arc<dyn ChatListener>;

/// Listener der alles an `tracing` weitergibt
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl ChatListener for TracingListener {
    fn on_message_received(&self, nachricht: &ChatMessage) {
        tracing::debug!(art = %nachricht.art(), quelle = nachricht.quelle(), "Empfangen: {nachricht}");
    }

    fn on_message_sent(&self, nachricht: &ChatMessage) {
        tracing::debug!(art = %nachricht.art(), "Gesendet: {nachricht}");
    }

    fn on_status(&self, text: &str, ist_fehler: bool) {
        if ist_fehler {
            tracing::warn!("{text}");
        } else {
            tracing::info!("{text}");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_hilfen {
    use super::*;
    use parking_lot::Mutex;

    /// Zeichnet alle Aufrufe fuer Assertions auf
    #[derive(Default)]
    pub(crate) struct AufzeichnenderListener {
        pub empfangen: Mutex<Vec<ChatMessage>>,
        pub gesendet: Mutex<Vec<ChatMessage>>,
        pub status: Mutex<Vec<(String, bool)>>,
    }

    impl AufzeichnenderListener {
        pub fn neu() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn fehler_anzahl(&self) -> usize {
            self.status.lock().iter().filter(|(_, f)| *f).count()
        }
    }

    impl ChatListener for AufzeichnenderListener {
        fn on_message_received(&self, nachricht: &ChatMessage) {
            self.empfangen.lock().push(nachricht.clone());
        }

        fn on_message_sent(&self, nachricht: &ChatMessage) {
            self.gesendet.lock().push(nachricht.clone());
        }

        fn on_status(&self, text: &str, ist_fehler: bool) {
            self.status.lock().push((text.to_string(), ist_fehler));
        }
    }
}
