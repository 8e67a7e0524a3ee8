//! Listener des Servers: Metriken zaehlen, Status ins Log

use plauder_observability::PlauderMetrics;
use plauder_protocol::ChatMessage;
use plauder_relay::{ChatListener, TracingListener};

/// Fuettert die Prometheus-Metriken und leitet alles an `tracing` weiter
pub struct MetrikListener {
    metriken: PlauderMetrics,
    log: TracingListener,
}

impl MetrikListener {
    pub fn neu(metriken: PlauderMetrics) -> Self {
        Self {
            metriken,
            log: TracingListener,
        }
    }
}

impl ChatListener for MetrikListener {
    fn on_message_received(&self, nachricht: &ChatMessage) {
        self.metriken.empfangen_zaehlen(nachricht.art().als_str());
        self.log.on_message_received(nachricht);
    }

    fn on_message_sent(&self, nachricht: &ChatMessage) {
        self.metriken.gesendet_zaehlen(nachricht.art().als_str());
        // Jede angekuendigte Sitzung meldet genau ein Joined und ein Left
        match nachricht {
            ChatMessage::ClientJoined { .. } => self.metriken.sessions_active.inc(),
            ChatMessage::ClientLeft { .. } => self.metriken.sessions_active.dec(),
            _ => {}
        }
        self.log.on_message_sent(nachricht);
    }

    fn on_status(&self, text: &str, ist_fehler: bool) {
        if ist_fehler {
            self.metriken.status_errors_total.inc();
        }
        self.log.on_status(text, ist_fehler);
    }
}
