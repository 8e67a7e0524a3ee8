//! Message-Router – Wer bekommt welche Nachricht?
//!
//! ## Regeln
//! - Ziel "alle": jede Send-Queue aus der Momentaufnahme der Registry, ausser
//!   dem Absender eines Chats bzw. dem Client um den es bei Join/Leave geht
//! - Ziel Name: genau diese Queue; ist der Name unbekannt, bekommt der
//!   Absender stattdessen `InvalidUser`
//! - Ziel Server: keine Zustellung
//!
//! Jede geroutete Nachricht landet im Audit-Log und beim Listener. Die
//! Zustellung ist nicht-blockierend (`try_send`); eine volle oder
//! geschlossene Queue betrifft nur diesen einen Empfaenger.

use plauder_protocol::{ChatMessage, Ziel};
use std::sync::Arc;

use crate::audit::{AuditLog, Richtung};
use crate::listener::GeteilterListener;
use crate::registry::{ClientRegistry, Zustellfehler};

/// Verteilt Nachrichten auf die Send-Queues der Registry
#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<ClientRegistry>,
    audit: Arc<AuditLog>,
    listener: GeteilterListener,
}

impl MessageRouter {
    pub fn neu(
        registry: Arc<ClientRegistry>,
        audit: Arc<AuditLog>,
        listener: GeteilterListener,
    ) -> Self {
        Self {
            registry,
            audit,
            listener,
        }
    }

    /// Routet eine Nachricht
    ///
    /// Gibt `false` zurueck wenn mindestens eine Zustellung fehlgeschlagen
    /// ist. Ein unbekanntes Ziel ist kein Fehlschlag.
    pub fn route(&self, nachricht: ChatMessage) -> bool {
        self.gesendet(&nachricht);

        match nachricht.ziel() {
            Ziel::Alle => self.an_alle(&nachricht),
            Ziel::Name(ziel) => match self.registry.nachschlagen(ziel) {
                Some(sender) => match sender.senden(nachricht.clone()) {
                    Ok(()) => true,
                    Err(fehler) => {
                        self.zustellung_fehlgeschlagen(sender.name(), &nachricht, fehler);
                        false
                    }
                },
                None => {
                    self.unbekanntes_ziel(&nachricht, ziel);
                    true
                }
            },
            Ziel::Server => true,
        }
    }

    /// Vermerkt eine vom Client empfangene Nachricht
    pub fn empfangen(&self, nachricht: &ChatMessage) {
        self.audit.anhaengen(Richtung::Empfangen, nachricht);
        self.listener.on_message_received(nachricht);
    }

    /// Vermerkt eine Nachricht die an der Registry vorbei direkt auf eine
    /// Verbindung geschrieben wurde (Login-Aufforderung und -Antwort)
    pub fn gesendet(&self, nachricht: &ChatMessage) {
        self.audit.anhaengen(Richtung::Gesendet, nachricht);
        self.listener.on_message_sent(nachricht);
    }

    fn an_alle(&self, nachricht: &ChatMessage) -> bool {
        let ausgenommen = match nachricht {
            ChatMessage::ChatAll { source, .. } | ChatMessage::ChatOne { source, .. } => {
                Some(source.as_str())
            }
            ChatMessage::ClientJoined { name } | ChatMessage::ClientLeft { name } => {
                Some(name.as_str())
            }
            _ => None,
        };

        let mut alle_ok = true;
        for sender in self.registry.empfaenger() {
            if Some(sender.name()) == ausgenommen {
                continue;
            }
            if let Err(fehler) = sender.senden(nachricht.clone()) {
                self.zustellung_fehlgeschlagen(sender.name(), nachricht, fehler);
                alle_ok = false;
            }
        }
        alle_ok
    }

    fn unbekanntes_ziel(&self, nachricht: &ChatMessage, ziel: &str) {
        let quelle = nachricht.quelle();
        let antwort = ChatMessage::InvalidUser {
            dest: quelle.to_string(),
            user: ziel.to_string(),
        };
        tracing::debug!(quelle, ziel, "Unbekanntes Ziel – InvalidUser an Absender");

        match self.registry.nachschlagen(quelle) {
            Some(absender) => {
                self.gesendet(&antwort);
                if let Err(fehler) = absender.senden(antwort.clone()) {
                    self.zustellung_fehlgeschlagen(quelle, &antwort, fehler);
                }
            }
            None => self.listener.on_status(
                &format!("Benutzer {ziel} existiert nicht, Absender {quelle} ebenfalls nicht"),
                true,
            ),
        }
    }

    /// Eine volle Queue ist ein Fehler; eine geschlossene gehoert zu einer
    /// Sitzung die gerade selbst aufraeumt und wird nur protokolliert.
    fn zustellung_fehlgeschlagen(&self, name: &str, nachricht: &ChatMessage, fehler: Zustellfehler) {
        match fehler {
            Zustellfehler::QueueVoll => self.listener.on_status(
                &format!("Zustellung an {name} fehlgeschlagen ({})", nachricht.art()),
                true,
            ),
            Zustellfehler::Getrennt => {
                tracing::debug!(name, art = %nachricht.art(), "Empfaenger bereits getrennt");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::test_hilfen::AufzeichnenderListener;
    use crate::registry::ClientSender;
    use plauder_core::NamensRegel;
    use tokio::sync::mpsc;

    struct Aufbau {
        router: MessageRouter,
        registry: Arc<ClientRegistry>,
        audit: Arc<AuditLog>,
        listener: Arc<AufzeichnenderListener>,
    }

    fn aufbau() -> Aufbau {
        let listener = AufzeichnenderListener::neu();
        let registry = Arc::new(ClientRegistry::neu(
            NamensRegel::default(),
            listener.clone(),
        ));
        let audit = Arc::new(AuditLog::neu(64));
        let router = MessageRouter::neu(registry.clone(), audit.clone(), listener.clone());
        Aufbau {
            router,
            registry,
            audit,
            listener,
        }
    }

    fn anmelden(registry: &ClientRegistry, name: &str, groesse: usize) -> mpsc::Receiver<ChatMessage> {
        let (tx, rx) = mpsc::channel(groesse);
        registry
            .versuche_registrieren(ClientSender::neu(name, tx))
            .unwrap();
        rx
    }

    fn leeren(rx: &mut mpsc::Receiver<ChatMessage>) -> Vec<ChatMessage> {
        let mut nachrichten = Vec::new();
        while let Ok(n) = rx.try_recv() {
            nachrichten.push(n);
        }
        nachrichten
    }

    #[test]
    fn chat_all_erreicht_alle_ausser_absender() {
        let a = aufbau();
        let mut alice = anmelden(&a.registry, "alice", 8);
        let mut bob = anmelden(&a.registry, "bob", 8);
        let mut carol = anmelden(&a.registry, "carol", 8);

        assert!(a.router.route(ChatMessage::chat_all("alice", "hi")));

        assert!(leeren(&mut alice).is_empty());
        assert_eq!(leeren(&mut bob), vec![ChatMessage::chat_all("alice", "hi")]);
        assert_eq!(leeren(&mut carol), vec![ChatMessage::chat_all("alice", "hi")]);
    }

    #[test]
    fn server_broadcast_erreicht_alle() {
        let a = aufbau();
        let mut alice = anmelden(&a.registry, "alice", 8);
        let mut bob = anmelden(&a.registry, "bob", 8);

        assert!(a.router.route(ChatMessage::broadcast("Wartung")));
        assert_eq!(leeren(&mut alice).len(), 1);
        assert_eq!(leeren(&mut bob).len(), 1);
    }

    #[test]
    fn beitritt_wird_dem_neuen_client_nicht_gemeldet() {
        let a = aufbau();
        let mut alice = anmelden(&a.registry, "alice", 8);
        let mut bob = anmelden(&a.registry, "bob", 8);

        a.router.route(ChatMessage::ClientJoined { name: "bob".into() });
        assert_eq!(
            leeren(&mut alice),
            vec![ChatMessage::ClientJoined { name: "bob".into() }]
        );
        assert!(leeren(&mut bob).is_empty());
    }

    #[test]
    fn direktnachricht_nur_an_ziel() {
        let a = aufbau();
        let mut alice = anmelden(&a.registry, "alice", 8);
        let mut bob = anmelden(&a.registry, "bob", 8);
        let mut carol = anmelden(&a.registry, "carol", 8);

        assert!(a.router.route(ChatMessage::chat_one("alice", "bob", "psst")));
        assert!(leeren(&mut alice).is_empty());
        assert_eq!(leeren(&mut bob).len(), 1);
        assert!(leeren(&mut carol).is_empty());
    }

    #[test]
    fn unbekanntes_ziel_liefert_invalid_user_an_absender() {
        let a = aufbau();
        let mut alice = anmelden(&a.registry, "alice", 8);
        let mut bob = anmelden(&a.registry, "bob", 8);

        assert!(a.router.route(ChatMessage::chat_one("alice", "carol", "hi")));
        assert_eq!(
            leeren(&mut alice),
            vec![ChatMessage::InvalidUser {
                dest: "alice".into(),
                user: "carol".into()
            }]
        );
        assert!(leeren(&mut bob).is_empty());
        assert_eq!(a.listener.fehler_anzahl(), 0);
    }

    #[test]
    fn volle_queue_meldet_art_der_invalid_user_antwort() {
        let a = aufbau();
        let mut alice = anmelden(&a.registry, "alice", 1);
        a.router.route(ChatMessage::broadcast("fuellt die Queue"));

        a.router.route(ChatMessage::chat_one("alice", "carol", "hi"));

        let status = a.listener.status.lock().clone();
        assert_eq!(
            status.last(),
            Some(&("Zustellung an alice fehlgeschlagen (invalid_user)".to_string(), true))
        );
        assert_eq!(leeren(&mut alice), vec![ChatMessage::broadcast("fuellt die Queue")]);
    }

    #[test]
    fn chat_one_an_all_wird_wie_chat_all_verteilt() {
        let a = aufbau();
        let mut alice = anmelden(&a.registry, "alice", 8);
        let mut bob = anmelden(&a.registry, "bob", 8);

        a.router.route(ChatMessage::chat_one("alice", "all", "hi"));
        assert!(leeren(&mut alice).is_empty());
        assert_eq!(leeren(&mut bob).len(), 1);
    }

    #[test]
    fn fehlschlag_bei_einem_empfaenger_bricht_nicht_ab() {
        let a = aufbau();
        let mut voll = anmelden(&a.registry, "voll", 1);
        let mut bob = anmelden(&a.registry, "bob", 8);

        assert!(a.router.route(ChatMessage::broadcast("1")));
        assert!(!a.router.route(ChatMessage::broadcast("2")));

        assert_eq!(leeren(&mut voll).len(), 1);
        assert_eq!(leeren(&mut bob).len(), 2);
        assert_eq!(a.listener.fehler_anzahl(), 1);
    }

    #[test]
    fn geschlossene_queue_ist_fehlschlag() {
        let a = aufbau();
        let rx = anmelden(&a.registry, "weg", 4);
        drop(rx);
        assert!(!a.router.route(ChatMessage::chat_one("server", "weg", "x")));
    }

    #[test]
    fn server_ziel_wird_nicht_zugestellt() {
        let a = aufbau();
        let mut alice = anmelden(&a.registry, "alice", 8);
        assert!(a.router.route(ChatMessage::logout("alice")));
        assert!(leeren(&mut alice).is_empty());
    }

    #[test]
    fn audit_und_listener_sehen_jede_nachricht() {
        let a = aufbau();
        let _alice = anmelden(&a.registry, "alice", 8);

        a.router.empfangen(&ChatMessage::chat_one("alice", "carol", "hi"));
        a.router.route(ChatMessage::chat_one("alice", "carol", "hi"));

        let richtungen: Vec<Richtung> = a.audit.eintraege().iter().map(|e| e.richtung).collect();
        assert_eq!(
            richtungen,
            vec![Richtung::Empfangen, Richtung::Gesendet, Richtung::Gesendet]
        );
        assert_eq!(a.listener.empfangen.lock().len(), 1);
        // Original plus synthetisiertes InvalidUser
        assert_eq!(a.listener.gesendet.lock().len(), 2);
    }
}
