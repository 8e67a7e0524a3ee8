//! Session-Handler – Verwaltet eine einzelne Client-Verbindung
//!
//! Jede Verbindung bekommt einen `SessionHandler` in einem eigenen
//! tokio-Task. Der Task ist der einzige Schreiber auf seinem Socket: direkte
//! Antworten und Nachrichten aus der Send-Queue werden nacheinander aus
//! derselben Schleife geschrieben, Frames koennen sich also nie vermischen.
//!
//! ## State Machine
//! ```text
//! Connecting -> AwaitingLogin -> Authenticated -> Disconnected
//!                   |  ^                              ^
//!                   +--+ (abgelehnt / Leerlauf)       |
//!                   +---------------------------------+ (IO-Fehler, Shutdown)
//! ```
//!
//! ## Aufraeumen
//! Genau einmal pro Sitzung, egal ueber welchen Weg die Sitzung endet:
//! Registry-Eintrag entfernen und, falls der Beitritt angekuendigt wurde,
//! `ClientLeft` an alle anderen routen. Laeuft auch im `Drop`, damit ein
//! abgebrochener Task (Ablauf der Gnadenfrist) ebenfalls aufraeumt.

use futures_util::{SinkExt, StreamExt};
use plauder_core::SessionId;
use plauder_protocol::{ChatMessage, FrameCodec, LoginAblehnung};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::codec::Framed;

use crate::error::{RelayError, RelayResult};
use crate::registry::ClientSender;
use crate::state::RelayState;

/// Text der Abschiedsnachricht beim Herunterfahren
pub const ABSCHIEDS_TEXT: &str = "Server wird heruntergefahren";

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Phase einer Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Verbindung angenommen, Kanal noch nicht eingerichtet
    Connecting,
    /// Wartet auf einen gueltigen, freien Namen
    AwaitingLogin,
    /// Angemeldet, Name gehoert dieser Sitzung
    Authenticated,
    /// Endzustand
    Disconnected,
}

/// Wie es nach einer verarbeiteten Nachricht weitergeht
enum Fluss {
    Weiter,
    Abmelden,
}

/// Warum die Schleife beendet wurde
enum Trennung {
    Abgemeldet,
    VomClient,
    Shutdown,
    Fehler(RelayError),
}

// ---------------------------------------------------------------------------
// SessionHandler
// ---------------------------------------------------------------------------

/// Zustandsautomat einer Verbindung
pub struct SessionHandler {
    state: Arc<RelayState>,
    peer_addr: SocketAddr,
    session_id: SessionId,
    phase: Phase,
    name: Option<String>,
    /// `ClientJoined` wurde an die anderen geroutet
    angekuendigt: bool,
    aufgeraeumt: bool,
}

impl SessionHandler {
    pub fn neu(state: Arc<RelayState>, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            peer_addr,
            session_id: SessionId::new(),
            phase: Phase::Connecting,
            name: None,
            angekuendigt: false,
            aufgeraeumt: false,
        }
    }

    /// Fuehrt die Sitzung aus bis sie endet
    ///
    /// Endet bei Logout, Verbindungsabbruch, IO-/Dekodierfehler oder
    /// Shutdown-Signal. Fehler werden nie wiederholt; der Client muss sich
    /// neu verbinden.
    pub async fn verarbeiten<S>(mut self, stream: S, mut shutdown_rx: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer = self.peer_addr;
        let session_id = self.session_id;
        let config = Arc::clone(&self.state.config);

        let mut framed = Framed::new(stream, FrameCodec::with_max_size(config.max_frame_bytes));
        let (sende_tx, mut sende_rx) = mpsc::channel::<ChatMessage>(config.sende_queue_groesse.max(1));

        tracing::info!(peer = %peer, session_id = %session_id, "Neue Verbindung");

        if *shutdown_rx.borrow() {
            tracing::debug!(peer = %peer, "Server stoppt bereits – Verbindung verworfen");
            self.aufraeumen();
            return;
        }

        self.phase = Phase::AwaitingLogin;
        let trennung = match self.login_auffordern(&mut framed).await {
            Ok(()) => {
                self.schleife(&mut framed, &sende_tx, &mut sende_rx, &mut shutdown_rx)
                    .await
            }
            Err(e) => Trennung::Fehler(e),
        };

        match trennung {
            Trennung::Abgemeldet => {
                tracing::info!(peer = %peer, session_id = %session_id, "Client abgemeldet");
            }
            Trennung::VomClient => {
                tracing::info!(peer = %peer, session_id = %session_id, "Verbindung vom Client getrennt");
            }
            Trennung::Shutdown => {
                tracing::info!(peer = %peer, session_id = %session_id, "Verbindung wegen Shutdown getrennt");
            }
            Trennung::Fehler(e) => {
                tracing::warn!(peer = %peer, session_id = %session_id, fehler = %e, "Verbindung abgebrochen");
                let wer = self.name.clone().unwrap_or_else(|| peer.to_string());
                self.state
                    .status(&format!("Verbindung zu {wer} abgebrochen: {e}"), true);
            }
        }

        self.aufraeumen();
        tracing::debug!(peer = %peer, session_id = %session_id, "Sitzungs-Task beendet");
    }

    async fn schleife<S>(
        &mut self,
        framed: &mut Framed<S, FrameCodec>,
        sende_tx: &mpsc::Sender<ChatMessage>,
        sende_rx: &mut mpsc::Receiver<ChatMessage>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Trennung
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let intervall = self.state.config.login_aufforderung;
        let mut naechste_aufforderung = Instant::now() + intervall;

        loop {
            tokio::select! {
                // Eingehende Nachricht vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(nachricht)) => {
                            naechste_aufforderung = Instant::now() + intervall;
                            match self.nachricht_verarbeiten(nachricht, framed, sende_tx).await {
                                Ok(Fluss::Weiter) => {}
                                Ok(Fluss::Abmelden) => return Trennung::Abgemeldet,
                                Err(e) => return Trennung::Fehler(e),
                            }
                        }
                        Some(Err(e)) => return Trennung::Fehler(e.into()),
                        None => return Trennung::VomClient,
                    }
                }

                // Ausgehende Nachricht aus der Send-Queue
                Some(ausgehend) = sende_rx.recv() => {
                    if let Err(e) = self.schreiben(framed, ausgehend).await {
                        return Trennung::Fehler(e);
                    }
                }

                // Erneute Login-Aufforderung bei Leerlauf
                _ = tokio::time::sleep_until(naechste_aufforderung), if self.phase == Phase::AwaitingLogin => {
                    naechste_aufforderung = Instant::now() + intervall;
                    if let Err(e) = self.login_auffordern(framed).await {
                        return Trennung::Fehler(e);
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        self.abschied(framed).await;
                        return Trennung::Shutdown;
                    }
                }
            }
        }
    }

    async fn nachricht_verarbeiten<S>(
        &mut self,
        nachricht: ChatMessage,
        framed: &mut Framed<S, FrameCodec>,
        sende_tx: &mpsc::Sender<ChatMessage>,
    ) -> RelayResult<Fluss>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tracing::trace!(peer = %self.peer_addr, art = %nachricht.art(), "Nachricht empfangen");
        self.state.router.empfangen(&nachricht);

        match self.phase {
            Phase::AwaitingLogin => match nachricht {
                ChatMessage::Login { name } => {
                    self.anmelden(name, framed, sende_tx).await?;
                    Ok(Fluss::Weiter)
                }
                andere => {
                    self.state.status(
                        &format!(
                            "Nachricht vor der Anmeldung verworfen ({}) von {}",
                            andere.art(),
                            self.peer_addr
                        ),
                        true,
                    );
                    self.login_auffordern(framed).await?;
                    Ok(Fluss::Weiter)
                }
            },
            Phase::Authenticated => self.dispatch(nachricht, framed).await,
            Phase::Connecting | Phase::Disconnected => Err(RelayError::protokoll(format!(
                "Nachricht in Phase {:?}",
                self.phase
            ))),
        }
    }

    async fn anmelden<S>(
        &mut self,
        name: String,
        framed: &mut Framed<S, FrameCodec>,
        sende_tx: &mpsc::Sender<ChatMessage>,
    ) -> RelayResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let sender = ClientSender::neu(name.clone(), sende_tx.clone());
        match self.state.registry.versuche_registrieren(sender) {
            Ok(()) => {
                // Ab hier gehoert der Name dieser Sitzung; jeder spaetere
                // Fehler laeuft ueber aufraeumen()
                self.name = Some(name.clone());
                self.phase = Phase::Authenticated;
                tracing::info!(
                    peer = %self.peer_addr,
                    session_id = %self.session_id,
                    name = %name,
                    "Client angemeldet"
                );

                self.direkt_schreiben(framed, ChatMessage::login_akzeptiert(name.clone()))
                    .await?;
                self.state.router.route(ChatMessage::ClientJoined { name });
                self.angekuendigt = true;
                Ok(())
            }
            Err(grund) => {
                tracing::debug!(peer = %self.peer_addr, name = %name, grund = ?grund, "Login abgelehnt");
                self.direkt_schreiben(framed, ChatMessage::login_abgelehnt(name, grund))
                    .await
            }
        }
    }

    /// Verteilt die Nachrichten einer angemeldeten Sitzung
    ///
    /// Die Quelle wird immer auf den eigenen Namen gesetzt; ein Client kann
    /// nicht im Namen eines anderen schreiben.
    async fn dispatch<S>(
        &mut self,
        nachricht: ChatMessage,
        framed: &mut Framed<S, FrameCodec>,
    ) -> RelayResult<Fluss>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let name = self
            .name
            .clone()
            .ok_or_else(|| RelayError::intern("angemeldete Sitzung ohne Namen"))?;
        if !nachricht.vom_client() {
            self.state.status(
                &format!("{name} hat eine Server-Nachricht gesendet ({}), verworfen", nachricht.art()),
                true,
            );
            return Ok(Fluss::Weiter);
        }

        let router = &self.state.router;
        match nachricht {
            ChatMessage::ChatAll { text, .. } => {
                router.route(ChatMessage::chat_all(name, text));
            }
            ChatMessage::ChatOne { dest, text, .. } => {
                router.route(ChatMessage::chat_one(name, dest, text));
            }
            ChatMessage::ListNamesRequest { .. } => {
                let names = self.state.registry.momentaufnahme();
                router.route(ChatMessage::NameList { dest: name, names });
            }
            ChatMessage::Logout { name: angegeben } => {
                if angegeben != name {
                    tracing::debug!(name = %name, angegeben = %angegeben, "Logout mit fremdem Namen");
                }
                return Ok(Fluss::Abmelden);
            }
            ChatMessage::Login { name: gewuenscht } => {
                self.direkt_schreiben(
                    framed,
                    ChatMessage::login_abgelehnt(gewuenscht, LoginAblehnung::AlreadyLoggedIn),
                )
                .await?;
            }
            // Server-Arten wurden oben per vom_client() aussortiert
            _ => {}
        }
        Ok(Fluss::Weiter)
    }

    async fn login_auffordern<S>(&self, framed: &mut Framed<S, FrameCodec>) -> RelayResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.direkt_schreiben(framed, ChatMessage::LoginRequest).await
    }

    async fn abschied<S>(&self, framed: &mut Framed<S, FrameCodec>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Err(e) = self
            .direkt_schreiben(framed, ChatMessage::broadcast(ABSCHIEDS_TEXT))
            .await
        {
            tracing::debug!(peer = %self.peer_addr, fehler = %e, "Abschiedsnachricht nicht zugestellt");
        }
    }

    /// Schreibt an der Registry vorbei (Audit + Listener werden trotzdem bedient)
    async fn direkt_schreiben<S>(
        &self,
        framed: &mut Framed<S, FrameCodec>,
        nachricht: ChatMessage,
    ) -> RelayResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.state.router.gesendet(&nachricht);
        self.schreiben(framed, nachricht).await
    }

    async fn schreiben<S>(
        &self,
        framed: &mut Framed<S, FrameCodec>,
        nachricht: ChatMessage,
    ) -> RelayResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match tokio::time::timeout(self.state.config.schreib_timeout, framed.send(nachricht)).await
        {
            Ok(ergebnis) => ergebnis.map_err(RelayError::from),
            Err(_) => Err(RelayError::Timeout),
        }
    }

    /// Idempotentes Aufraeumen, laeuft hoechstens einmal
    fn aufraeumen(&mut self) {
        if self.aufgeraeumt {
            return;
        }
        self.aufgeraeumt = true;
        self.phase = Phase::Disconnected;

        if let Some(name) = self.name.take() {
            self.state.registry.entfernen(&name);
            if self.angekuendigt {
                self.state.router.route(ChatMessage::ClientLeft { name });
            }
        }
    }
}

impl Drop for SessionHandler {
    fn drop(&mut self) {
        self.aufraeumen();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::test_hilfen::AufzeichnenderListener;
    use crate::state::RelayConfig;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    type Client = Framed<DuplexStream, FrameCodec>;

    struct Aufbau {
        state: Arc<RelayState>,
        listener: Arc<AufzeichnenderListener>,
        shutdown_tx: watch::Sender<bool>,
    }

    fn aufbau_mit(config: RelayConfig) -> Aufbau {
        let listener = AufzeichnenderListener::neu();
        let state = RelayState::neu(config, listener.clone());
        let (shutdown_tx, _) = watch::channel(false);
        Aufbau {
            state,
            listener,
            shutdown_tx,
        }
    }

    fn aufbau() -> Aufbau {
        aufbau_mit(RelayConfig::default())
    }

    fn verbinden(a: &Aufbau) -> (Client, JoinHandle<()>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let handler = SessionHandler::neu(Arc::clone(&a.state), "127.0.0.1:4000".parse().unwrap());
        let rx = a.shutdown_tx.subscribe();
        let task = tokio::spawn(handler.verarbeiten(server, rx));
        (Framed::new(client, FrameCodec::new()), task)
    }

    async fn naechste(client: &mut Client) -> ChatMessage {
        tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("Timeout beim Lesen")
            .expect("Verbindung beendet")
            .expect("Frame-Fehler")
    }

    async fn anmelden(client: &mut Client, name: &str) {
        assert_eq!(naechste(client).await, ChatMessage::LoginRequest);
        client.send(ChatMessage::login(name)).await.unwrap();
        assert_eq!(naechste(client).await, ChatMessage::login_akzeptiert(name));
    }

    async fn ende_abwarten(task: JoinHandle<()>) {
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("Sitzung endet nicht")
            .unwrap();
    }

    #[tokio::test]
    async fn login_request_zuerst_dann_anmeldung() {
        let a = aufbau();
        let (mut client, _task) = verbinden(&a);

        anmelden(&mut client, "alice").await;
        assert!(a.state.registry.ist_registriert("alice"));
    }

    #[tokio::test]
    async fn abgelehnter_name_darf_erneut_versuchen() {
        let a = aufbau();
        let (mut client, _task) = verbinden(&a);

        assert_eq!(naechste(&mut client).await, ChatMessage::LoginRequest);
        client.send(ChatMessage::login("server")).await.unwrap();
        assert_eq!(
            naechste(&mut client).await,
            ChatMessage::login_abgelehnt("server", LoginAblehnung::NameReserved)
        );
        client.send(ChatMessage::login("kein name")).await.unwrap();
        assert_eq!(
            naechste(&mut client).await,
            ChatMessage::login_abgelehnt("kein name", LoginAblehnung::NameInvalid)
        );

        client.send(ChatMessage::login("dave")).await.unwrap();
        assert_eq!(naechste(&mut client).await, ChatMessage::login_akzeptiert("dave"));
    }

    #[tokio::test]
    async fn nachricht_vor_login_wird_verworfen_und_neu_aufgefordert() {
        let a = aufbau();
        let (mut client, _task) = verbinden(&a);

        assert_eq!(naechste(&mut client).await, ChatMessage::LoginRequest);
        client.send(ChatMessage::chat_all("eve", "hallo")).await.unwrap();
        assert_eq!(naechste(&mut client).await, ChatMessage::LoginRequest);

        assert_eq!(a.listener.fehler_anzahl(), 1);
        assert_eq!(a.state.registry.anzahl(), 0);
    }

    #[tokio::test]
    async fn leerlauf_loest_erneute_aufforderung_aus() {
        let a = aufbau_mit(RelayConfig {
            login_aufforderung: Duration::from_millis(50),
            ..RelayConfig::default()
        });
        let (mut client, _task) = verbinden(&a);

        assert_eq!(naechste(&mut client).await, ChatMessage::LoginRequest);
        assert_eq!(naechste(&mut client).await, ChatMessage::LoginRequest);
    }

    #[tokio::test]
    async fn zweiter_login_wird_abgelehnt() {
        let a = aufbau();
        let (mut client, _task) = verbinden(&a);
        anmelden(&mut client, "alice").await;

        client.send(ChatMessage::login("alice2")).await.unwrap();
        assert_eq!(
            naechste(&mut client).await,
            ChatMessage::login_abgelehnt("alice2", LoginAblehnung::AlreadyLoggedIn)
        );
        assert!(a.state.registry.ist_registriert("alice"));
        assert!(!a.state.registry.ist_registriert("alice2"));
    }

    #[tokio::test]
    async fn namensliste_enthaelt_sich_selbst() {
        let a = aufbau();
        let (mut client, _task) = verbinden(&a);
        anmelden(&mut client, "alice").await;

        client
            .send(ChatMessage::ListNamesRequest {
                source: "alice".into(),
            })
            .await
            .unwrap();
        match naechste(&mut client).await {
            ChatMessage::NameList { dest, names } => {
                assert_eq!(dest, "alice");
                assert!(names.contains("alice"));
            }
            andere => panic!("Erwartet NameList, bekommen {andere:?}"),
        }
    }

    #[tokio::test]
    async fn server_nachricht_vom_client_wird_verworfen() {
        let a = aufbau();
        let (mut alice, _t1) = verbinden(&a);
        anmelden(&mut alice, "alice").await;
        let (mut bob, _t2) = verbinden(&a);
        anmelden(&mut bob, "bob").await;
        assert_eq!(
            naechste(&mut alice).await,
            ChatMessage::ClientJoined { name: "bob".into() }
        );

        bob.send(ChatMessage::broadcast("ich bin der Server")).await.unwrap();
        bob.send(ChatMessage::ClientLeft { name: "alice".into() })
            .await
            .unwrap();
        // Sitzung laeuft weiter und antwortet noch
        bob.send(ChatMessage::chat_one("bob", "alice", "normal"))
            .await
            .unwrap();

        assert_eq!(
            naechste(&mut alice).await,
            ChatMessage::chat_one("bob", "alice", "normal")
        );
        assert_eq!(a.listener.fehler_anzahl(), 2);
        assert!(a.state.registry.ist_registriert("alice"));
    }

    #[tokio::test]
    async fn gefaelschte_quelle_wird_ersetzt() {
        let a = aufbau();
        let (mut alice, _t1) = verbinden(&a);
        anmelden(&mut alice, "alice").await;
        let (mut bob, _t2) = verbinden(&a);
        anmelden(&mut bob, "bob").await;
        assert_eq!(
            naechste(&mut alice).await,
            ChatMessage::ClientJoined { name: "bob".into() }
        );

        bob.send(ChatMessage::chat_one("mallory", "alice", "hi"))
            .await
            .unwrap();
        assert_eq!(
            naechste(&mut alice).await,
            ChatMessage::chat_one("bob", "alice", "hi")
        );
    }

    #[tokio::test]
    async fn logout_mit_fremdem_namen_meldet_eigenen_namen_ab() {
        let a = aufbau();
        let (mut client, task) = verbinden(&a);
        anmelden(&mut client, "alice").await;

        client.send(ChatMessage::logout("bob")).await.unwrap();
        ende_abwarten(task).await;
        assert!(!a.state.registry.ist_registriert("alice"));
    }

    #[tokio::test]
    async fn abrupte_trennung_raeumt_auf() {
        let a = aufbau();
        let (mut client, task) = verbinden(&a);
        anmelden(&mut client, "alice").await;

        drop(client);
        ende_abwarten(task).await;
        assert_eq!(a.state.registry.anzahl(), 0);
        assert!(a.listener.fehler_anzahl() == 0);
    }

    #[tokio::test]
    async fn kaputter_frame_trennt_die_sitzung() {
        let a = aufbau();
        let (mut client, task) = verbinden(&a);
        anmelden(&mut client, "alice").await;

        client
            .get_mut()
            .write_all(&[0, 0, 0, 3, b'x', b'y', b'z'])
            .await
            .unwrap();
        ende_abwarten(task).await;

        assert!(!a.state.registry.ist_registriert("alice"));
        assert_eq!(a.listener.fehler_anzahl(), 1);
    }

    #[tokio::test]
    async fn shutdown_sendet_abschied() {
        let a = aufbau();
        let (mut client, task) = verbinden(&a);
        anmelden(&mut client, "alice").await;

        a.shutdown_tx.send(true).unwrap();
        assert_eq!(
            naechste(&mut client).await,
            ChatMessage::broadcast(ABSCHIEDS_TEXT)
        );
        ende_abwarten(task).await;
        assert_eq!(a.state.registry.anzahl(), 0);
    }

    #[tokio::test]
    async fn abgebrochener_task_raeumt_ueber_drop_auf() {
        let a = aufbau();
        let (mut bob, _t1) = verbinden(&a);
        anmelden(&mut bob, "bob").await;
        let (mut alice, task) = verbinden(&a);
        anmelden(&mut alice, "alice").await;
        assert_eq!(
            naechste(&mut bob).await,
            ChatMessage::ClientJoined { name: "alice".into() }
        );

        task.abort();
        let _ = task.await;

        assert!(!a.state.registry.ist_registriert("alice"));
        assert_eq!(
            naechste(&mut bob).await,
            ChatMessage::ClientLeft { name: "alice".into() }
        );
    }

    #[test]
    fn aufraeumen_ist_idempotent() {
        let a = aufbau();
        let (tx, _rx) = mpsc::channel(4);
        a.state
            .registry
            .versuche_registrieren(ClientSender::neu("alice", tx))
            .unwrap();

        let mut handler = SessionHandler::neu(Arc::clone(&a.state), "127.0.0.1:1".parse().unwrap());
        handler.name = Some("alice".into());
        handler.phase = Phase::Authenticated;
        handler.angekuendigt = true;

        handler.aufraeumen();
        handler.aufraeumen();
        drop(handler);

        // Genau ein ClientLeft und keine Meldung ueber einen abwesenden Namen
        let left: Vec<_> = a
            .listener
            .gesendet
            .lock()
            .iter()
            .filter(|n| matches!(n, ChatMessage::ClientLeft { .. }))
            .cloned()
            .collect();
        assert_eq!(left.len(), 1);
        assert!(a.listener.status.lock().is_empty());
    }
}
