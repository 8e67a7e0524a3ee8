//! ChatClient und Verbindungs-Task
//!
//! Der Socket gehoert allein dem Verbindungs-Task. Das Handle schickt
//! Befehle ueber eine mpsc-Queue; Login-Antworten kommen per oneshot zurueck,
//! damit `anmelden` einen abgelehnten Namen direkt melden kann.

use crate::error::{ClientError, ClientResult};
use crate::listener::{ClientListener, GeteilterClientListener};
use futures_util::{SinkExt, StreamExt};
use plauder_core::{NamensRegel, STANDARD_NAMENSMUSTER};
use plauder_protocol::{ChatMessage, FrameCodec, LoginAblehnung};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

/// Kapazitaet der Befehls-Queue zwischen Handle und Task
const BEFEHLS_QUEUE: usize = 32;

type LoginAntwort = oneshot::Sender<Result<(), LoginAblehnung>>;

enum Befehl {
    Anmelden { name: String, antwort: LoginAntwort },
    Senden(ChatMessage),
}

/// Login der gesendet wurde und auf seine `LoginResponse` wartet
struct OffeneAnmeldung {
    name: String,
    antwort: LoginAntwort,
}

/// Verbindung eines Clients zum Chat-Server
pub struct ChatClient {
    befehle: mpsc::Sender<Befehl>,
    task: JoinHandle<()>,
    name: Option<String>,
    regel: NamensRegel,
    listener: GeteilterClientListener,
}

impl ChatClient {
    /// Verbindet per TCP. Lokal wird nur das Standardmuster geprueft,
    /// reservierte Namen kennt allein der Server.
    pub async fn verbinden(
        adresse: impl ToSocketAddrs,
        listener: GeteilterClientListener,
    ) -> ClientResult<Self> {
        let regel = NamensRegel::neu(STANDARD_NAMENSMUSTER, Vec::<String>::new())?;
        Self::verbinden_mit(adresse, regel, listener).await
    }

    /// Wie `verbinden`, aber mit eigener Namensregel
    pub async fn verbinden_mit(
        adresse: impl ToSocketAddrs,
        regel: NamensRegel,
        listener: GeteilterClientListener,
    ) -> ClientResult<Self> {
        let stream = TcpStream::connect(adresse).await?;
        tracing::info!(peer = %stream.peer_addr()?, "TCP-Verbindung zum Server hergestellt");
        Ok(Self::ueber_stream(stream, regel, listener))
    }

    /// Startet den Verbindungs-Task auf einem bereits verbundenen Stream
    pub fn ueber_stream<S>(stream: S, regel: NamensRegel, listener: GeteilterClientListener) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (befehle, befehle_rx) = mpsc::channel(BEFEHLS_QUEUE);
        let framed = Framed::new(stream, FrameCodec::new());
        let task = tokio::spawn(verbindung_bedienen(framed, befehle_rx, listener.clone()));
        Self {
            befehle,
            task,
            name: None,
            regel,
            listener,
        }
    }

    /// Meldet sich mit `name` an und wartet auf die Antwort des Servers.
    ///
    /// Bei `ClientError::Abgelehnt` bleibt die Verbindung offen und ein
    /// weiterer Versuch mit einem anderen Namen ist moeglich.
    pub async fn anmelden(&mut self, name: &str) -> ClientResult<()> {
        if !self.regel.ist_gueltig(name) {
            self.listener
                .on_status(&format!("Ungueltiger Name: {name}"), true);
            return Err(ClientError::UngueltigerName(name.to_string()));
        }

        let (antwort, antwort_rx) = oneshot::channel();
        self.befehl(Befehl::Anmelden {
            name: name.to_string(),
            antwort,
        })
        .await?;

        match antwort_rx.await {
            Ok(Ok(())) => {
                tracing::info!(name, "Angemeldet");
                self.name = Some(name.to_string());
                Ok(())
            }
            Ok(Err(grund)) => {
                self.listener.on_status(
                    &format!("Anmeldung als {name} abgelehnt: {}", grund.beschreibung()),
                    true,
                );
                Err(ClientError::Abgelehnt {
                    name: name.to_string(),
                    grund,
                })
            }
            Err(_) => Err(ClientError::Getrennt),
        }
    }

    /// Nachricht an alle anderen angemeldeten Clients
    pub async fn nachricht_an_alle(&self, text: impl Into<String>) -> ClientResult<()> {
        let quelle = self.angemeldet()?;
        self.befehl(Befehl::Senden(ChatMessage::chat_all(quelle, text)))
            .await
    }

    /// Direktnachricht; unbekannte Empfaenger beantwortet der Server mit `InvalidUser`
    pub async fn nachricht_an(
        &self,
        ziel: impl Into<String>,
        text: impl Into<String>,
    ) -> ClientResult<()> {
        let quelle = self.angemeldet()?;
        self.befehl(Befehl::Senden(ChatMessage::chat_one(quelle, ziel, text)))
            .await
    }

    /// Fordert die Liste der angemeldeten Namen an (Antwort kommt als `NameList`)
    pub async fn namen_anfragen(&self) -> ClientResult<()> {
        let quelle = self.angemeldet()?;
        self.befehl(Befehl::Senden(ChatMessage::ListNamesRequest {
            source: quelle.to_string(),
        }))
        .await
    }

    /// Meldet sich ab (falls angemeldet) und schliesst die Verbindung
    pub async fn abmelden(self) -> ClientResult<()> {
        let ergebnis = match &self.name {
            Some(name) => {
                self.befehl(Befehl::Senden(ChatMessage::logout(name.clone())))
                    .await
            }
            None => Ok(()),
        };
        self.trennen().await;
        ergebnis
    }

    /// Schliesst die Verbindung ohne Logout
    pub async fn trennen(self) {
        let ChatClient { befehle, task, .. } = self;
        drop(befehle);
        if let Err(e) = task.await {
            tracing::warn!(fehler = %e, "Verbindungs-Task abgebrochen");
        }
    }

    /// false sobald die Verbindung beendet ist
    pub fn laeuft(&self) -> bool {
        !self.task.is_finished()
    }

    /// Angemeldeter Name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Prueft nur das Muster, nicht ob der Name frei ist
    pub fn ist_gueltiger_name(&self, name: &str) -> bool {
        self.regel.ist_gueltig(name)
    }

    fn angemeldet(&self) -> ClientResult<&str> {
        match self.name.as_deref() {
            Some(name) => Ok(name),
            None => {
                self.listener.on_status("Client ist nicht angemeldet", true);
                Err(ClientError::NichtAngemeldet)
            }
        }
    }

    async fn befehl(&self, befehl: Befehl) -> ClientResult<()> {
        self.befehle
            .send(befehl)
            .await
            .map_err(|_| ClientError::Getrennt)
    }
}

// ---------------------------------------------------------------------------
// Verbindungs-Task
// ---------------------------------------------------------------------------

async fn verbindung_bedienen<S>(
    mut framed: Framed<S, FrameCodec>,
    mut befehle: mpsc::Receiver<Befehl>,
    listener: GeteilterClientListener,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut offen: Option<OffeneAnmeldung> = None;

    loop {
        tokio::select! {
            frame = framed.next() => {
                match frame {
                    Some(Ok(nachricht)) => eingang(nachricht, &mut offen, listener.as_ref()),
                    Some(Err(e)) => {
                        tracing::warn!(fehler = %e, "Frame-Lesefehler");
                        listener.on_status(&format!("Lesefehler: {e}"), true);
                        break;
                    }
                    None => {
                        tracing::info!("Verbindung vom Server getrennt");
                        break;
                    }
                }
            }
            befehl = befehle.recv() => {
                let nachricht = match befehl {
                    Some(Befehl::Anmelden { name, antwort }) => {
                        let login = ChatMessage::login(name.clone());
                        offen = Some(OffeneAnmeldung { name, antwort });
                        login
                    }
                    Some(Befehl::Senden(nachricht)) => nachricht,
                    // Handle verworfen
                    None => break,
                };
                if let Err(e) = framed.send(nachricht.clone()).await {
                    tracing::warn!(fehler = %e, "Senden fehlgeschlagen");
                    listener.on_status(&format!("Senden fehlgeschlagen: {e}"), true);
                    break;
                }
                listener.on_message_sent(&nachricht);
            }
        }
    }

    listener.on_status("Verbindung zum Server beendet", false);
}

/// Verarbeitet eine Nachricht vom Server
fn eingang(
    nachricht: ChatMessage,
    offen: &mut Option<OffeneAnmeldung>,
    listener: &dyn ClientListener,
) {
    if nachricht.vom_client() {
        tracing::warn!(art = %nachricht.art(), "Nachricht ohne Server-Herkunft verworfen");
        listener.on_status(
            &format!("Keine Server-Nachricht ({}), verworfen", nachricht.art()),
            true,
        );
        return;
    }

    if let ChatMessage::LoginResponse {
        name,
        accepted,
        reason,
    } = &nachricht
    {
        if offen.as_ref().is_some_and(|o| &o.name == name) {
            if let Some(anmeldung) = offen.take() {
                let ergebnis = if *accepted {
                    Ok(())
                } else {
                    // Ablehnung ohne Grund kommt vom Relay nicht vor
                    Err(reason.unwrap_or(LoginAblehnung::NameInvalid))
                };
                // Empfaenger weg heisst: anmelden() wurde abgebrochen
                let _ = anmeldung.antwort.send(ergebnis);
            }
        }
    }

    listener.on_message_received(&nachricht);
}
