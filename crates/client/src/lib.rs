//! plauder-client – Client-Bibliothek fuer das Plauder-Chatrelay
//!
//! Baut eine TCP-Verbindung zum Server auf, meldet sich mit einem
//! Anzeigenamen an und verschickt danach Nachrichten an alle oder an
//! einzelne Clients. Eingehende Nachrichten landen beim `ClientListener`.
//!
//! ```text
//! ChatClient (Handle, Befehle per mpsc)
//!     |
//!     v
//! Verbindungs-Task (Framed<_, FrameCodec>, select! ueber Socket + Befehle)
//!     |
//!     v
//! ClientListener
//! ```

pub mod client;
pub mod error;
pub mod listener;

pub use client::ChatClient;
pub use error::{ClientError, ClientResult};
pub use listener::{ClientListener, GeteilterClientListener};
