//! plauder-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichten die zwischen Client und Server
//! ausgetauscht werden, sowie das Frame-Format auf der TCP-Verbindung.

pub mod message;
pub mod wire;

pub use message::{ChatMessage, LoginAblehnung, MessageKind, Ziel};
pub use wire::FrameCodec;
