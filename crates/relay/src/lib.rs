//! plauder-relay – Sitzungs- und Routing-Kern
//!
//! Clients verbinden sich per TCP, melden sich mit einem eindeutigen
//! Anzeigenamen an und tauschen danach Nachrichten an alle oder an einzelne
//! Clients aus, bis sie sich abmelden oder die Verbindung abbricht.
//!
//! ## Architektur
//!
//! ```text
//! ConnectionAcceptor (Listen-Socket, begrenzter Sitzungs-Pool)
//!     |
//!     v
//! SessionHandler (pro Verbindung ein Task)
//!     |  State Machine: Connecting -> AwaitingLogin -> Authenticated -> Disconnected
//!     |
//!     v
//! MessageRouter ----> AuditLog
//!     |
//!     v
//! ClientRegistry (Name -> Send-Queue, ein Mutex fuer alles)
//! ```
//!
//! Der `ChatListener` wird von Sitzungen, Router und Registry synchron
//! aufgerufen und ist die einzige Schnittstelle nach aussen.

pub mod acceptor;
pub mod audit;
pub mod error;
pub mod listener;
pub mod registry;
pub mod router;
pub mod session;
pub mod state;

// Bequeme Re-Exporte
pub use acceptor::ConnectionAcceptor;
pub use audit::{AuditEintrag, AuditLog, Richtung};
pub use error::{RelayError, RelayResult};
pub use listener::{ChatListener, GeteilterListener, TracingListener};
pub use registry::{ClientRegistry, ClientSender, Zustellfehler};
pub use router::MessageRouter;
pub use session::{Phase, SessionHandler};
pub use state::{RelayConfig, RelayState};
