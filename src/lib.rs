// Parley: presentation and conversation core of an XMPP instant-messaging client
pub mod address;
pub mod chat_state;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod models;
pub mod presence;
pub mod roster;
pub mod router;
pub mod session;
pub mod unread;
pub mod xmpp; // tokio-xmpp adapter

// Re-export main types for convenience
pub use address::{Address, AddressError};
pub use engine::{ClientState, EngineErrorKind, EngineEvent, PresenceQuery, Transport};
pub use models::*;
pub use session::{Notice, Session, SessionError};
