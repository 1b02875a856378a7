// Contracts with the external XMPP engine.
// Everything the core sends is a fire-and-forget submission; results come
// back later as EngineEvents.

use crate::address::Address;
use crate::models::{ChatMessage, ChatState, Presence, RosterEntry};

/// Outbound side of the engine.
pub trait Transport {
    /// Send a message carrying only a chat state, no body.
    fn send_state_notification(&self, to: &Address, state: ChatState);

    fn send_message(&self, to: &Address, body: &str, rich_body: Option<&str>);
}

/// Liveness queries answered from the presence store.
pub trait PresenceQuery {
    /// Resource names currently reporting an available presence.
    fn resources_online(&self, bare: &str) -> Vec<String>;

    fn is_resource_online(&self, full: &Address) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    Authentication,
    Network,
    Tls,
    Protocol,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Connected { bound: Address },
    Disconnected,
    Error(EngineErrorKind),
    RosterLoaded(Vec<RosterEntry>),
    RosterPushed(RosterEntry),
    PresenceChanged { from: Address, presence: Presence },
    MessageReceived(ChatMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connected,
    Disconnected,
    Connecting,
    Error(EngineErrorKind),
}
