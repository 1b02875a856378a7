// XMPP adapter for Parley
// Turns stanzas into EngineEvents and Transport calls into stanzas.
// Organized the same way as the protocol: stanza codec, then the connection task.

pub mod connection;
pub mod stanza;

pub use connection::{connect, XmppTransport};

// Namespaces used on the wire
pub mod custom_ns {
    pub const JABBER_CLIENT: &str = "jabber:client";
    pub const CHATSTATES: &str = "http://jabber.org/protocol/chatstates";
    pub const ROSTER: &str = "jabber:iq:roster";
    pub const XHTML_IM: &str = "http://jabber.org/protocol/xhtml-im";
    pub const XHTML: &str = "http://www.w3.org/1999/xhtml";
    pub const HINTS: &str = "urn:xmpp:hints";
}
