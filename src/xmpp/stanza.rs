// Stanza codec: parse inbound stanzas into EngineEvents, build outbound ones.
//
// RFC 6120/6121 core stanzas plus:
// XEP-0085 chat states, XEP-0071 XHTML-IM bodies, XEP-0334 storage hints.

use log::{debug, warn};
use uuid::Uuid;
use xmpp_parsers::Element;

use super::custom_ns;
use crate::address::Address;
use crate::engine::EngineEvent;
use crate::models::{Availability, ChatMessage, ChatState, Presence, RosterEntry, Subscription};

const CHAT_STATE_NAMES: [&str; 5] = ["active", "composing", "paused", "inactive", "gone"];

/// What an inbound stanza means to the core.
#[derive(Debug, PartialEq)]
pub enum Incoming {
    Event(EngineEvent),
    /// A roster push that has to be acknowledged with `id`
    RosterPush { id: String, entries: Vec<RosterEntry> },
    Ignored,
}

/// Classify one inbound stanza. `own_bare` is the bare address of the
/// account; roster pushes from anyone else are ignored.
pub fn classify(stanza: &Element, own_bare: Option<&str>) -> Incoming {
    match stanza.name() {
        "message" => match parse_message(stanza) {
            Some(message) => Incoming::Event(EngineEvent::MessageReceived(message)),
            None => Incoming::Ignored,
        },
        "presence" => match parse_presence(stanza) {
            Some((from, presence)) => Incoming::Event(EngineEvent::PresenceChanged { from, presence }),
            None => Incoming::Ignored,
        },
        "iq" => classify_iq(stanza, own_bare),
        other => {
            debug!("Ignoring <{}> stanza", other);
            Incoming::Ignored
        }
    }
}

fn classify_iq(stanza: &Element, own_bare: Option<&str>) -> Incoming {
    let Some(query) = stanza.get_child("query", custom_ns::ROSTER) else {
        return Incoming::Ignored;
    };

    match stanza.attr("type") {
        Some("result") => Incoming::Event(EngineEvent::RosterLoaded(parse_roster_items(query))),
        Some("set") => {
            if let Some(from) = stanza.attr("from") {
                let trusted = match (Address::parse(from), own_bare) {
                    (Ok(from), Some(own)) => from.is_bare() && from.bare_str() == own,
                    _ => false,
                };
                if !trusted {
                    warn!("Ignoring roster push from foreign address {}", from);
                    return Incoming::Ignored;
                }
            }
            Incoming::RosterPush {
                id: stanza.attr("id").unwrap_or_default().to_string(),
                entries: parse_roster_items(query),
            }
        }
        other => {
            debug!("Ignoring roster iq of type {:?}", other);
            Incoming::Ignored
        }
    }
}

/// Parse a `<message/>`. Errors and messages with neither body nor chat
/// state yield `None`.
pub fn parse_message(stanza: &Element) -> Option<ChatMessage> {
    if stanza.attr("type") == Some("error") {
        debug!("Dropping error message from {:?}", stanza.attr("from"));
        return None;
    }

    let from = match stanza.attr("from").map(Address::parse) {
        Some(Ok(from)) => from,
        Some(Err(e)) => {
            warn!("Dropping message with unusable sender: {}", e);
            return None;
        }
        None => {
            warn!("Received message stanza without 'from' attribute");
            return None;
        }
    };

    let body = stanza
        .get_child("body", custom_ns::JABBER_CLIENT)
        .map(|b| b.text())
        .filter(|b| !b.is_empty());

    let state = CHAT_STATE_NAMES
        .iter()
        .find(|name| stanza.has_child(**name, custom_ns::CHATSTATES))
        .and_then(|name| ChatState::from_element_name(name));

    if body.is_none() && state.is_none() {
        return None;
    }

    let mut message = ChatMessage::incoming(from, body.as_deref(), state);
    if let Some(id) = stanza.attr("id") {
        message.id = id.to_string();
    }
    message.to = stanza.attr("to").and_then(|to| Address::parse(to).ok());
    message.rich_body = parse_rich_body(stanza);
    Some(message)
}

fn parse_rich_body(stanza: &Element) -> Option<String> {
    let body = stanza
        .get_child("html", custom_ns::XHTML_IM)?
        .get_child("body", custom_ns::XHTML)?;
    let mut buf = Vec::new();
    if let Err(e) = body.write_to(&mut buf) {
        warn!("Failed to serialize XHTML-IM body: {}", e);
        return None;
    }
    String::from_utf8(buf).ok()
}

/// Parse a `<presence/>` into its sender and presence. Subscription
/// management and probes yield `None`.
pub fn parse_presence(stanza: &Element) -> Option<(Address, Presence)> {
    let from = Address::parse(stanza.attr("from")?).ok()?;

    let availability = match stanza.attr("type") {
        None | Some("available") => match stanza.get_child("show", custom_ns::JABBER_CLIENT) {
            Some(show) => match show.text().trim() {
                "away" => Availability::Away,
                "xa" => Availability::ExtendedAway,
                "dnd" => Availability::DoNotDisturb,
                "chat" => Availability::Chat,
                _ => Availability::Available,
            },
            None => Availability::Available,
        },
        Some("unavailable") => Availability::Unavailable,
        Some(other) => {
            debug!("Ignoring presence of type '{}' from {}", other, from);
            return None;
        }
    };

    let status = stanza
        .get_child("status", custom_ns::JABBER_CLIENT)
        .map(|s| s.text())
        .filter(|s| !s.is_empty());
    let priority = stanza
        .get_child("priority", custom_ns::JABBER_CLIENT)
        .and_then(|p| p.text().trim().parse::<i8>().ok())
        .unwrap_or(0);

    Some((from, Presence { availability, status, priority }))
}

/// Items of a `jabber:iq:roster` query. Items without a usable jid are skipped.
pub fn parse_roster_items(query: &Element) -> Vec<RosterEntry> {
    query
        .children()
        .filter(|item| item.is("item", custom_ns::ROSTER))
        .filter_map(|item| {
            let jid = item.attr("jid")?;
            let address = match Address::parse(jid) {
                Ok(address) => address,
                Err(e) => {
                    warn!("Skipping roster item: {}", e);
                    return None;
                }
            };
            Some(RosterEntry {
                address: address.to_bare(),
                name: item.attr("name").filter(|n| !n.is_empty()).map(str::to_string),
                subscription: Subscription::from_attr(item.attr("subscription")),
                ask: item.attr("ask") == Some("subscribe"),
                groups: item
                    .children()
                    .filter(|g| g.is("group", custom_ns::ROSTER))
                    .map(|g| g.text())
                    .filter(|g| !g.is_empty())
                    .collect(),
            })
        })
        .collect()
}

fn no_store_hint() -> Element {
    Element::builder("no-store", custom_ns::HINTS).build()
}

/// A body-less chat message carrying one chat state. `ChatState::None`
/// has nothing to say and yields `None`.
pub fn chat_state_message(to: &Address, state: ChatState) -> Option<Element> {
    let name = state.element_name()?;
    Some(
        Element::builder("message", custom_ns::JABBER_CLIENT)
            .attr("to", to.to_string())
            .attr("type", "chat")
            .attr("id", Uuid::new_v4().to_string())
            .append(Element::builder(name, custom_ns::CHATSTATES).build())
            .append(no_store_hint())
            .build(),
    )
}

/// A chat message with a body, announcing the Active state.
pub fn chat_message(to: &Address, body: &str, rich_body: Option<&str>) -> Element {
    let mut message = Element::builder("message", custom_ns::JABBER_CLIENT)
        .attr("to", to.to_string())
        .attr("type", "chat")
        .attr("id", Uuid::new_v4().to_string())
        .build();

    let mut body_el = Element::builder("body", custom_ns::JABBER_CLIENT).build();
    body_el.append_text_node(body);
    message.append_child(body_el);

    if let Some(rich) = rich_body {
        match rich.parse::<Element>() {
            Ok(rich) if rich.is("body", custom_ns::XHTML) => {
                let html = Element::builder("html", custom_ns::XHTML_IM).append(rich).build();
                message.append_child(html);
            }
            Ok(_) => warn!("Rich body is not an XHTML <body/>, sending plain text only"),
            Err(e) => warn!("Rich body is not valid XML, sending plain text only: {}", e),
        }
    }

    message.append_child(Element::builder("active", custom_ns::CHATSTATES).build());
    message
}

pub fn roster_request(id: &str) -> Element {
    Element::builder("iq", custom_ns::JABBER_CLIENT)
        .attr("type", "get")
        .attr("id", id)
        .append(Element::builder("query", custom_ns::ROSTER).build())
        .build()
}

pub fn roster_push_ack(id: &str) -> Element {
    Element::builder("iq", custom_ns::JABBER_CLIENT)
        .attr("type", "result")
        .attr("id", id)
        .build()
}

pub fn initial_presence() -> Element {
    Element::builder("presence", custom_ns::JABBER_CLIENT).build()
}

pub fn unavailable_presence() -> Element {
    Element::builder("presence", custom_ns::JABBER_CLIENT)
        .attr("type", "unavailable")
        .build()
}
