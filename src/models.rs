use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;

/// XEP-0085 chat states. `None` means nothing has been announced yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChatState {
    #[default]
    None,
    Active,
    Composing,
    Paused,
    Inactive,
    Gone,
}

impl ChatState {
    /// Element name used on the wire, `None` has no representation.
    pub fn element_name(&self) -> Option<&'static str> {
        match self {
            ChatState::None => None,
            ChatState::Active => Some("active"),
            ChatState::Composing => Some("composing"),
            ChatState::Paused => Some("paused"),
            ChatState::Inactive => Some("inactive"),
            ChatState::Gone => Some("gone"),
        }
    }

    pub fn from_element_name(name: &str) -> Option<ChatState> {
        match name {
            "active" => Some(ChatState::Active),
            "composing" => Some(ChatState::Composing),
            "paused" => Some(ChatState::Paused),
            "inactive" => Some(ChatState::Inactive),
            "gone" => Some(ChatState::Gone),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChatState::None => "None",
            ChatState::Active => "Active",
            ChatState::Composing => "Composing",
            ChatState::Paused => "Paused",
            ChatState::Inactive => "Inactive",
            ChatState::Gone => "Gone",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Available,
    Chat,
    Away,
    ExtendedAway,
    DoNotDisturb,
    Unavailable,
}

impl Availability {
    pub fn is_online(&self) -> bool {
        !matches!(self, Availability::Unavailable)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Availability::Available => "Online",
            Availability::Chat => "Free for chat",
            Availability::Away => "Away",
            Availability::ExtendedAway => "Extended away",
            Availability::DoNotDisturb => "Do not disturb",
            Availability::Unavailable => "Offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub availability: Availability,
    pub status: Option<String>,
    pub priority: i8,
}

impl Presence {
    pub fn available() -> Self {
        Self {
            availability: Availability::Available,
            status: None,
            priority: 0,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            availability: Availability::Unavailable,
            status: None,
            priority: 0,
        }
    }

    /// "Away - at lunch", or just the availability label.
    pub fn status_text(&self) -> String {
        match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(status) => format!("{} - {}", self.availability.label(), status),
            None => self.availability.label().to_string(),
        }
    }
}

/// RFC 6121 subscription states. `Remove` only appears in roster pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Subscription {
    #[default]
    None,
    To,
    From,
    Both,
    Remove,
}

impl Subscription {
    pub fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("to") => Subscription::To,
            Some("from") => Subscription::From,
            Some("both") => Subscription::Both,
            Some("remove") => Subscription::Remove,
            _ => Subscription::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub address: Address,
    pub name: Option<String>,
    pub subscription: Subscription,
    /// Outgoing subscription request still pending
    pub ask: bool,
    pub groups: Vec<String>,
}

impl RosterEntry {
    pub fn new(address: Address) -> Self {
        Self {
            address: address.to_bare(),
            name: None,
            subscription: Subscription::Both,
            ask: false,
            groups: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn in_group(mut self, group: &str) -> Self {
        self.groups.push(group.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub from: Address,
    pub to: Option<Address>,
    pub body: Option<String>,
    /// XHTML-IM rendition of the body, when the sender provided one
    pub rich_body: Option<String>,
    pub state: Option<ChatState>,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
}

impl ChatMessage {
    pub fn incoming(from: Address, body: Option<&str>, state: Option<ChatState>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from,
            to: None,
            body: body.map(str::to_string),
            rich_body: None,
            state,
            timestamp: Utc::now(),
            direction: Direction::Incoming,
        }
    }

    pub fn has_body(&self) -> bool {
        self.body.as_deref().map_or(false, |b| !b.is_empty())
    }
}
