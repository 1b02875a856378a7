// Common test utilities for integration tests
// Logger setup, a transport that records instead of sending, and roster fixtures.
#![allow(dead_code)]

use std::cell::RefCell;
use std::sync::Once;

use log::LevelFilter;

use parley::models::{Availability, ChatMessage, ChatState, Presence, RosterEntry};
use parley::{Address, Transport};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    State { to: Address, state: ChatState },
    Message { to: Address, body: String },
}

/// Stub engine: records every submission.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: RefCell<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.borrow().clone()
    }

    pub fn states(&self) -> Vec<ChatState> {
        self.sent
            .borrow()
            .iter()
            .filter_map(|s| match s {
                Sent::State { state, .. } => Some(*state),
                Sent::Message { .. } => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.borrow_mut().clear();
    }
}

impl Transport for RecordingTransport {
    fn send_state_notification(&self, to: &Address, state: ChatState) {
        self.sent.borrow_mut().push(Sent::State { to: to.clone(), state });
    }

    fn send_message(&self, to: &Address, body: &str, _rich_body: Option<&str>) {
        self.sent.borrow_mut().push(Sent::Message {
            to: to.clone(),
            body: body.to_string(),
        });
    }
}

pub fn addr(s: &str) -> Address {
    Address::parse(s).unwrap()
}

pub fn available(priority: i8) -> Presence {
    Presence {
        availability: Availability::Available,
        status: None,
        priority,
    }
}

pub fn unavailable() -> Presence {
    Presence::unavailable()
}

pub fn incoming(from: &str, body: &str) -> ChatMessage {
    ChatMessage::incoming(addr(from), Some(body), Some(ChatState::Active))
}

pub fn state_only(from: &str, state: ChatState) -> ChatMessage {
    ChatMessage::incoming(addr(from), None, Some(state))
}

/// Alice in Friends, Bob in Friends and Work, Carol ungrouped with a
/// pending subscription request.
pub fn sample_roster() -> Vec<RosterEntry> {
    let mut carol = RosterEntry::new(addr("carol@example.org")).named("Carol");
    carol.subscription = parley::models::Subscription::None;
    carol.ask = true;

    vec![
        RosterEntry::new(addr("alice@example.org")).named("Alice").in_group("Friends"),
        RosterEntry::new(addr("bob@example.org"))
            .named("Bob")
            .in_group("Friends")
            .in_group("Work"),
        carol,
    ]
}
