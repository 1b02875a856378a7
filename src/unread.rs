// Messages that arrived while no conversation was open for the sender.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::address::Address;
use crate::models::ChatMessage;

/// Result of draining buffered messages for one address.
#[derive(Debug, Default)]
pub struct Drained {
    /// In receipt order
    pub messages: Vec<ChatMessage>,
    /// The aggregator as a whole became empty with this take
    pub cleared: bool,
}

#[derive(Debug, Default)]
pub struct UnreadAggregator {
    // bare address -> messages in receipt order; the sender's resource is in `from`
    entries: BTreeMap<String, Vec<ChatMessage>>,
}

// A full-address take sees its own resource plus messages from the bare address
fn matches_scope(message: &ChatMessage, address: &Address) -> bool {
    match address.resource() {
        None => true,
        Some(resource) => message.from.resource().map_or(true, |r| r == resource),
    }
}

impl UnreadAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a message. Pure state notifications are not kept.
    pub fn add(&mut self, message: ChatMessage) -> bool {
        if !message.has_body() {
            return false;
        }
        debug!("Buffering unread message from {}", message.from);
        self.entries
            .entry(message.from.bare_str().to_string())
            .or_default()
            .push(message);
        true
    }

    /// Remove and return the buffered messages for an address.
    pub fn take(&mut self, address: &Address) -> Drained {
        let bare = address.bare_str();
        let Some(entry) = self.entries.get_mut(bare) else {
            return Drained::default();
        };

        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(entry)
            .into_iter()
            .partition(|m| matches_scope(m, address));
        if kept.is_empty() {
            self.entries.remove(bare);
        } else {
            *entry = kept;
        }

        let cleared = !taken.is_empty() && self.entries.is_empty();
        if !taken.is_empty() {
            info!("Drained {} unread messages for {}", taken.len(), address);
        }
        Drained { messages: taken, cleared }
    }

    pub fn has_unread(&self, address: &Address) -> bool {
        self.unread_count(address) > 0
    }

    pub fn unread_count(&self, address: &Address) -> usize {
        self.entries
            .get(address.bare_str())
            .map_or(0, |messages| messages.iter().filter(|m| matches_scope(m, address)).count())
    }

    pub fn has_any_unread(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn total_unread(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Bare addresses with unread mail, sorted.
    pub fn bare_addresses_with_unread(&self) -> Vec<Address> {
        self.entries
            .keys()
            .filter_map(|bare| Address::parse(bare).ok())
            .collect()
    }
}
