// Routes inbound messages to open conversations or the unread buffer.

use std::collections::HashMap;

use log::{debug, info};
use tokio::time::Instant;

use crate::address::Address;
use crate::conversation::{Conversation, ConversationConfig};
use crate::engine::{PresenceQuery, Transport};
use crate::models::{ChatMessage, ChatState};
use crate::roster::RosterTree;
use crate::unread::UnreadAggregator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the conversation opened for this address
    Delivered(Address),
    /// Buffered as unread for the sender
    Buffered,
    /// State-only message with nowhere to go
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOutcome {
    pub address: Address,
    pub created: bool,
    /// Unread messages moved into the conversation
    pub drained: usize,
    /// No unread mail is left anywhere
    pub unread_cleared: bool,
}

#[derive(Debug, Default)]
pub struct ConversationRouter {
    conversations: HashMap<Address, Conversation>,
    unread: UnreadAggregator,
}

impl ConversationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unread(&self) -> &UnreadAggregator {
        &self.unread
    }

    pub fn get(&self, address: &Address) -> Option<&Conversation> {
        self.conversations.get(address)
    }

    pub fn get_mut(&mut self, address: &Address) -> Option<&mut Conversation> {
        self.conversations.get_mut(address)
    }

    pub fn is_open(&self, address: &Address) -> bool {
        self.conversations.contains_key(address)
    }

    pub fn open_addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.conversations.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// The open conversation a message from `from` belongs to: the exact
    /// address first, then its bare identity.
    pub fn resolve(&self, from: &Address) -> Option<Address> {
        if self.conversations.contains_key(from) {
            return Some(from.clone());
        }
        let bare = from.to_bare();
        self.conversations.contains_key(&bare).then_some(bare)
    }

    pub fn route(&mut self, message: ChatMessage, tree: &mut RosterTree) -> RouteOutcome {
        if let Some(target) = self.resolve(&message.from) {
            if let Some(conversation) = self.conversations.get_mut(&target) {
                conversation.receive(message);
                return RouteOutcome::Delivered(target);
            }
        }

        if !message.has_body() {
            debug!("Discarding state-only message from {}: no conversation", message.from);
            return RouteOutcome::Discarded;
        }

        let bare = message.from.bare_str().to_string();
        let resource = message.from.resource().map(str::to_string);
        self.unread.add(message);
        tree.mark_unread(&bare, resource.as_deref());
        RouteOutcome::Buffered
    }

    /// Open (or return) the conversation for an address, moving any unread
    /// messages into it and clearing the roster badge.
    pub fn open(&mut self, address: &Address, config: ConversationConfig, tree: &mut RosterTree) -> OpenOutcome {
        if self.conversations.contains_key(address) {
            return OpenOutcome {
                address: address.clone(),
                created: false,
                drained: 0,
                unread_cleared: false,
            };
        }

        let mut conversation = Conversation::new(address.clone(), config);
        let drained = self.unread.take(address);
        let count = drained.messages.len();
        for message in drained.messages {
            conversation.receive(message);
        }
        tree.mark_read(address.bare_str(), address.resource());
        self.conversations.insert(address.clone(), conversation);
        info!("Opened conversation with {} ({} unread)", address, count);

        OpenOutcome {
            address: address.clone(),
            created: true,
            drained: count,
            unread_cleared: drained.cleared,
        }
    }

    /// Open a conversation for every bare address with unread mail.
    pub fn open_all_unread(&mut self, config: ConversationConfig, tree: &mut RosterTree) -> Vec<OpenOutcome> {
        self.unread
            .bare_addresses_with_unread()
            .into_iter()
            .map(|address| self.open(&address, config, tree))
            .collect()
    }

    /// Close a conversation. Its timers go with it.
    pub fn close(
        &mut self,
        address: &Address,
        now: Instant,
        presence: &dyn PresenceQuery,
        transport: &dyn Transport,
    ) -> Option<Conversation> {
        let mut conversation = self.conversations.remove(address)?;
        conversation.close(now, presence, transport);
        Some(conversation)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.conversations
            .values()
            .filter_map(|c| c.next_deadline().map(|(deadline, _)| deadline))
            .min()
    }

    /// Fire due timers in every conversation.
    pub fn fire_timers(
        &mut self,
        now: Instant,
        presence: &dyn PresenceQuery,
        transport: &dyn Transport,
    ) -> Vec<(Address, ChatState)> {
        let mut fired = Vec::new();
        for (address, conversation) in self.conversations.iter_mut() {
            for state in conversation.fire_timers(now, presence, transport) {
                fired.push((address.clone(), state));
            }
        }
        fired.sort_by(|a, b| a.0.cmp(&b.0));
        fired
    }
}
