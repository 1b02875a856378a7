// An open conversation: local chat-state machine, the peer's last announced
// state and the message history shown in the window.

use chrono::Utc;
use log::{debug, info};
use tokio::time::Instant;

use crate::address::Address;
use crate::chat_state::{ActivityEvent, ChatActivity, ChatStateTimeouts, TimerKind};
use crate::engine::{PresenceQuery, Transport};
use crate::models::{ChatMessage, ChatState, Direction};

/// Per-conversation settings, handed over when the conversation opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationConfig {
    /// Enter sends the message instead of inserting a newline
    pub enter_sends: bool,
    pub timeouts: ChatStateTimeouts,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            enter_sends: true,
            timeouts: ChatStateTimeouts::default(),
        }
    }
}

#[derive(Debug)]
pub struct Conversation {
    peer: Address,
    activity: ChatActivity,
    remote_state: ChatState,
    history: Vec<ChatMessage>,
    config: ConversationConfig,
}

impl Conversation {
    pub fn new(peer: Address, config: ConversationConfig) -> Self {
        Self {
            peer,
            activity: ChatActivity::new(config.timeouts),
            remote_state: ChatState::None,
            history: Vec::new(),
            config,
        }
    }

    pub fn peer(&self) -> &Address {
        &self.peer
    }

    pub fn local_state(&self) -> ChatState {
        self.activity.state()
    }

    pub fn remote_state(&self) -> ChatState {
        self.remote_state
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn next_deadline(&self) -> Option<(Instant, TimerKind)> {
        self.activity.next_deadline()
    }

    /// Inbound handler: track the peer's state and keep any body.
    pub fn receive(&mut self, message: ChatMessage) {
        if let Some(state) = message.state {
            if state != self.remote_state {
                debug!("{} is now {}", self.peer, state.label());
            }
            self.remote_state = state;
        }
        if message.has_body() {
            self.history.push(message);
        }
    }

    pub fn local_edit(&mut self, now: Instant, presence: &dyn PresenceQuery, transport: &dyn Transport) -> Option<ChatState> {
        self.drive(ActivityEvent::Edit, now, presence, transport)
    }

    /// Send a message from the local account to the peer. The local state
    /// returns to Active either way; a blank body puts nothing on the wire
    /// besides that state.
    pub fn send(
        &mut self,
        account: &Address,
        body: &str,
        rich_body: Option<&str>,
        now: Instant,
        presence: &dyn PresenceQuery,
        transport: &dyn Transport,
    ) -> Option<&ChatMessage> {
        if body.trim().is_empty() {
            self.drive(ActivityEvent::Send, now, presence, transport);
            return None;
        }

        transport.send_message(&self.peer, body, rich_body);
        self.history.push(ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            from: account.clone(),
            to: Some(self.peer.clone()),
            body: Some(body.to_string()),
            rich_body: rich_body.map(str::to_string),
            state: Some(ChatState::Active),
            timestamp: Utc::now(),
            direction: Direction::Outgoing,
        });
        self.drive(ActivityEvent::Send, now, presence, transport);
        self.history.last()
    }

    pub fn fire_timers(&mut self, now: Instant, presence: &dyn PresenceQuery, transport: &dyn Transport) -> Vec<ChatState> {
        let entered = self.activity.fire_due(now);
        for state in &entered {
            self.announce(*state, presence, transport);
        }
        entered
    }

    /// Closing announces Gone unless it was already announced; no timer
    /// fires afterwards.
    pub fn close(&mut self, now: Instant, presence: &dyn PresenceQuery, transport: &dyn Transport) -> Option<ChatState> {
        info!("Closing conversation with {}", self.peer);
        self.drive(ActivityEvent::Close, now, presence, transport)
    }

    fn drive(
        &mut self,
        event: ActivityEvent,
        now: Instant,
        presence: &dyn PresenceQuery,
        transport: &dyn Transport,
    ) -> Option<ChatState> {
        let changed = self.activity.handle(event, now)?;
        self.announce(changed, presence, transport);
        Some(changed)
    }

    // Notifications only go to a peer that is there to receive them
    fn announce(&self, state: ChatState, presence: &dyn PresenceQuery, transport: &dyn Transport) -> bool {
        let live = match self.peer.resource() {
            None => !presence.resources_online(self.peer.bare_str()).is_empty(),
            Some(_) => presence.is_resource_online(&self.peer),
        };
        if !live {
            debug!("Not sending {} to {}: no online resource", state.label(), self.peer);
            return false;
        }
        transport.send_state_notification(&self.peer, state);
        true
    }
}
