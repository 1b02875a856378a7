// Session: the single control flow that owns the roster tree, presence
// store and conversations, and applies engine events, UI actions and timer
// firings one at a time.

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::address::{Address, AddressError};
use crate::conversation::{Conversation, ConversationConfig};
use crate::engine::{ClientState, EngineEvent, Transport};
use crate::models::{ChatMessage, ChatState};
use crate::presence::PresenceStore;
use crate::roster::{RosterTree, RosterView, TreeChange};
use crate::router::{ConversationRouter, OpenOutcome, RouteOutcome};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no open conversation with {0}")]
    NoConversation(Address),
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),
}

/// Things a front end may want to show after an event was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    ConnectionChanged(ClientState),
    MessageDelivered { conversation: Address, message: ChatMessage },
    RemoteStateChanged { conversation: Address, state: ChatState },
    UnreadArrived { from: Address },
}

pub struct Session<T: Transport> {
    account: Address,
    transport: T,
    tree: RosterTree,
    presence: PresenceStore,
    router: ConversationRouter,
    config: ConversationConfig,
    state: ClientState,
    tree_subscribers: Vec<mpsc::Sender<Vec<TreeChange>>>,
}

impl<T: Transport> Session<T> {
    pub fn new(account: Address, transport: T, config: ConversationConfig, hide_offline: bool) -> Self {
        let mut tree = RosterTree::new();
        tree.set_hide_offline(hide_offline);
        Self {
            account: account.to_bare(),
            transport,
            tree,
            presence: PresenceStore::new(),
            router: ConversationRouter::new(),
            config,
            state: ClientState::Connecting,
            tree_subscribers: Vec::new(),
        }
    }

    pub fn account(&self) -> &Address {
        &self.account
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn tree(&self) -> &RosterTree {
        &self.tree
    }

    pub fn view(&self) -> RosterView<'_> {
        RosterView::new(&self.tree)
    }

    pub fn presence(&self) -> &PresenceStore {
        &self.presence
    }

    pub fn router(&self) -> &ConversationRouter {
        &self.router
    }

    pub fn conversation(&self, address: &Address) -> Option<&Conversation> {
        self.router.get(address)
    }

    /// Receive every batch of tree changes from now on.
    pub fn subscribe_tree_changes(&mut self) -> mpsc::Receiver<Vec<TreeChange>> {
        let (tx, rx) = mpsc::channel(100);
        self.tree_subscribers.push(tx);
        rx
    }

    pub fn handle_event(&mut self, event: EngineEvent) -> Vec<Notice> {
        let mut notices = Vec::new();
        match event {
            EngineEvent::Connected { bound } => {
                info!("Session online as {}", bound);
                self.set_state(ClientState::Connected, &mut notices);
            }
            EngineEvent::Disconnected => {
                warn!("Engine disconnected, roster invalid until reloaded");
                self.invalidate();
                self.set_state(ClientState::Disconnected, &mut notices);
            }
            EngineEvent::Error(kind) => {
                error!("Engine failure: {:?}", kind);
                self.invalidate();
                self.set_state(ClientState::Error(kind), &mut notices);
            }
            EngineEvent::RosterLoaded(entries) => {
                self.tree.load_roster(&entries, &self.presence);
            }
            EngineEvent::RosterPushed(entry) => {
                self.tree.upsert_entry(&entry, &self.presence);
            }
            EngineEvent::PresenceChanged { from, presence } => {
                self.presence.update(&from, &presence);
                self.tree.apply_presence(&from, &presence);
            }
            EngineEvent::MessageReceived(message) => {
                self.route(message, &mut notices);
            }
        }
        self.publish_changes();
        notices
    }

    fn route(&mut self, message: ChatMessage, notices: &mut Vec<Notice>) {
        let from = message.from.clone();
        let state = message.state;
        let has_body = message.has_body();
        let delivered = has_body.then(|| message.clone());

        match self.router.route(message, &mut self.tree) {
            RouteOutcome::Delivered(conversation) => {
                if let Some(state) = state {
                    notices.push(Notice::RemoteStateChanged {
                        conversation: conversation.clone(),
                        state,
                    });
                }
                if let Some(message) = delivered {
                    notices.push(Notice::MessageDelivered { conversation, message });
                }
            }
            RouteOutcome::Buffered => notices.push(Notice::UnreadArrived { from }),
            RouteOutcome::Discarded => {}
        }
    }

    pub fn open(&mut self, address: &Address) -> OpenOutcome {
        let outcome = self.router.open(address, self.config, &mut self.tree);
        self.publish_changes();
        outcome
    }

    pub fn open_str(&mut self, address: &str) -> Result<OpenOutcome, SessionError> {
        let address = Address::parse(address)?;
        Ok(self.open(&address))
    }

    /// Open every conversation with unread mail.
    pub fn read_all(&mut self) -> Vec<OpenOutcome> {
        let outcomes = self.router.open_all_unread(self.config, &mut self.tree);
        self.publish_changes();
        outcomes
    }

    pub fn local_edit(&mut self, address: &Address, now: Instant) -> Result<Option<ChatState>, SessionError> {
        let conversation = self
            .router
            .get_mut(address)
            .ok_or_else(|| SessionError::NoConversation(address.clone()))?;
        Ok(conversation.local_edit(now, &self.presence, &self.transport))
    }

    pub fn send(
        &mut self,
        address: &Address,
        body: &str,
        rich_body: Option<&str>,
        now: Instant,
    ) -> Result<Option<ChatMessage>, SessionError> {
        let conversation = self
            .router
            .get_mut(address)
            .ok_or_else(|| SessionError::NoConversation(address.clone()))?;
        Ok(conversation
            .send(&self.account, body, rich_body, now, &self.presence, &self.transport)
            .cloned())
    }

    /// Close a conversation, returning its final local state.
    pub fn close(&mut self, address: &Address, now: Instant) -> Result<ChatState, SessionError> {
        let conversation = self
            .router
            .close(address, now, &self.presence, &self.transport)
            .ok_or_else(|| SessionError::NoConversation(address.clone()))?;
        Ok(conversation.local_state())
    }

    /// Close every conversation, announcing Gone where the peer is online.
    pub fn shutdown(&mut self, now: Instant) {
        for address in self.router.open_addresses() {
            self.router.close(&address, now, &self.presence, &self.transport);
        }
        info!("Session shut down");
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.router.next_deadline()
    }

    pub fn fire_timers(&mut self, now: Instant) -> Vec<(Address, ChatState)> {
        self.router.fire_timers(now, &self.presence, &self.transport)
    }

    pub fn set_hide_offline(&mut self, hide: bool) {
        self.tree.set_hide_offline(hide);
        self.publish_changes();
    }

    fn set_state(&mut self, state: ClientState, notices: &mut Vec<Notice>) {
        if self.state != state {
            self.state = state;
            notices.push(Notice::ConnectionChanged(state));
        }
    }

    fn invalidate(&mut self) {
        self.tree.clear();
        self.presence.clear();
    }

    fn publish_changes(&mut self) {
        let changes = self.tree.take_changes();
        if changes.is_empty() {
            return;
        }
        debug!("Publishing {} tree changes", changes.len());

        // Drop subscribers whose receiver went away
        self.tree_subscribers.retain(|tx| match tx.try_send(changes.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Tree change subscriber is full, batch dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}
