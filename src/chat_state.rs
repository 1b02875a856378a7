// XEP-0085: Chat State Notifications, local side
// https://xmpp.org/extensions/xep-0085.html
//
// One ChatActivity per open conversation. Timers are plain deadlines owned
// by the machine, so dropping the machine cancels them.

use log::debug;
use tokio::time::{Duration, Instant};

use crate::models::ChatState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatStateTimeouts {
    pub paused: Duration,
    pub inactive: Duration,
    pub gone: Duration,
}

impl Default for ChatStateTimeouts {
    fn default() -> Self {
        Self {
            paused: Duration::from_secs(30),
            inactive: Duration::from_secs(120),
            gone: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    Paused,
    Inactive,
    Gone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    /// The user changed the text being composed
    Edit,
    TimerFired(TimerKind),
    /// The user sent a message
    Send,
    /// The conversation window closed
    Close,
}

#[derive(Debug)]
pub struct ChatActivity {
    state: ChatState,
    timeouts: ChatStateTimeouts,
    paused_at: Option<Instant>,
    inactive_at: Option<Instant>,
    gone_at: Option<Instant>,
    closed: bool,
}

impl ChatActivity {
    pub fn new(timeouts: ChatStateTimeouts) -> Self {
        Self {
            state: ChatState::Active,
            timeouts,
            paused_at: None,
            inactive_at: None,
            gone_at: None,
            closed: false,
        }
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Apply one event. Returns the new local state when it changed.
    pub fn handle(&mut self, event: ActivityEvent, now: Instant) -> Option<ChatState> {
        if self.closed {
            return None;
        }

        let target = match event {
            ActivityEvent::Edit => {
                self.restart_timers(now);
                ChatState::Composing
            }
            ActivityEvent::TimerFired(kind) => {
                self.clear_timer(kind);
                match kind {
                    TimerKind::Paused if matches!(self.state, ChatState::Composing | ChatState::Paused) => {
                        ChatState::Paused
                    }
                    TimerKind::Paused => return None,
                    TimerKind::Inactive => ChatState::Inactive,
                    TimerKind::Gone => ChatState::Gone,
                }
            }
            ActivityEvent::Send => {
                self.cancel_timers();
                ChatState::Active
            }
            ActivityEvent::Close => {
                self.cancel_timers();
                self.closed = true;
                ChatState::Gone
            }
        };

        if self.state == target {
            return None;
        }
        debug!("Local chat state {:?} -> {:?} on {:?}", self.state, target, event);
        self.state = target;
        Some(target)
    }

    /// Earliest pending timer.
    pub fn next_deadline(&self) -> Option<(Instant, TimerKind)> {
        self.pending_timers().into_iter().next()
    }

    /// Fire every timer whose deadline has passed, earliest first.
    /// Returns the states entered along the way.
    pub fn fire_due(&mut self, now: Instant) -> Vec<ChatState> {
        let due: Vec<TimerKind> = self
            .pending_timers()
            .into_iter()
            .filter(|(deadline, _)| *deadline <= now)
            .map(|(_, kind)| kind)
            .collect();

        due.into_iter()
            .filter_map(|kind| self.handle(ActivityEvent::TimerFired(kind), now))
            .collect()
    }

    fn pending_timers(&self) -> Vec<(Instant, TimerKind)> {
        let mut timers: Vec<(Instant, TimerKind)> = [
            (self.paused_at, TimerKind::Paused),
            (self.inactive_at, TimerKind::Inactive),
            (self.gone_at, TimerKind::Gone),
        ]
        .into_iter()
        .filter_map(|(deadline, kind)| deadline.map(|d| (d, kind)))
        .collect();
        timers.sort();
        timers
    }

    fn restart_timers(&mut self, now: Instant) {
        self.paused_at = Some(now + self.timeouts.paused);
        self.inactive_at = Some(now + self.timeouts.inactive);
        self.gone_at = Some(now + self.timeouts.gone);
    }

    fn clear_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Paused => self.paused_at = None,
            TimerKind::Inactive => self.inactive_at = None,
            TimerKind::Gone => self.gone_at = None,
        }
    }

    fn cancel_timers(&mut self) {
        self.paused_at = None;
        self.inactive_at = None;
        self.gone_at = None;
    }
}
