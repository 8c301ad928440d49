//! Unread message badge.
//!
//! [`UnreadTally`] is the synchronous core: it folds conversation snapshots
//! and pushed message events into one total and decides which fetch results
//! are still current. [`indicator::UnreadIndicator`] is the actor that drives
//! it from a poll timer and a push channel.

pub mod indicator;

use crate::constants::BADGE_CAP;
use crate::conversations::{Conversation, NewMessageEvent};
use std::collections::HashMap;

/// Sum of `unreadCount` over a snapshot. A missing count is zero.
pub fn total_unread(conversations: &[Conversation]) -> u64 {
    conversations
        .iter()
        .map(|c| u64::from(c.unread_count.unwrap_or(0)))
        .sum()
}

/// Badge text for a total: nothing for zero, the numeral up to the cap,
/// `"9+"` above it.
pub fn badge_label(total: u64) -> Option<String> {
    match total {
        0 => None,
        n if n <= BADGE_CAP => Some(n.to_string()),
        _ => Some(format!("{}+", BADGE_CAP)),
    }
}

/// Effective unread count of one conversation.
///
/// Equivalent to `max(polled, polled + pushed)`: pushes only ever add, so the
/// merged count never drops below what the last snapshot reported.
pub fn merge_counts(polled: u64, pushed: u64) -> u64 {
    polled.max(polled.saturating_add(pushed))
}

/// Where the indicator is in its fetch cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No viewer.
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The most recent settled fetch succeeded with this snapshot total.
    Ready(u64),
    /// The most recent settled fetch failed. Counts are kept.
    Error,
}

/// Marks one fetch. Sequence numbers only grow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    seq: u64,
}

impl Ticket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// What happened to a fetch result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The snapshot replaced the polled counts.
    Applied,
    /// The failure was recorded; counts are unchanged.
    Failed,
    /// The result was stale and ignored.
    Discarded,
}

#[derive(Clone, Debug)]
struct Pushed {
    /// `next_seq` when the event arrived. Snapshots from tickets at or above
    /// this were issued after the event and already include it.
    tag: u64,
    conversation_id: i32,
}

/// Merged unread state for a single viewer.
#[derive(Clone, Debug)]
pub struct UnreadTally {
    viewer: Option<i32>,
    phase: Phase,
    next_seq: u64,
    /// Tickets below this belong to a previous viewer.
    floor: u64,
    /// Highest ticket whose result was accepted, success or failure.
    last_settled: Option<u64>,
    loaded: bool,
    polled: HashMap<i32, u64>,
    /// Keyed by message id.
    pushed: HashMap<i32, Pushed>,
}

impl UnreadTally {
    pub fn new(viewer: Option<i32>) -> Self {
        Self {
            phase: if viewer.is_some() {
                Phase::Loading
            } else {
                Phase::Idle
            },
            viewer,
            next_seq: 0,
            floor: 0,
            last_settled: None,
            loaded: false,
            polled: HashMap::new(),
            pushed: HashMap::new(),
        }
    }

    pub fn viewer(&self) -> Option<i32> {
        self.viewer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether any snapshot has been applied for the current viewer.
    pub fn has_loaded(&self) -> bool {
        self.loaded
    }

    /// Switch identity. Every outstanding ticket becomes stale and all counts
    /// are dropped. Returns false when the viewer is unchanged.
    pub fn set_viewer(&mut self, viewer: Option<i32>) -> bool {
        if viewer == self.viewer {
            return false;
        }

        *self = Self {
            next_seq: self.next_seq,
            floor: self.next_seq,
            ..Self::new(viewer)
        };
        true
    }

    /// Issue a ticket for a new fetch. None while idle.
    pub fn begin_fetch(&mut self) -> Option<Ticket> {
        self.viewer?;

        let ticket = Ticket { seq: self.next_seq };
        self.next_seq += 1;
        self.phase = Phase::Loading;
        Some(ticket)
    }

    fn is_stale(&self, ticket: Ticket) -> bool {
        self.viewer.is_none()
            || ticket.seq < self.floor
            || ticket.seq >= self.next_seq
            || self.last_settled.map_or(false, |last| ticket.seq <= last)
    }

    /// Apply a successful fetch.
    pub fn apply_snapshot(&mut self, ticket: Ticket, conversations: &[Conversation]) -> Outcome {
        if self.is_stale(ticket) {
            return Outcome::Discarded;
        }

        self.polled = conversations
            .iter()
            .map(|c| (c.id, u64::from(c.unread_count.unwrap_or(0))))
            .collect();
        self.pushed.retain(|_, p| p.tag > ticket.seq);
        self.last_settled = Some(ticket.seq);
        self.loaded = true;
        self.phase = Phase::Ready(total_unread(conversations));

        Outcome::Applied
    }

    /// Record a failed fetch. Counts are left as they were.
    pub fn apply_failure(&mut self, ticket: Ticket) -> Outcome {
        if self.is_stale(ticket) {
            return Outcome::Discarded;
        }

        self.last_settled = Some(ticket.seq);
        self.phase = Phase::Error;
        Outcome::Failed
    }

    /// Count one pushed message. Ignored while idle, for the viewer's own
    /// messages, and for message ids already counted.
    pub fn push(&mut self, event: &NewMessageEvent) -> bool {
        match self.viewer {
            Some(viewer) if viewer != event.sender_id => {}
            _ => return false,
        }

        if self.pushed.contains_key(&event.message_id) {
            return false;
        }

        self.pushed.insert(
            event.message_id,
            Pushed {
                tag: self.next_seq,
                conversation_id: event.conversation_id,
            },
        );
        true
    }

    /// Effective unread count of one conversation.
    pub fn conversation_count(&self, conversation_id: i32) -> u64 {
        let polled = self.polled.get(&conversation_id).copied().unwrap_or(0);
        let pushed = self
            .pushed
            .values()
            .filter(|p| p.conversation_id == conversation_id)
            .count() as u64;

        merge_counts(polled, pushed)
    }

    /// Total across every conversation, polled or pushed.
    pub fn total(&self) -> u64 {
        let polled: u64 = self.polled.values().sum();
        merge_counts(polled, self.pushed.len() as u64)
    }

    /// Badge text. Nothing until the first snapshot lands, then per [`badge_label`].
    pub fn label(&self) -> Option<String> {
        if !self.loaded {
            return None;
        }
        badge_label(self.total())
    }
}
