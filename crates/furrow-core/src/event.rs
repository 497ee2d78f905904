//! Typed observer registration for session-level world events.
//!
//! Events are emitted while a peer session processes messages, day changes,
//! and chunk loading, then delivered in one batch at the end of the update
//! with [`EventBus::deliver`]. At most `capacity` events wait for delivery;
//! past that the oldest are dropped and counted.
//!
//! [`EventBus::subscribe`] returns a [`SubscriptionId`] that can later be
//! passed to [`EventBus::unsubscribe`]. Subscribers run in
//! `(priority, registration order)` order and may carry a filter predicate.

use crate::coord::ChunkCoord;
use crate::id::{PeerId, SubscriptionId};
use slotmap::SlotMap;
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Something that happened to the shared world or the session around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    // -- Time --
    DayChanged { day: u32 },

    // -- Session --
    PeerJoined { peer: PeerId },
    PeerLeft { peer: PeerId },
    AuthorityChanged { authority: Option<PeerId> },
    SyncCompleted { chunk_count: u32 },

    // -- Loading --
    ChunkActivated { chunk: ChunkCoord },
    ChunkDeactivated { chunk: ChunkCoord },
}

/// Which variant a [`WorldEvent`] is; subscriptions are per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DayChanged,
    PeerJoined,
    PeerLeft,
    AuthorityChanged,
    SyncCompleted,
    ChunkActivated,
    ChunkDeactivated,
}

impl WorldEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorldEvent::DayChanged { .. } => EventKind::DayChanged,
            WorldEvent::PeerJoined { .. } => EventKind::PeerJoined,
            WorldEvent::PeerLeft { .. } => EventKind::PeerLeft,
            WorldEvent::AuthorityChanged { .. } => EventKind::AuthorityChanged,
            WorldEvent::SyncCompleted { .. } => EventKind::SyncCompleted,
            WorldEvent::ChunkActivated { .. } => EventKind::ChunkActivated,
            WorldEvent::ChunkDeactivated { .. } => EventKind::ChunkDeactivated,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// Receives events read-only.
pub type Listener = Box<dyn FnMut(&WorldEvent)>;

/// Optional predicate that filters events for a subscriber.
pub type EventFilter = Box<dyn Fn(&WorldEvent) -> bool>;

/// Priority level for subscribers. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubscriberPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct SubscriberEntry {
    kind: EventKind,
    priority: SubscriberPriority,
    filter: Option<EventFilter>,
    listener: Listener,
    insertion_order: u64,
}

impl std::fmt::Debug for SubscriberEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberEntry")
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("filtered", &self.filter.is_some())
            .field("insertion_order", &self.insertion_order)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Buffers world events and fans them out to subscribers on delivery.
#[derive(Debug)]
pub struct EventBus {
    pending: VecDeque<WorldEvent>,
    capacity: usize,
    dropped: u64,
    subscribers: SlotMap<SubscriptionId, SubscriberEntry>,
    next_insertion_order: u64,
}

impl EventBus {
    /// Create a bus that holds at most `capacity` undelivered events
    /// (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
            subscribers: SlotMap::with_key(),
            next_insertion_order: 0,
        }
    }

    /// Buffer an event for the next delivery, evicting the oldest one when
    /// the buffer is full.
    pub fn emit(&mut self, event: WorldEvent) {
        if self.pending.len() == self.capacity {
            self.pending.pop_front();
            self.dropped += 1;
        }
        self.pending.push_back(event);
    }

    /// Subscribe with `Normal` priority and no filter.
    pub fn subscribe(&mut self, kind: EventKind, listener: Listener) -> SubscriptionId {
        self.subscribe_filtered(kind, SubscriberPriority::Normal, None, listener)
    }

    pub fn subscribe_filtered(
        &mut self,
        kind: EventKind,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        listener: Listener,
    ) -> SubscriptionId {
        let insertion_order = self.next_insertion_order;
        self.next_insertion_order += 1;
        self.subscribers.insert(SubscriberEntry {
            kind,
            priority,
            filter,
            listener,
            insertion_order,
        })
    }

    /// Remove a subscription. Returns `false` if it was already removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver every buffered event, oldest first. For each event, the
    /// subscribers of its kind run in `(priority, registration order)`
    /// order, skipping those whose filter rejects it.
    pub fn deliver(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let events: Vec<WorldEvent> = self.pending.drain(..).collect();

        let mut order: Vec<(SubscriberPriority, u64, SubscriptionId)> = self
            .subscribers
            .iter()
            .map(|(id, entry)| (entry.priority, entry.insertion_order, id))
            .collect();
        order.sort();

        for event in &events {
            let kind = event.kind();
            for &(_, _, id) in &order {
                let Some(entry) = self.subscribers.get_mut(id) else {
                    continue;
                };
                if entry.kind != kind {
                    continue;
                }
                if let Some(filter) = &entry.filter
                    && !filter(event)
                {
                    continue;
                }
                (entry.listener)(event);
            }
        }
    }

    /// Events waiting for delivery.
    pub fn buffered_count(&self) -> usize {
        self.pending.len()
    }

    /// Events evicted before they could be delivered.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Drop undelivered events. Subscribers stay.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
