//! In-process event bus feeding realtime observers.
//!
//! Every engine mutation publishes one typed [`EngineEvent`]; the bus stamps
//! it with a globally monotonic `seq`, keeps a bounded replay ring for
//! reconnecting clients, and fans it out to matching subscribers over
//! unbounded channels so publishers never block on a slow consumer.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use {
    attendo_common::now_ms,
    attendo_protocol::{EngineEvent, EventFrame, EVENT_REPLAY_CAPACITY},
    tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    tracing::debug,
};

// ── Filters ──────────────────────────────────────────────────────────────────

/// What a subscriber wants to see. Empty filter means everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events for this tenant.
    pub tenant_id: Option<String>,
    /// Only events scoped to this conversation. Presence events carry no
    /// conversation and never match a conversation filter.
    pub conversation_id: Option<String>,
}

impl EventFilter {
    #[must_use]
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            conversation_id: None,
        }
    }

    #[must_use]
    pub fn conversation(tenant_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            conversation_id: Some(conversation_id.into()),
        }
    }

    #[must_use]
    pub fn matches(&self, event: &EngineEvent) -> bool {
        if let Some(tenant) = &self.tenant_id {
            if event.tenant_id() != tenant {
                return false;
            }
        }
        if let Some(conversation) = &self.conversation_id {
            match event.conversation_key() {
                Some(key) if key == conversation => {}
                _ => return false,
            }
        }
        true
    }
}

// ── Bus ──────────────────────────────────────────────────────────────────────

struct Subscriber {
    filter: EventFilter,
    tx: UnboundedSender<EventFrame>,
}

struct BusInner {
    seq: u64,
    next_subscription: u64,
    subscribers: HashMap<u64, Subscriber>,
    ring: VecDeque<EventFrame>,
}

/// Fan-out hub for [`EngineEvent`]s.
///
/// `publish` assigns `seq`, records the frame in the replay ring and delivers
/// it to every matching subscriber in one critical section, so any two frames
/// reach every subscriber in the same order. Subscribers whose receiver is
/// gone are pruned on the spot.
pub struct EventBus {
    inner: Mutex<BusInner>,
    replay_capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_REPLAY_CAPACITY)
    }
}

impl EventBus {
    #[must_use]
    pub fn new(replay_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                seq: 0,
                next_subscription: 0,
                subscribers: HashMap::new(),
                ring: VecDeque::with_capacity(replay_capacity),
            }),
            replay_capacity,
        }
    }

    /// Publish an event. Returns the assigned `seq`.
    pub fn publish(&self, event: EngineEvent) -> u64 {
        let kind = event.kind();
        let mut inner = self.lock();
        inner.seq += 1;
        let frame = EventFrame::new(inner.seq, now_ms(), event);

        if inner.ring.len() == self.replay_capacity {
            inner.ring.pop_front();
        }
        inner.ring.push_back(frame.clone());

        let before = inner.subscribers.len();
        inner.subscribers.retain(|_, sub| {
            if !sub.filter.matches(&frame.event) {
                return true;
            }
            sub.tx.send(frame.clone()).is_ok()
        });
        let dropped = before - inner.subscribers.len();
        if dropped > 0 {
            debug!(kind, dropped, "pruned closed event subscribers");
        }
        frame.seq
    }

    /// Register a subscriber. Returns its id (for [`EventBus::unsubscribe`])
    /// and the receiving end of its frame stream.
    pub fn subscribe(&self, filter: EventFilter) -> (u64, UnboundedReceiver<EventFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        inner.next_subscription += 1;
        let id = inner.next_subscription;
        inner.subscribers.insert(id, Subscriber { filter, tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.lock().subscribers.remove(&id);
    }

    /// Frames published after `since_seq` that are still in the replay ring,
    /// oldest first. A client that reconnects with its last seen seq gets the
    /// gap without a full state reload; frames older than the ring are gone.
    #[must_use]
    pub fn replay_since(&self, since_seq: u64) -> Vec<EventFrame> {
        self.lock()
            .ring
            .iter()
            .filter(|frame| frame.seq > since_seq)
            .cloned()
            .collect()
    }

    /// Highest seq assigned so far.
    #[must_use]
    pub fn current_seq(&self) -> u64 {
        self.lock().seq
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        // Nothing inside the critical section panics.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
