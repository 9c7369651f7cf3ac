//! Shared engine runtime state handed to every request handler.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use {
    attendo_channels::{AdapterRegistry, ChannelAccountStore},
    attendo_conversations::ConversationManager,
    attendo_directory::BindingStore,
    attendo_dispatch::MessageDispatcher,
    attendo_events::EventBus,
    attendo_presence::{PresenceTracker, TypingTracker},
    attendo_widget::WidgetRegistry,
    tokio::sync::RwLock,
};

use crate::sink::EngineSink;

// ── Dedupe cache ────────────────────────────────────────────────────────────

struct DedupeEntry {
    inserted_at: Instant,
}

/// TTL-based idempotency cache for provider message ids.
///
/// Providers redeliver webhooks and long-poll batches after timeouts; a
/// replayed id within the TTL window must not append a second message.
pub struct DedupeCache {
    entries: HashMap<String, DedupeEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for DedupeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupeCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::from_millis(attendo_protocol::DEDUPE_TTL_MS),
            max_entries: attendo_protocol::DEDUPE_MAX_ENTRIES,
        }
    }

    /// Returns true if the key is a duplicate (already seen within TTL).
    pub fn check_and_insert(&mut self, key: &str) -> bool {
        self.evict_expired();
        if self.entries.contains_key(key) {
            return true;
        }
        if self.entries.len() >= self.max_entries
            && let Some(oldest_key) = self
                .entries
                .iter()
                .min_by_key(|(_, v)| v.inserted_at)
                .map(|(k, _)| k.clone())
        {
            self.entries.remove(&oldest_key);
        }
        self.entries.insert(key.to_string(), DedupeEntry {
            inserted_at: Instant::now(),
        });
        false
    }

    fn evict_expired(&mut self) {
        let cutoff = Instant::now() - self.ttl;
        self.entries.retain(|_, v| v.inserted_at > cutoff);
    }

    #[cfg(test)]
    fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries,
        }
    }
}

// ── Engine state ────────────────────────────────────────────────────────────

/// Everything the HTTP and WebSocket layers reach into, wrapped in one Arc.
pub struct EngineState {
    pub manager: Arc<ConversationManager>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub presence: Arc<PresenceTracker>,
    pub typing: Arc<TypingTracker>,
    pub bus: Arc<EventBus>,
    pub bindings: Arc<dyn BindingStore>,
    pub accounts: Arc<dyn ChannelAccountStore>,
    pub registry: Arc<RwLock<AdapterRegistry>>,
    pub widget: Arc<WidgetRegistry>,
    pub sink: Arc<EngineSink>,
    /// Server version string reported by `/health`.
    pub version: String,
}
