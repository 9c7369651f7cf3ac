//! Agent presence and typing indicators.
//!
//! Both trackers are in-memory only: presence is rebuilt from heartbeats
//! after a restart, and typing entries live for a few seconds anyway. Writes
//! are last-writer-wins; there is no vector-clock arbitration between
//! concurrent heartbeats.

use std::{sync::Arc, time::Duration};

use {
    attendo_common::{now_ms, types::PresenceStatus},
    attendo_events::EventBus,
    attendo_protocol::EngineEvent,
    dashmap::DashMap,
    tracing::debug,
};

// ── Presence ────────────────────────────────────────────────────────────────

fn agent_key(tenant_id: &str, agent_id: &str) -> (String, String) {
    (tenant_id.to_string(), agent_id.to_string())
}

/// One agent's advertised availability.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PresenceRecord {
    pub tenant_id: String,
    pub agent_id: String,
    pub online: bool,
    pub status: PresenceStatus,
    pub updated_at: i64,
}

/// Live map of agent availability, fed by heartbeats from agent sessions.
pub struct PresenceTracker {
    bus: Arc<EventBus>,
    records: DashMap<(String, String), PresenceRecord>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            records: DashMap::new(),
        }
    }

    /// Mark an agent online with the given status. Overwrites whatever was
    /// there; the freshest heartbeat wins.
    pub fn heartbeat(
        &self,
        tenant_id: &str,
        agent_id: &str,
        status: PresenceStatus,
    ) -> PresenceRecord {
        let record = PresenceRecord {
            tenant_id: tenant_id.to_string(),
            agent_id: agent_id.to_string(),
            online: true,
            status,
            updated_at: now_ms(),
        };
        self.records
            .insert(agent_key(tenant_id, agent_id), record.clone());
        self.publish(&record);
        record
    }

    /// Mark an agent offline, keeping their last status for display.
    pub fn disconnect(&self, tenant_id: &str, agent_id: &str) -> PresenceRecord {
        let key = agent_key(tenant_id, agent_id);
        let mut record = self.records.get(&key).map(|r| r.clone()).unwrap_or(
            PresenceRecord {
                tenant_id: tenant_id.to_string(),
                agent_id: agent_id.to_string(),
                online: false,
                status: PresenceStatus::default(),
                updated_at: 0,
            },
        );
        record.online = false;
        record.updated_at = now_ms();
        self.records.insert(key, record.clone());
        self.publish(&record);
        record
    }

    #[must_use]
    pub fn get(&self, tenant_id: &str, agent_id: &str) -> Option<PresenceRecord> {
        self.records
            .get(&agent_key(tenant_id, agent_id))
            .map(|r| r.clone())
    }

    /// Snapshot of every agent seen for a tenant, ordered by agent id.
    #[must_use]
    pub fn list(&self, tenant_id: &str) -> Vec<PresenceRecord> {
        let mut records: Vec<PresenceRecord> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == tenant_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        records
    }

    fn publish(&self, record: &PresenceRecord) {
        self.bus.publish(EngineEvent::PresenceChanged {
            tenant_id: record.tenant_id.clone(),
            agent_id: record.agent_id.clone(),
            online: record.online,
            status: record.status,
            updated_at: record.updated_at,
        });
    }
}

// ── Typing ──────────────────────────────────────────────────────────────────

/// Short-lived typing indicators, keyed by (tenant, scope, agent) where the
/// scope is usually a conversation id.
///
/// There is no stop-typing signal anywhere in the wire protocol: an entry is
/// active until its TTL runs out, and clients are expected to re-signal while
/// the agent keeps typing.
pub struct TypingTracker {
    bus: Arc<EventBus>,
    ttl: Duration,
    entries: DashMap<(String, String, String), i64>,
}

impl TypingTracker {
    #[must_use]
    pub fn new(bus: Arc<EventBus>, ttl: Duration) -> Self {
        Self {
            bus,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Record that an agent is typing in a scope and broadcast it with its
    /// expiry time.
    pub fn set_typing(&self, tenant_id: &str, scope: &str, agent_id: &str) -> i64 {
        let expires_at = now_ms() + self.ttl.as_millis() as i64;
        self.entries.insert(
            (
                tenant_id.to_string(),
                scope.to_string(),
                agent_id.to_string(),
            ),
            expires_at,
        );
        self.bus.publish(EngineEvent::TypingSignal {
            tenant_id: tenant_id.to_string(),
            scope: scope.to_string(),
            agent_id: agent_id.to_string(),
            expires_at,
        });
        expires_at
    }

    /// Agents currently typing in a scope, ordered by agent id.
    #[must_use]
    pub fn active_typists(&self, tenant_id: &str, scope: &str) -> Vec<String> {
        let now = now_ms();
        let mut agents: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| {
                let (tenant, entry_scope, _) = entry.key();
                tenant == tenant_id && entry_scope == scope && *entry.value() > now
            })
            .map(|entry| entry.key().2.clone())
            .collect();
        agents.sort();
        agents
    }

    /// Drop expired entries. Called from the periodic tick task.
    pub fn sweep(&self) {
        let now = now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(dropped, "swept expired typing entries");
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use attendo_events::EventFilter;

    use super::*;

    fn bus() -> Arc<EventBus> {
        Arc::new(EventBus::default())
    }

    #[test]
    fn heartbeat_is_last_writer_wins() {
        let tracker = PresenceTracker::new(bus());

        tracker.heartbeat("t1", "ag-1", PresenceStatus::Available);
        tracker.heartbeat("t1", "ag-1", PresenceStatus::Busy);

        let record = tracker.get("t1", "ag-1").unwrap();
        assert!(record.online);
        assert_eq!(record.status, PresenceStatus::Busy);
    }

    #[test]
    fn disconnect_keeps_last_status() {
        let tracker = PresenceTracker::new(bus());

        tracker.heartbeat("t1", "ag-1", PresenceStatus::Away);
        let record = tracker.disconnect("t1", "ag-1");
        assert!(!record.online);
        assert_eq!(record.status, PresenceStatus::Away);
    }

    #[test]
    fn list_is_tenant_scoped_and_sorted() {
        let tracker = PresenceTracker::new(bus());

        tracker.heartbeat("t1", "zoe", PresenceStatus::Available);
        tracker.heartbeat("t1", "ana", PresenceStatus::Available);
        tracker.heartbeat("t2", "bob", PresenceStatus::Available);

        let agents: Vec<String> = tracker
            .list("t1")
            .into_iter()
            .map(|r| r.agent_id)
            .collect();
        assert_eq!(agents, vec!["ana", "zoe"]);
    }

    #[tokio::test]
    async fn presence_changes_are_published() {
        let bus = bus();
        let (_, mut rx) = bus.subscribe(EventFilter::tenant("t1"));
        let tracker = PresenceTracker::new(Arc::clone(&bus));

        tracker.heartbeat("t1", "ag-1", PresenceStatus::Available);
        tracker.disconnect("t1", "ag-1");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event.kind(), "presence_changed");
        let second = rx.recv().await.unwrap();
        match second.event {
            EngineEvent::PresenceChanged { online, .. } => assert!(!online),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn typing_expires_by_ttl() {
        let tracker = TypingTracker::new(bus(), Duration::from_millis(40));

        tracker.set_typing("t1", "conv-1", "ag-1");
        assert_eq!(tracker.active_typists("t1", "conv-1"), vec!["ag-1"]);
        assert!(tracker.active_typists("t1", "conv-2").is_empty());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(tracker.active_typists("t1", "conv-1").is_empty());

        assert_eq!(tracker.len(), 1);
        tracker.sweep();
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn typing_signal_carries_expiry() {
        let bus = bus();
        let (_, mut rx) = bus.subscribe(EventFilter::conversation("t1", "conv-1"));
        let tracker = TypingTracker::new(Arc::clone(&bus), Duration::from_secs(5));

        let expires_at = tracker.set_typing("t1", "conv-1", "ag-1");

        let frame = rx.recv().await.unwrap();
        match frame.event {
            EngineEvent::TypingSignal {
                expires_at: wire, ..
            } => assert_eq!(wire, expires_at),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
