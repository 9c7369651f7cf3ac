use std::{collections::HashMap, sync::RwLock};

use {tokio::sync::mpsc, tracing::debug};

use attendo_channels::{Error, Result};

use crate::frames::WidgetFrame;

struct Session {
    account_id: String,
    sender: mpsc::UnboundedSender<WidgetFrame>,
}

/// Connected widget sessions, keyed by session id. The session id doubles as
/// the provider address stored in contact bindings.
#[derive(Default)]
pub struct WidgetRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl WidgetRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and hand back the frame stream to forward into its
    /// socket. Reconnecting under the same id replaces the previous
    /// registration and closes its stream.
    pub fn register(
        &self,
        account_id: &str,
        session_id: &str,
    ) -> mpsc::UnboundedReceiver<WidgetFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(
            session_id.to_string(),
            Session {
                account_id: account_id.to_string(),
                sender: tx,
            },
        );
        debug!(session_id, account_id, "widget session registered");
        rx
    }

    pub fn unregister(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if sessions.remove(session_id).is_some() {
            debug!(session_id, "widget session unregistered");
        }
    }

    /// Push a frame to a session. Fails when the session never connected or
    /// its socket is gone; dead entries are dropped on the spot.
    pub fn push(&self, session_id: &str, frame: WidgetFrame) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let Some(session) = sessions.get(session_id) else {
            return Err(offline(session_id));
        };
        if session.sender.send(frame).is_err() {
            sessions.remove(session_id);
            return Err(offline(session_id));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .is_some_and(|s| !s.sender.is_closed())
    }

    /// Live sessions on one account.
    #[must_use]
    pub fn session_count(&self, account_id: &str) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .values()
            .filter(|s| s.account_id == account_id && !s.sender.is_closed())
            .count()
    }

    /// Drop every session of an account, closing their frame streams.
    pub fn drop_account(&self, account_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|_, s| s.account_id != account_id);
    }
}

fn offline(session_id: &str) -> Error {
    Error::transport(format!("widget session {session_id} is offline"))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str) -> WidgetFrame {
        WidgetFrame::Message {
            provider_message_id: id.into(),
            content: "hello".into(),
            media: None,
            sent_at: 1,
        }
    }

    #[test]
    fn push_reaches_the_registered_session() {
        let registry = WidgetRegistry::new();
        let mut rx = registry.register("web-1", "sess-1");

        registry.push("sess-1", frame("m1")).unwrap();

        assert_eq!(rx.try_recv().unwrap(), frame("m1"));
        assert!(registry.is_connected("sess-1"));
    }

    #[test]
    fn push_to_a_missing_session_fails() {
        let registry = WidgetRegistry::new();
        let err = registry.push("nope", frame("m1")).unwrap_err();
        assert!(err.delivery_reason().contains("offline"));
    }

    #[test]
    fn dead_sessions_are_dropped_on_push() {
        let registry = WidgetRegistry::new();
        let rx = registry.register("web-1", "sess-1");
        drop(rx);

        assert!(registry.push("sess-1", frame("m1")).is_err());
        assert!(!registry.is_connected("sess-1"));
        assert_eq!(registry.session_count("web-1"), 0);
    }

    #[test]
    fn reconnect_replaces_the_stream() {
        let registry = WidgetRegistry::new();
        let mut old = registry.register("web-1", "sess-1");
        let mut new = registry.register("web-1", "sess-1");

        registry.push("sess-1", frame("m1")).unwrap();

        assert!(old.try_recv().is_err());
        assert_eq!(new.try_recv().unwrap(), frame("m1"));
        assert_eq!(registry.session_count("web-1"), 1);
    }

    #[test]
    fn drop_account_closes_streams() {
        let registry = WidgetRegistry::new();
        let rx_a = registry.register("web-1", "sess-a");
        let rx_b = registry.register("web-1", "sess-b");
        let mut rx_other = registry.register("web-2", "sess-c");

        registry.drop_account("web-1");

        assert_eq!(registry.session_count("web-1"), 0);
        assert!(registry.push("sess-a", frame("m1")).is_err());
        registry.push("sess-c", frame("m2")).unwrap();
        assert_eq!(rx_other.try_recv().unwrap(), frame("m2"));
        drop((rx_a, rx_b));
    }

    #[test]
    fn unregister_forgets_the_session() {
        let registry = WidgetRegistry::new();
        let _rx = registry.register("web-1", "sess-1");

        registry.unregister("sess-1");

        assert!(!registry.is_connected("sess-1"));
        assert!(registry.push("sess-1", frame("m1")).is_err());
    }
}
