use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Per-conversation critical sections.
///
/// Every mutation of a conversation or its messages runs while holding the
/// lock for that conversation id, so status checks, seq assignment and
/// version bumps cannot interleave. Locks are created on first use and
/// swept once nobody holds them.
#[derive(Default)]
pub struct ConversationLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for a key. Callers keep the `Arc` alive for as long as
    /// they hold the guard.
    #[must_use]
    pub fn acquire(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.lock();
        Arc::clone(
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Drop lock entries nobody currently holds.
    pub fn sweep(&self) {
        self.lock().retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
