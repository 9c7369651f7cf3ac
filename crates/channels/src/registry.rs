use std::collections::HashMap;

use attendo_common::types::ChannelKind;

use crate::adapter::ChannelAdapter;

/// Registry of all loaded channel adapters, keyed by [`ChannelKind`].
///
/// The key being a closed enum means a conversation's channel always maps to
/// either a registered adapter or a definitive "channel not configured", never
/// to a typo.
pub struct AdapterRegistry {
    adapters: HashMap<ChannelKind, Box<dyn ChannelAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Box<dyn ChannelAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    #[must_use]
    pub fn get(&self, kind: ChannelKind) -> Option<&dyn ChannelAdapter> {
        self.adapters.get(&kind).map(|a| a.as_ref())
    }

    pub fn get_mut(&mut self, kind: ChannelKind) -> Option<&mut Box<dyn ChannelAdapter>> {
        self.adapters.get_mut(&kind)
    }

    #[must_use]
    pub fn list(&self) -> Vec<ChannelKind> {
        let mut kinds: Vec<ChannelKind> = self.adapters.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}
