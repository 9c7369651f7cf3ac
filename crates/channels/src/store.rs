use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use attendo_common::types::ChannelKind;

use crate::error::Result;

/// A persisted channel account configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChannelAccount {
    pub channel: ChannelKind,
    pub account_id: String,
    pub tenant_id: String,
    /// Adapter-specific config blob (tokens, endpoints).
    pub config: serde_json::Value,
    pub enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Persistent storage for channel accounts. The gateway starts every enabled
/// account at boot.
#[async_trait]
pub trait ChannelAccountStore: Send + Sync {
    async fn list(&self) -> Result<Vec<StoredChannelAccount>>;
    async fn list_enabled(&self) -> Result<Vec<StoredChannelAccount>>;
    async fn get(
        &self,
        channel: ChannelKind,
        account_id: &str,
    ) -> Result<Option<StoredChannelAccount>>;
    /// The enabled account serving a tenant on a channel. Outbound dispatch
    /// goes through this account.
    async fn find_for_tenant(
        &self,
        tenant_id: &str,
        channel: ChannelKind,
    ) -> Result<Option<StoredChannelAccount>>;
    async fn upsert(&self, account: StoredChannelAccount) -> Result<()>;
    async fn set_enabled(
        &self,
        channel: ChannelKind,
        account_id: &str,
        enabled: bool,
    ) -> Result<()>;
    async fn delete(&self, channel: ChannelKind, account_id: &str) -> Result<()>;
}
