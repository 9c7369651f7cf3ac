use async_trait::async_trait;

use attendo_common::types::{ChannelKind, DeliveryState};

use crate::{
    error::Result,
    model::{Conversation, ConversationFilter, Message},
};

/// Persistence for conversations.
///
/// `update` is a compare-and-set on `version`: the write commits only when
/// the stored version still equals `expected_version`, and bumps it by one.
/// A miss is a conflict, never a silent lost update.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn insert(&self, conversation: &Conversation) -> Result<()>;

    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<Conversation>>;

    /// Persist `conversation` if the stored row is still at
    /// `expected_version`. Returns the row as committed (version bumped).
    async fn update(
        &self,
        conversation: &Conversation,
        expected_version: i64,
    ) -> Result<Conversation>;

    /// Most recent conversation for a contact on a channel, regardless of
    /// status. Inbound ingest appends here instead of opening a duplicate.
    async fn find_latest(
        &self,
        tenant_id: &str,
        contact_id: &str,
        channel: ChannelKind,
    ) -> Result<Option<Conversation>>;

    async fn list(
        &self,
        tenant_id: &str,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>>;
}

/// Persistence for messages. `append` assigns the per-conversation `seq`;
/// callers must hold the conversation lock so assignment cannot race.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert the message, assigning the next `seq` in its conversation.
    /// Returns the message with `seq` filled in.
    async fn append(&self, message: Message) -> Result<Message>;

    async fn get(&self, tenant_id: &str, message_id: &str) -> Result<Option<Message>>;

    /// Newest messages first, up to `limit`; `before_seq` pages backwards.
    async fn list(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        limit: u32,
        before_seq: Option<i64>,
    ) -> Result<Vec<Message>>;

    async fn set_delivery(
        &self,
        tenant_id: &str,
        message_id: &str,
        delivery: &DeliveryState,
        provider_message_id: Option<&str>,
    ) -> Result<()>;

    /// Find an outbound message by the id the provider knows it under, for
    /// ingesting delivery callbacks.
    async fn find_by_provider_id(
        &self,
        tenant_id: &str,
        channel: ChannelKind,
        provider_message_id: &str,
    ) -> Result<Option<Message>>;
}
