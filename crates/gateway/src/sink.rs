//! Inbound side of the engine: everything adapters push lands here.
//!
//! One pipeline serves all entry points (long-poll adapters, webhooks, widget
//! sockets): dedupe on provider message id, resolve the contact binding,
//! append through the conversation manager. Fire-and-forget callers go
//! through the [`InboundSink`] trait; HTTP handlers call [`EngineSink::ingest`]
//! and [`EngineSink::apply_delivery`] directly to get a response body back.

use std::sync::{Arc, Mutex};

use {
    async_trait::async_trait,
    attendo_channels::{
        AdapterRegistry, ChannelAccountStore, DeliveryUpdate, InboundMessage, InboundSink,
    },
    attendo_common::types::ChannelKind,
    attendo_conversations::{Conversation, ConversationManager, Message},
    attendo_directory::BindingStore,
    tokio::sync::RwLock,
    tracing::{debug, error, warn},
};

use crate::{
    error::ApiResult,
    state::DedupeCache,
};

pub struct EngineSink {
    manager: Arc<ConversationManager>,
    bindings: Arc<dyn BindingStore>,
    accounts: Arc<dyn ChannelAccountStore>,
    registry: Arc<RwLock<AdapterRegistry>>,
    dedupe: Mutex<DedupeCache>,
}

impl EngineSink {
    #[must_use]
    pub fn new(
        manager: Arc<ConversationManager>,
        bindings: Arc<dyn BindingStore>,
        accounts: Arc<dyn ChannelAccountStore>,
        registry: Arc<RwLock<AdapterRegistry>>,
    ) -> Self {
        Self {
            manager,
            bindings,
            accounts,
            registry,
            dedupe: Mutex::new(DedupeCache::new()),
        }
    }

    /// Run one inbound message through the full ingest pipeline. Returns
    /// `None` when the provider message id was already seen.
    pub async fn ingest(
        &self,
        inbound: InboundMessage,
    ) -> ApiResult<Option<(Conversation, Message)>> {
        if let Some(provider_message_id) = inbound.provider_message_id.as_deref() {
            let key = format!(
                "{}:{}:{provider_message_id}",
                inbound.channel, inbound.account_id
            );
            let duplicate = self
                .dedupe
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .check_and_insert(&key);
            if duplicate {
                debug!(
                    channel = %inbound.channel,
                    provider_message_id,
                    "duplicate inbound message dropped"
                );
                return Ok(None);
            }
        }

        let contact_id = self
            .bindings
            .ensure_binding(
                &inbound.tenant_id,
                inbound.channel,
                &inbound.address,
                inbound.sender_name.as_deref(),
            )
            .await?;

        let (conversation, message) = self
            .manager
            .ingest_inbound(
                &inbound.tenant_id,
                &contact_id,
                inbound.channel,
                &inbound.content,
                inbound.media,
                inbound.provider_message_id.as_deref(),
            )
            .await?;
        Ok(Some((conversation, message)))
    }

    /// Apply a provider delivery callback. Returns whether the delivery state
    /// advanced.
    pub async fn apply_delivery(&self, update: DeliveryUpdate) -> ApiResult<bool> {
        let account = self
            .accounts
            .get(update.channel, &update.account_id)
            .await?
            .ok_or_else(|| attendo_channels::Error::unknown_account(&update.account_id))?;

        let advanced = self
            .manager
            .record_delivery_by_provider_id(
                &account.tenant_id,
                update.channel,
                &update.provider_message_id,
                update.status,
                update.error,
            )
            .await?;
        Ok(advanced)
    }
}

#[async_trait]
impl InboundSink for EngineSink {
    async fn inbound_message(&self, inbound: InboundMessage) {
        let channel = inbound.channel;
        if let Err(e) = self.ingest(inbound).await {
            warn!(%channel, error = %e, "inbound message ingest failed");
        }
    }

    async fn delivery_update(&self, update: DeliveryUpdate) {
        let provider_message_id = update.provider_message_id.clone();
        match self.apply_delivery(update).await {
            Ok(advanced) => {
                debug!(provider_message_id, advanced, "delivery callback applied");
            }
            Err(e) => warn!(provider_message_id, error = %e, "delivery callback dropped"),
        }
    }

    async fn account_failed(&self, channel: ChannelKind, account_id: &str, reason: &str) {
        error!(%channel, account_id, reason, "channel account failed, disabling");
        if let Err(e) = self.accounts.set_enabled(channel, account_id, false).await {
            warn!(account_id, error = %e, "could not disable failed account");
        }
        let mut registry = self.registry.write().await;
        if let Some(adapter) = registry.get_mut(channel) {
            if let Err(e) = adapter.stop_account(account_id).await {
                warn!(account_id, error = %e, "could not stop failed account");
            }
        }
    }
}
