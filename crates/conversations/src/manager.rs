use std::sync::Arc;

use {
    async_trait::async_trait,
    attendo_common::{
        new_id, now_ms,
        types::{
            ChannelKind, ConversationStatus, DeliveryState, DeliveryStatus, ForwardTarget,
            MediaRef, Sender,
        },
    },
    attendo_directory::Directory,
    attendo_events::EventBus,
    attendo_protocol::EngineEvent,
    tokio::sync::RwLock,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    locks::ConversationLocks,
    model::{preview_of, Conversation, ConversationFilter, Message},
    store::{ConversationStore, MessageStore},
};

/// Invoked after a conversation commits its transition to `closed`. Runs on a
/// spawned task; the closing call does not wait for it.
#[async_trait]
pub trait CloseHook: Send + Sync {
    async fn conversation_closed(&self, conversation: Conversation);
}

/// Single mutating entry point for conversations and their messages.
///
/// Every mutation takes the per-conversation lock, re-reads state under it,
/// validates, commits with a version compare-and-set and only then publishes
/// events. Observers therefore never see an event for a write that lost.
pub struct ConversationManager {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    directory: Arc<dyn Directory>,
    bus: Arc<EventBus>,
    locks: ConversationLocks,
    close_hook: RwLock<Option<Arc<dyn CloseHook>>>,
}

impl ConversationManager {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        directory: Arc<dyn Directory>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            conversations,
            messages,
            directory,
            bus,
            locks: ConversationLocks::new(),
            close_hook: RwLock::new(None),
        }
    }

    /// Late-bind the close hook. The evaluation trigger registers itself here
    /// at startup; until then closes simply do not fire one.
    pub async fn set_close_hook(&self, hook: Arc<dyn CloseHook>) {
        *self.close_hook.write().await = Some(hook);
    }

    /// Drop per-conversation locks nobody holds. Called from the periodic
    /// tick task.
    pub fn sweep_locks(&self) {
        self.locks.sweep();
    }

    // ── Creation and ingest ─────────────────────────────────────────────

    /// Open a new conversation for a contact.
    pub async fn create(
        &self,
        tenant_id: &str,
        contact_id: &str,
        channel: ChannelKind,
        queue: Option<String>,
    ) -> Result<Conversation> {
        let conversation = Conversation::new(tenant_id, contact_id, channel, queue);
        self.conversations.insert(&conversation).await?;
        info!(
            tenant = tenant_id,
            conversation = %conversation.id,
            channel = %channel,
            "conversation created"
        );
        self.bus.publish(EngineEvent::ConversationCreated {
            tenant_id: conversation.tenant_id.clone(),
            conversation_id: conversation.id.clone(),
            channel: conversation.channel,
            contact_id: conversation.contact_id.clone(),
            status: conversation.status,
            queue: conversation.queue.clone(),
            version: conversation.version,
        });
        Ok(conversation)
    }

    /// Ingest an inbound contact message: append to the contact's latest
    /// conversation on this channel, or open a fresh one. A closed
    /// conversation reopens; the message is never dropped.
    pub async fn ingest_inbound(
        &self,
        tenant_id: &str,
        contact_id: &str,
        channel: ChannelKind,
        content: &str,
        media: Option<MediaRef>,
        provider_message_id: Option<&str>,
    ) -> Result<(Conversation, Message)> {
        // Serialize find-or-create per (tenant, contact, channel) so two
        // near-simultaneous first messages cannot open duplicate threads.
        let ingest_key = format!("inbound:{tenant_id}:{contact_id}:{channel}");
        let ingest_lock = self.locks.acquire(&ingest_key);
        let _ingest_guard = ingest_lock.lock().await;

        let conversation = match self
            .conversations
            .find_latest(tenant_id, contact_id, channel)
            .await?
        {
            Some(existing) => existing,
            None => self.create(tenant_id, contact_id, channel, None).await?,
        };

        self.append_inbound(tenant_id, &conversation.id, content, media, provider_message_id)
            .await
    }

    /// Append an inbound message to a known conversation, reopening it when
    /// closed.
    pub async fn append_inbound(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        content: &str,
        media: Option<MediaRef>,
        provider_message_id: Option<&str>,
    ) -> Result<(Conversation, Message)> {
        let lock = self.locks.acquire(conversation_id);
        let _guard = lock.lock().await;

        let mut conversation = self.load(tenant_id, conversation_id).await?;
        let now = now_ms();

        let message = self
            .messages
            .append(Message {
                id: new_id(),
                conversation_id: conversation.id.clone(),
                tenant_id: tenant_id.to_string(),
                sender: Sender::Contact,
                content: content.to_string(),
                media: media.clone(),
                delivery: None,
                provider_message_id: provider_message_id.map(str::to_string),
                seq: 0,
                created_at: now,
            })
            .await?;

        let expected = conversation.version;
        let reopened = conversation.status.is_closed();
        if reopened {
            conversation.status = ConversationStatus::Open;
            conversation.closed_at = None;
            debug!(conversation = conversation_id, "inbound activity reopened conversation");
        }
        conversation.last_message_preview = Some(preview_of(content, &media));
        conversation.updated_at = now;
        let conversation = self.conversations.update(&conversation, expected).await?;

        if reopened {
            self.bus.publish(updated_event(&conversation));
        }
        self.publish_appended(&conversation, &message);
        Ok((conversation, message))
    }

    /// Append an outbound message (agent or bot) in `sending` state. Status
    /// is untouched: agents may write into any conversation, including a
    /// closed one, without reopening it.
    pub async fn append_outbound(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        sender: Sender,
        content: &str,
        media: Option<MediaRef>,
    ) -> Result<(Conversation, Message)> {
        if !sender.is_outbound() {
            return Err(Error::message("outbound append requires an agent or bot sender"));
        }

        let lock = self.locks.acquire(conversation_id);
        let _guard = lock.lock().await;

        let mut conversation = self.load(tenant_id, conversation_id).await?;
        let now = now_ms();

        let message = self
            .messages
            .append(Message {
                id: new_id(),
                conversation_id: conversation.id.clone(),
                tenant_id: tenant_id.to_string(),
                sender,
                content: content.to_string(),
                media: media.clone(),
                delivery: Some(DeliveryState::sending()),
                provider_message_id: None,
                seq: 0,
                created_at: now,
            })
            .await?;

        let expected = conversation.version;
        conversation.last_message_preview = Some(preview_of(content, &media));
        conversation.updated_at = now;
        let conversation = self.conversations.update(&conversation, expected).await?;

        self.publish_appended(&conversation, &message);
        Ok((conversation, message))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Explicit status change. Closing commits `closed_at`, publishes
    /// `conversation_closed` and fires the close hook exactly once; a
    /// concurrent second close observes `AlreadyClosed` instead.
    pub async fn change_status(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        target: ConversationStatus,
    ) -> Result<Conversation> {
        let lock = self.locks.acquire(conversation_id);
        let _guard = lock.lock().await;

        let mut conversation = self.load(tenant_id, conversation_id).await?;
        if conversation.status.is_closed() {
            return Err(Error::AlreadyClosed {
                id: conversation_id.to_string(),
            });
        }
        if !conversation.status.can_transition_to(target) {
            return Err(Error::InvalidTransition {
                from: conversation.status,
                to: target,
            });
        }

        let expected = conversation.version;
        let from = conversation.status;
        conversation.status = target;
        conversation.updated_at = now_ms();
        if target.is_closed() {
            conversation.closed_at = Some(conversation.updated_at);
        }
        let conversation = self.conversations.update(&conversation, expected).await?;

        info!(
            tenant = tenant_id,
            conversation = conversation_id,
            %from,
            to = %target,
            "conversation status changed"
        );

        if target.is_closed() {
            self.bus.publish(EngineEvent::ConversationClosed {
                tenant_id: conversation.tenant_id.clone(),
                conversation_id: conversation.id.clone(),
                closed_at: conversation.closed_at.unwrap_or(conversation.updated_at),
                version: conversation.version,
            });
            self.fire_close_hook(conversation.clone()).await;
        } else {
            self.bus.publish(updated_event(&conversation));
        }
        Ok(conversation)
    }

    /// Explicit reopen of a closed conversation. Anything else is an invalid
    /// transition; inbound activity reopens on its own and does not come
    /// through here.
    pub async fn reopen(&self, tenant_id: &str, conversation_id: &str) -> Result<Conversation> {
        let lock = self.locks.acquire(conversation_id);
        let _guard = lock.lock().await;

        let mut conversation = self.load(tenant_id, conversation_id).await?;
        if !conversation.status.is_closed() {
            return Err(Error::InvalidTransition {
                from: conversation.status,
                to: ConversationStatus::Open,
            });
        }

        let expected = conversation.version;
        conversation.status = ConversationStatus::Open;
        conversation.closed_at = None;
        conversation.updated_at = now_ms();
        let conversation = self.conversations.update(&conversation, expected).await?;

        info!(tenant = tenant_id, conversation = conversation_id, "conversation reopened");
        self.bus.publish(updated_event(&conversation));
        Ok(conversation)
    }

    /// Hand the conversation to an agent, a queue, or back to the bot flow.
    /// Agent and queue assignment are mutually exclusive; the bot path also
    /// resets status and flow position so the automated flow starts fresh.
    pub async fn forward(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        target: &ForwardTarget,
    ) -> Result<Conversation> {
        let lock = self.locks.acquire(conversation_id);
        let _guard = lock.lock().await;

        let mut conversation = self.load(tenant_id, conversation_id).await?;
        if conversation.status.is_closed() {
            return Err(Error::AlreadyClosed {
                id: conversation_id.to_string(),
            });
        }

        match target {
            ForwardTarget::Agent { id } => {
                if self.directory.agent(tenant_id, id).await?.is_none() {
                    return Err(Error::CrossTenantViolation { target: id.clone() });
                }
                conversation.assigned_agent = Some(id.clone());
                conversation.queue = None;
            }
            ForwardTarget::Queue { id } => {
                if self.directory.queue(tenant_id, id).await?.is_none() {
                    return Err(Error::CrossTenantViolation { target: id.clone() });
                }
                conversation.queue = Some(id.clone());
                conversation.assigned_agent = None;
            }
            ForwardTarget::Bot => {
                conversation.assigned_agent = None;
                conversation.queue = None;
                conversation.status = ConversationStatus::Open;
                conversation.flow_step = None;
            }
        }

        let expected = conversation.version;
        conversation.updated_at = now_ms();
        let conversation = self.conversations.update(&conversation, expected).await?;

        info!(
            tenant = tenant_id,
            conversation = conversation_id,
            target = ?target,
            "conversation forwarded"
        );
        self.bus.publish(updated_event(&conversation));
        Ok(conversation)
    }

    // ── Delivery progress ───────────────────────────────────────────────

    /// Apply a delivery status change to an outbound message. Returns whether
    /// it advanced the state; duplicates, regressions and callbacks for
    /// terminal messages are no-ops.
    pub async fn record_delivery(
        &self,
        tenant_id: &str,
        message_id: &str,
        status: DeliveryStatus,
        error: Option<String>,
        provider_message_id: Option<&str>,
    ) -> Result<bool> {
        let located = self
            .messages
            .get(tenant_id, message_id)
            .await?
            .ok_or_else(|| Error::not_found(message_id))?;

        let lock = self.locks.acquire(&located.conversation_id);
        let _guard = lock.lock().await;

        // Re-read under the lock; a concurrent callback may have advanced it.
        let message = self
            .messages
            .get(tenant_id, message_id)
            .await?
            .ok_or_else(|| Error::not_found(message_id))?;
        let Some(current) = &message.delivery else {
            warn!(message = message_id, "delivery callback for inbound message ignored");
            return Ok(false);
        };

        if !current.status.can_advance_to(status) {
            debug!(
                message = message_id,
                from = %current.status,
                to = %status,
                "delivery callback ignored"
            );
            return Ok(false);
        }

        let next = DeliveryState { status, error };
        self.messages
            .set_delivery(tenant_id, message_id, &next, provider_message_id)
            .await?;

        self.bus.publish(EngineEvent::MessageStatusChanged {
            tenant_id: tenant_id.to_string(),
            conversation_id: message.conversation_id.clone(),
            message_id: message_id.to_string(),
            status,
            error: next.error,
        });
        Ok(true)
    }

    /// Apply a provider callback addressed by provider message id. Callbacks
    /// for ids we never sent are dropped.
    pub async fn record_delivery_by_provider_id(
        &self,
        tenant_id: &str,
        channel: ChannelKind,
        provider_message_id: &str,
        status: DeliveryStatus,
        error: Option<String>,
    ) -> Result<bool> {
        let Some(message) = self
            .messages
            .find_by_provider_id(tenant_id, channel, provider_message_id)
            .await?
        else {
            debug!(
                provider_message_id,
                %channel,
                "delivery callback for unknown message dropped"
            );
            return Ok(false);
        };
        self.record_delivery(tenant_id, &message.id, status, error, None)
            .await
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub async fn get(&self, tenant_id: &str, conversation_id: &str) -> Result<Option<Conversation>> {
        self.conversations.get(tenant_id, conversation_id).await
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>> {
        self.conversations.list(tenant_id, filter).await
    }

    pub async fn messages(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        limit: u32,
        before_seq: Option<i64>,
    ) -> Result<Vec<Message>> {
        self.messages
            .list(tenant_id, conversation_id, limit, before_seq)
            .await
    }

    pub async fn message(&self, tenant_id: &str, message_id: &str) -> Result<Option<Message>> {
        self.messages.get(tenant_id, message_id).await
    }

    /// Latest conversation for a contact on a channel.
    pub async fn find_active(
        &self,
        tenant_id: &str,
        contact_id: &str,
        channel: ChannelKind,
    ) -> Result<Option<Conversation>> {
        self.conversations
            .find_latest(tenant_id, contact_id, channel)
            .await
    }

    // ── Internals ───────────────────────────────────────────────────────

    async fn load(&self, tenant_id: &str, conversation_id: &str) -> Result<Conversation> {
        self.conversations
            .get(tenant_id, conversation_id)
            .await?
            .ok_or_else(|| Error::not_found(conversation_id))
    }

    fn publish_appended(&self, conversation: &Conversation, message: &Message) {
        self.bus.publish(EngineEvent::MessageAppended {
            tenant_id: message.tenant_id.clone(),
            conversation_id: conversation.id.clone(),
            message_id: message.id.clone(),
            sender: message.sender.clone(),
            preview: message.preview(),
            has_media: message.media.is_some(),
            created_at: message.created_at,
        });
    }

    async fn fire_close_hook(&self, conversation: Conversation) {
        let hook = self.close_hook.read().await.clone();
        if let Some(hook) = hook {
            tokio::spawn(async move {
                hook.conversation_closed(conversation).await;
            });
        }
    }
}

fn updated_event(conversation: &Conversation) -> EngineEvent {
    EngineEvent::ConversationUpdated {
        tenant_id: conversation.tenant_id.clone(),
        conversation_id: conversation.id.clone(),
        status: conversation.status,
        assigned_agent: conversation.assigned_agent.clone(),
        queue: conversation.queue.clone(),
        priority: conversation.priority,
        version: conversation.version,
    }
}
