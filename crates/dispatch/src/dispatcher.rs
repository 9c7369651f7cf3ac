use std::sync::Arc;

use {
    attendo_channels::{
        AdapterRegistry, ChannelAccountStore, DeleteOutcome, DeliveryOutcome, OutboundMessage,
    },
    attendo_common::types::{ChannelKind, DeliveryStatus, MediaRef, Sender},
    attendo_conversations::{Conversation, ConversationManager, Message},
    attendo_directory::{BindingStore, Directory},
    tokio::sync::RwLock,
    tracing::{debug, info, warn},
};

use crate::{
    error::Result,
    policy::DeliveryPolicy,
};

/// Delivery failure reason recorded when the contact has no binding on the
/// conversation's channel. Not retryable by the engine; the remediation is
/// inbound activity from the contact.
pub const ADDRESS_UNRESOLVED: &str = "address unresolved";

/// Drives outbound messages through channel adapters.
///
/// The caller gets the persisted message back in `sending` state as soon as
/// it is durable; the provider call happens on a spawned task and lands as a
/// `sent` or `failed` delivery update. Delivery receipts beyond `sent` arrive
/// through provider callbacks, not from here.
pub struct MessageDispatcher {
    manager: Arc<ConversationManager>,
    bindings: Arc<dyn BindingStore>,
    directory: Arc<dyn Directory>,
    accounts: Arc<dyn ChannelAccountStore>,
    registry: Arc<RwLock<AdapterRegistry>>,
    policy: DeliveryPolicy,
}

impl MessageDispatcher {
    pub fn new(
        manager: Arc<ConversationManager>,
        bindings: Arc<dyn BindingStore>,
        directory: Arc<dyn Directory>,
        accounts: Arc<dyn ChannelAccountStore>,
        registry: Arc<RwLock<AdapterRegistry>>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            manager,
            bindings,
            directory,
            accounts,
            registry,
            policy,
        }
    }

    /// Persist and dispatch one outbound message.
    pub async fn send_outbound(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        sender: Sender,
        content: &str,
        media: Option<MediaRef>,
    ) -> Result<Message> {
        let content = self.compose_content(tenant_id, &sender, content).await?;
        let (conversation, message) = self
            .manager
            .append_outbound(tenant_id, conversation_id, sender, &content, media)
            .await?;

        let task = DeliveryTask {
            manager: Arc::clone(&self.manager),
            bindings: Arc::clone(&self.bindings),
            accounts: Arc::clone(&self.accounts),
            registry: Arc::clone(&self.registry),
            policy: self.policy.clone(),
        };
        let spawned_message = message.clone();
        tokio::spawn(async move {
            task.deliver(conversation, spawned_message).await;
        });

        Ok(message)
    }

    /// Best-effort remote retraction of an already-sent message.
    pub async fn delete_message(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<DeleteOutcome> {
        let message = self
            .manager
            .message(tenant_id, message_id)
            .await?
            .filter(|m| m.conversation_id == conversation_id)
            .ok_or_else(|| attendo_conversations::Error::not_found(message_id))?;
        let conversation = self
            .manager
            .get(tenant_id, conversation_id)
            .await?
            .ok_or_else(|| attendo_conversations::Error::not_found(conversation_id))?;

        // Without a provider id the message never reached the provider, so
        // there is nothing to retract remotely.
        let Some(provider_message_id) = message.provider_message_id.as_deref() else {
            return Ok(DeleteOutcome::Unsupported);
        };
        let Some(binding) = self
            .bindings
            .resolve_contact(tenant_id, &conversation.contact_id, conversation.channel)
            .await?
        else {
            return Ok(DeleteOutcome::Unsupported);
        };
        let Some(account) = self
            .accounts
            .find_for_tenant(tenant_id, conversation.channel)
            .await?
        else {
            return Ok(DeleteOutcome::Unsupported);
        };

        let registry = self.registry.read().await;
        let Some(outbound) = registry.get(conversation.channel).and_then(|a| a.outbound()) else {
            return Ok(DeleteOutcome::Unsupported);
        };
        let outcome = outbound
            .delete_message(&account.account_id, &binding.address, provider_message_id)
            .await?;
        info!(
            tenant = tenant_id,
            message = message_id,
            ?outcome,
            "remote delete attempted"
        );
        Ok(outcome)
    }

    /// Surface an agent typing indicator on the contact's channel. Purely
    /// best effort; any gap (no binding, no adapter) is silently skipped.
    pub async fn notify_typing(&self, tenant_id: &str, conversation_id: &str) -> Result<()> {
        let Some(conversation) = self.manager.get(tenant_id, conversation_id).await? else {
            return Ok(());
        };
        let Some(binding) = self
            .bindings
            .resolve_contact(tenant_id, &conversation.contact_id, conversation.channel)
            .await?
        else {
            return Ok(());
        };
        let Some(account) = self
            .accounts
            .find_for_tenant(tenant_id, conversation.channel)
            .await?
        else {
            return Ok(());
        };

        let registry = self.registry.read().await;
        if let Some(outbound) = registry.get(conversation.channel).and_then(|a| a.outbound()) {
            if let Err(err) = outbound
                .send_typing(&account.account_id, &binding.address)
                .await
            {
                debug!(tenant = tenant_id, conversation = conversation_id, %err, "typing indicator failed");
            }
        }
        Ok(())
    }

    /// Signature policy: agent messages get the tenant's signature appended
    /// when enabled; bot and survey traffic goes out untouched.
    async fn compose_content(
        &self,
        tenant_id: &str,
        sender: &Sender,
        content: &str,
    ) -> Result<String> {
        let Sender::Agent { id } = sender else {
            return Ok(content.to_string());
        };
        let settings = self.directory.tenant_settings(tenant_id).await?;
        if !settings.signature.enabled {
            return Ok(content.to_string());
        }
        let display_name = match self.directory.agent(tenant_id, id).await? {
            Some(agent) => agent.display_name,
            None => id.clone(),
        };
        Ok(settings.signature.apply(content, &display_name))
    }
}

// ── Delivery task ───────────────────────────────────────────────────────────

struct DeliveryTask {
    manager: Arc<ConversationManager>,
    bindings: Arc<dyn BindingStore>,
    accounts: Arc<dyn ChannelAccountStore>,
    registry: Arc<RwLock<AdapterRegistry>>,
    policy: DeliveryPolicy,
}

impl DeliveryTask {
    async fn deliver(&self, conversation: Conversation, message: Message) {
        let tenant_id = conversation.tenant_id.clone();

        let binding = match self
            .bindings
            .resolve_contact(&tenant_id, &conversation.contact_id, conversation.channel)
            .await
        {
            Ok(Some(binding)) => binding,
            Ok(None) => {
                self.fail(&tenant_id, &message.id, ADDRESS_UNRESOLVED.to_string())
                    .await;
                return;
            }
            Err(err) => {
                self.fail(&tenant_id, &message.id, format!("address lookup failed: {err}"))
                    .await;
                return;
            }
        };

        let account = match self
            .accounts
            .find_for_tenant(&tenant_id, conversation.channel)
            .await
        {
            Ok(Some(account)) => account,
            Ok(None) => {
                self.fail(
                    &tenant_id,
                    &message.id,
                    format!("no {} account configured", conversation.channel),
                )
                .await;
                return;
            }
            Err(err) => {
                self.fail(&tenant_id, &message.id, format!("account lookup failed: {err}"))
                    .await;
                return;
            }
        };

        let outbound_message = OutboundMessage {
            account_id: account.account_id,
            address: binding.address,
            content: message.content.clone(),
            media: message.media.clone(),
        };

        match self
            .send_with_retry(conversation.channel, &outbound_message)
            .await
        {
            Ok(outcome) => {
                info!(
                    tenant = %tenant_id,
                    message = %message.id,
                    channel = %conversation.channel,
                    "outbound message accepted by provider"
                );
                self.record(
                    &tenant_id,
                    &message.id,
                    DeliveryStatus::Sent,
                    None,
                    outcome.provider_message_id.as_deref(),
                )
                .await;
            }
            Err(reason) => self.fail(&tenant_id, &message.id, reason).await,
        }
    }

    async fn send_with_retry(
        &self,
        channel: ChannelKind,
        outbound_message: &OutboundMessage,
    ) -> std::result::Result<DeliveryOutcome, String> {
        let attempts = self.policy.retry.attempts();
        let mut backoff = self.policy.retry.backoff;

        for attempt in 1..=attempts {
            match self.try_once(channel, outbound_message).await {
                Ok(outcome) => return Ok(outcome),
                Err((reason, transient)) => {
                    if !transient || attempt == attempts {
                        return Err(reason);
                    }
                    debug!(
                        %channel,
                        attempt,
                        reason,
                        "transient send failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
        Err("send attempts exhausted".to_string())
    }

    async fn try_once(
        &self,
        channel: ChannelKind,
        outbound_message: &OutboundMessage,
    ) -> std::result::Result<DeliveryOutcome, (String, bool)> {
        let registry = self.registry.read().await;
        let Some(adapter) = registry.get(channel) else {
            return Err((format!("no {channel} adapter running"), false));
        };
        let Some(outbound) = adapter.outbound() else {
            return Err((format!("{channel} adapter cannot send"), false));
        };

        match tokio::time::timeout(self.policy.send_timeout, outbound.send(outbound_message)).await
        {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => Err((err.delivery_reason(), err.is_transient())),
            Err(_) => Err((
                format!("send timed out after {}ms", self.policy.send_timeout.as_millis()),
                true,
            )),
        }
    }

    async fn fail(&self, tenant_id: &str, message_id: &str, reason: String) {
        warn!(tenant = tenant_id, message = message_id, reason, "outbound delivery failed");
        self.record(tenant_id, message_id, DeliveryStatus::Failed, Some(reason), None)
            .await;
    }

    async fn record(
        &self,
        tenant_id: &str,
        message_id: &str,
        status: DeliveryStatus,
        error: Option<String>,
        provider_message_id: Option<&str>,
    ) {
        if let Err(err) = self
            .manager
            .record_delivery(tenant_id, message_id, status, error, provider_message_id)
            .await
        {
            warn!(message = message_id, %err, "failed to record delivery state");
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use {
        async_trait::async_trait,
        attendo_channels::{
            ChannelAdapter, ChannelOutbound, ChannelStatus, StoredChannelAccount,
        },
        attendo_directory::{Agent, SqliteBindingStore, SqliteDirectory, TenantSettings},
        attendo_events::{EventBus, EventFilter},
        attendo_protocol::EngineEvent,
        sqlx::sqlite::{SqlitePool, SqlitePoolOptions},
    };

    use crate::policy::RetryPolicy;

    use super::*;

    #[derive(Clone)]
    enum Scripted {
        Accept(Option<String>),
        Transport(String),
        BadAddress,
        Hang,
    }

    struct ScriptedOutbound {
        calls: Arc<AtomicUsize>,
        script: Mutex<VecDeque<Scripted>>,
    }

    #[async_trait]
    impl ChannelOutbound for ScriptedOutbound {
        async fn send(
            &self,
            outbound: &OutboundMessage,
        ) -> attendo_channels::Result<DeliveryOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Scripted::Accept(Some("prov-1".into())));
            match step {
                Scripted::Accept(id) => Ok(DeliveryOutcome {
                    provider_message_id: id,
                }),
                Scripted::Transport(reason) => Err(attendo_channels::Error::transport(reason)),
                Scripted::BadAddress => Err(attendo_channels::Error::invalid_address(
                    ChannelKind::Telegram,
                    outbound.address.clone(),
                )),
                Scripted::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(DeliveryOutcome::default())
                }
            }
        }

        async fn delete_message(
            &self,
            _account_id: &str,
            _address: &str,
            _provider_message_id: &str,
        ) -> attendo_channels::Result<DeleteOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DeleteOutcome::Deleted)
        }
    }

    struct ScriptedAdapter {
        outbound: ScriptedOutbound,
    }

    #[async_trait]
    impl ChannelAdapter for ScriptedAdapter {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Telegram
        }

        fn name(&self) -> &str {
            "scripted"
        }

        async fn start_account(
            &mut self,
            _account_id: &str,
            _config: serde_json::Value,
        ) -> attendo_channels::Result<()> {
            Ok(())
        }

        async fn stop_account(&mut self, _account_id: &str) -> attendo_channels::Result<()> {
            Ok(())
        }

        fn outbound(&self) -> Option<&dyn ChannelOutbound> {
            Some(&self.outbound)
        }

        fn status(&self) -> Option<&dyn ChannelStatus> {
            None
        }
    }

    struct OneAccount;

    #[async_trait]
    impl ChannelAccountStore for OneAccount {
        async fn list(&self) -> attendo_channels::Result<Vec<StoredChannelAccount>> {
            Ok(vec![])
        }

        async fn list_enabled(&self) -> attendo_channels::Result<Vec<StoredChannelAccount>> {
            Ok(vec![])
        }

        async fn get(
            &self,
            _channel: ChannelKind,
            _account_id: &str,
        ) -> attendo_channels::Result<Option<StoredChannelAccount>> {
            Ok(None)
        }

        async fn find_for_tenant(
            &self,
            tenant_id: &str,
            channel: ChannelKind,
        ) -> attendo_channels::Result<Option<StoredChannelAccount>> {
            if tenant_id == "t1" && channel == ChannelKind::Telegram {
                Ok(Some(StoredChannelAccount {
                    channel,
                    account_id: "tg-main".into(),
                    tenant_id: tenant_id.into(),
                    config: serde_json::json!({}),
                    enabled: true,
                    created_at: 0,
                    updated_at: 0,
                }))
            } else {
                Ok(None)
            }
        }

        async fn upsert(&self, _account: StoredChannelAccount) -> attendo_channels::Result<()> {
            Ok(())
        }

        async fn set_enabled(
            &self,
            _channel: ChannelKind,
            _account_id: &str,
            _enabled: bool,
        ) -> attendo_channels::Result<()> {
            Ok(())
        }

        async fn delete(
            &self,
            _channel: ChannelKind,
            _account_id: &str,
        ) -> attendo_channels::Result<()> {
            Ok(())
        }
    }

    struct Harness {
        dispatcher: MessageDispatcher,
        manager: Arc<ConversationManager>,
        bindings: Arc<SqliteBindingStore>,
        directory: Arc<SqliteDirectory>,
        bus: Arc<EventBus>,
    }

    async fn harness(script: Vec<Scripted>, policy: DeliveryPolicy) -> (Harness, Arc<AtomicUsize>) {
        // Delivery tasks query from spawned tasks; a second pooled connection
        // would see its own empty in-memory database.
        let pool: SqlitePool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        attendo_conversations::SqliteConversationStore::init(&pool)
            .await
            .unwrap();
        attendo_conversations::SqliteMessageStore::init(&pool)
            .await
            .unwrap();
        SqliteDirectory::init(&pool).await.unwrap();
        SqliteBindingStore::init(&pool).await.unwrap();

        let directory = Arc::new(SqliteDirectory::new(pool.clone()));
        let bindings = Arc::new(SqliteBindingStore::new(pool.clone()));
        let bus = Arc::new(EventBus::default());
        let manager = Arc::new(ConversationManager::new(
            Arc::new(attendo_conversations::SqliteConversationStore::new(pool.clone())),
            Arc::new(attendo_conversations::SqliteMessageStore::new(pool)),
            Arc::clone(&directory) as Arc<dyn Directory>,
            Arc::clone(&bus),
        ));

        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = AdapterRegistry::new();
        registry.register(Box::new(ScriptedAdapter {
            outbound: ScriptedOutbound {
                calls: Arc::clone(&calls),
                script: Mutex::new(script.into()),
            },
        }));

        let dispatcher = MessageDispatcher::new(
            Arc::clone(&manager),
            Arc::clone(&bindings) as Arc<dyn BindingStore>,
            Arc::clone(&directory) as Arc<dyn Directory>,
            Arc::new(OneAccount),
            Arc::new(RwLock::new(registry)),
            policy,
        );

        (
            Harness {
                dispatcher,
                manager,
                bindings,
                directory,
                bus,
            },
            calls,
        )
    }

    /// Wait for the next `message_status_changed` frame for a message.
    async fn await_status(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<attendo_protocol::EventFrame>,
        message_id: &str,
    ) -> (DeliveryStatus, Option<String>) {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for delivery event")
                .expect("bus closed");
            if let EngineEvent::MessageStatusChanged {
                message_id: id,
                status,
                error,
                ..
            } = frame.event
            {
                if id == message_id {
                    return (status, error);
                }
            }
        }
    }

    async fn bound_contact(harness: &Harness) -> String {
        harness
            .bindings
            .ensure_binding("t1", ChannelKind::Telegram, "chat-55", Some("Rui"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn send_lands_as_sent_with_provider_id() {
        let (harness, calls) = harness(
            vec![Scripted::Accept(Some("prov-9".into()))],
            DeliveryPolicy::default(),
        )
        .await;
        let contact = bound_contact(&harness).await;
        let conv = harness
            .manager
            .create("t1", &contact, ChannelKind::Telegram, None)
            .await
            .unwrap();

        let (_, mut rx) = harness.bus.subscribe(EventFilter::default());
        let message = harness
            .dispatcher
            .send_outbound("t1", &conv.id, Sender::Agent { id: "ag-1".into() }, "hello", None)
            .await
            .unwrap();
        assert_eq!(message.delivery.as_ref().unwrap().status, DeliveryStatus::Sending);

        let (status, error) = await_status(&mut rx, &message.id).await;
        assert_eq!(status, DeliveryStatus::Sent);
        assert!(error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stored = harness.manager.message("t1", &message.id).await.unwrap().unwrap();
        assert_eq!(stored.provider_message_id.as_deref(), Some("prov-9"));
    }

    #[tokio::test]
    async fn unresolved_address_fails_without_adapter_call() {
        let (harness, calls) = harness(vec![], DeliveryPolicy::default()).await;
        // Conversation for a contact with no channel binding.
        let conv = harness
            .manager
            .create("t1", "ghost-contact", ChannelKind::Telegram, None)
            .await
            .unwrap();

        let (_, mut rx) = harness.bus.subscribe(EventFilter::default());
        let message = harness
            .dispatcher
            .send_outbound("t1", &conv.id, Sender::Bot, "hello?", None)
            .await
            .unwrap();

        let (status, error) = await_status(&mut rx, &message.id).await;
        assert_eq!(status, DeliveryStatus::Failed);
        assert_eq!(error.as_deref(), Some(ADDRESS_UNRESOLVED));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transport_failure_keeps_provider_wording() {
        let (harness, calls) = harness(
            vec![Scripted::Transport("Forbidden: bot was blocked by the user".into())],
            DeliveryPolicy::default(),
        )
        .await;
        let contact = bound_contact(&harness).await;
        let conv = harness
            .manager
            .create("t1", &contact, ChannelKind::Telegram, None)
            .await
            .unwrap();

        let (_, mut rx) = harness.bus.subscribe(EventFilter::default());
        let message = harness
            .dispatcher
            .send_outbound("t1", &conv.id, Sender::Agent { id: "ag-1".into() }, "hi", None)
            .await
            .unwrap();

        let (status, error) = await_status(&mut rx, &message.id).await;
        assert_eq!(status, DeliveryStatus::Failed);
        assert_eq!(error.as_deref(), Some("Forbidden: bot was blocked by the user"));
        // Retry is off by default: exactly one attempt.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn enabled_retry_recovers_from_transient_failure() {
        let policy = DeliveryPolicy {
            retry: RetryPolicy {
                enabled: true,
                max_attempts: 3,
                backoff: Duration::from_millis(5),
            },
            ..Default::default()
        };
        let (harness, calls) = harness(
            vec![
                Scripted::Transport("flood wait".into()),
                Scripted::Accept(Some("prov-2".into())),
            ],
            policy,
        )
        .await;
        let contact = bound_contact(&harness).await;
        let conv = harness
            .manager
            .create("t1", &contact, ChannelKind::Telegram, None)
            .await
            .unwrap();

        let (_, mut rx) = harness.bus.subscribe(EventFilter::default());
        let message = harness
            .dispatcher
            .send_outbound("t1", &conv.id, Sender::Bot, "retry me", None)
            .await
            .unwrap();

        let (status, _) = await_status(&mut rx, &message.id).await;
        assert_eq!(status, DeliveryStatus::Sent);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let policy = DeliveryPolicy {
            retry: RetryPolicy {
                enabled: true,
                max_attempts: 3,
                backoff: Duration::from_millis(5),
            },
            ..Default::default()
        };
        let (harness, calls) = harness(vec![Scripted::BadAddress], policy).await;
        let contact = bound_contact(&harness).await;
        let conv = harness
            .manager
            .create("t1", &contact, ChannelKind::Telegram, None)
            .await
            .unwrap();

        let (_, mut rx) = harness.bus.subscribe(EventFilter::default());
        let message = harness
            .dispatcher
            .send_outbound("t1", &conv.id, Sender::Bot, "nope", None)
            .await
            .unwrap();

        let (status, _) = await_status(&mut rx, &message.id).await;
        assert_eq!(status, DeliveryStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stuck_provider_call_times_out_as_failed() {
        let policy = DeliveryPolicy {
            send_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let (harness, _) = harness(vec![Scripted::Hang], policy).await;
        let contact = bound_contact(&harness).await;
        let conv = harness
            .manager
            .create("t1", &contact, ChannelKind::Telegram, None)
            .await
            .unwrap();

        let (_, mut rx) = harness.bus.subscribe(EventFilter::default());
        let message = harness
            .dispatcher
            .send_outbound("t1", &conv.id, Sender::Bot, "slow", None)
            .await
            .unwrap();

        let (status, error) = await_status(&mut rx, &message.id).await;
        assert_eq!(status, DeliveryStatus::Failed);
        assert!(error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn agent_signature_is_applied_when_enabled() {
        let (harness, _) = harness(vec![], DeliveryPolicy::default()).await;
        let contact = bound_contact(&harness).await;

        harness
            .directory
            .upsert_agent(&Agent {
                tenant_id: "t1".into(),
                id: "ag-1".into(),
                display_name: "Ana".into(),
            })
            .await
            .unwrap();
        let mut settings = TenantSettings::default();
        settings.signature.enabled = true;
        settings.signature.template = "— {agent}".into();
        harness
            .directory
            .set_tenant_settings("t1", &settings)
            .await
            .unwrap();

        let conv = harness
            .manager
            .create("t1", &contact, ChannelKind::Telegram, None)
            .await
            .unwrap();

        let signed = harness
            .dispatcher
            .send_outbound("t1", &conv.id, Sender::Agent { id: "ag-1".into() }, "done!", None)
            .await
            .unwrap();
        assert_eq!(signed.content, "done!\n\n— Ana");

        let unsigned = harness
            .dispatcher
            .send_outbound("t1", &conv.id, Sender::Bot, "survey", None)
            .await
            .unwrap();
        assert_eq!(unsigned.content, "survey");
    }

    #[tokio::test]
    async fn delete_routes_to_adapter_only_with_provider_id() {
        let (harness, calls) = harness(
            vec![Scripted::Accept(Some("prov-3".into()))],
            DeliveryPolicy::default(),
        )
        .await;
        let contact = bound_contact(&harness).await;
        let conv = harness
            .manager
            .create("t1", &contact, ChannelKind::Telegram, None)
            .await
            .unwrap();

        let (_, mut rx) = harness.bus.subscribe(EventFilter::default());
        let message = harness
            .dispatcher
            .send_outbound("t1", &conv.id, Sender::Bot, "oops", None)
            .await
            .unwrap();
        await_status(&mut rx, &message.id).await;

        let outcome = harness
            .dispatcher
            .delete_message("t1", &conv.id, &message.id)
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // A message that never reached the provider cannot be retracted.
        let (_, unsent) = harness
            .manager
            .append_outbound("t1", &conv.id, Sender::Bot, "local only", None)
            .await
            .unwrap();
        let outcome = harness
            .dispatcher
            .delete_message("t1", &conv.id, &unsent.id)
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Unsupported);
    }
}
