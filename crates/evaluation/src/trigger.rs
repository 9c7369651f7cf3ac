use std::sync::Arc;

use {
    async_trait::async_trait,
    attendo_common::types::{EvaluationOutcome, Sender},
    attendo_conversations::{CloseHook, Conversation, Message},
    attendo_directory::{BindingStore, Directory},
    attendo_dispatch::MessageDispatcher,
    attendo_events::EventBus,
    attendo_protocol::EngineEvent,
    tracing::{debug, warn},
};

use crate::{error::Result, model::EvaluationRequest, store::EvaluationStore};

/// Outbound path for survey messages. Satisfied by the message dispatcher;
/// split off so the trigger can be exercised without channel plumbing.
#[async_trait]
pub trait SurveySender: Send + Sync {
    async fn send_survey(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<Message>;
}

#[async_trait]
impl SurveySender for MessageDispatcher {
    async fn send_survey(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<Message> {
        Ok(self
            .send_outbound(tenant_id, conversation_id, Sender::Bot, content, None)
            .await?)
    }
}

/// Sends the post-closure satisfaction survey.
///
/// Runs as the conversation manager's close hook. Two agents closing the
/// same conversation race here, so the request row insert doubles as the
/// winner election: whoever claims the slot dispatches, everyone else walks
/// away silently.
pub struct EvaluationTrigger {
    store: Arc<dyn EvaluationStore>,
    bindings: Arc<dyn BindingStore>,
    directory: Arc<dyn Directory>,
    sender: Arc<dyn SurveySender>,
    bus: Arc<EventBus>,
    /// Used when a tenant enabled surveys without writing their own text.
    default_survey_text: String,
}

impl EvaluationTrigger {
    pub fn new(
        store: Arc<dyn EvaluationStore>,
        bindings: Arc<dyn BindingStore>,
        directory: Arc<dyn Directory>,
        sender: Arc<dyn SurveySender>,
        bus: Arc<EventBus>,
        default_survey_text: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bindings,
            directory,
            sender,
            bus,
            default_survey_text: default_survey_text.into(),
        }
    }

    /// Run the survey flow for a freshly closed conversation.
    ///
    /// Returns the settled request, or `None` when the tenant has surveys
    /// off or another closer already claimed this conversation.
    pub async fn trigger(&self, conversation: &Conversation) -> Result<Option<EvaluationRequest>> {
        let settings = self
            .directory
            .tenant_settings(&conversation.tenant_id)
            .await?;
        if !settings.evaluation.enabled || !settings.evaluation.send_on_close {
            debug!(
                tenant_id = %conversation.tenant_id,
                conversation_id = %conversation.id,
                "surveys off for tenant"
            );
            return Ok(None);
        }

        let Some(request) = self
            .store
            .claim(&conversation.tenant_id, &conversation.id)
            .await?
        else {
            debug!(
                conversation_id = %conversation.id,
                "evaluation slot already claimed"
            );
            return Ok(None);
        };

        let binding = self
            .bindings
            .resolve_contact(
                &conversation.tenant_id,
                &conversation.contact_id,
                conversation.channel,
            )
            .await?;
        let Some(binding) = binding else {
            let reason = format!("contact has no {} address", conversation.channel);
            let request = self
                .settle(request, None, EvaluationOutcome::Skipped, Some(reason))
                .await?;
            return Ok(Some(request));
        };

        let text = {
            let own = settings.evaluation.survey_text.trim();
            if own.is_empty() {
                self.default_survey_text.trim()
            } else {
                own
            }
        };
        if text.is_empty() {
            let request = self
                .settle(
                    request,
                    Some(binding.address),
                    EvaluationOutcome::Skipped,
                    Some("survey text is empty".into()),
                )
                .await?;
            return Ok(Some(request));
        }

        let (outcome, error) = match self
            .sender
            .send_survey(&conversation.tenant_id, &conversation.id, text)
            .await
        {
            Ok(message) => {
                debug!(
                    conversation_id = %conversation.id,
                    message_id = %message.id,
                    "survey dispatched"
                );
                (EvaluationOutcome::Sent, None)
            }
            Err(err) => (EvaluationOutcome::Failed, Some(err.to_string())),
        };
        let request = self
            .settle(request, Some(binding.address), outcome, error)
            .await?;
        Ok(Some(request))
    }

    async fn settle(
        &self,
        request: EvaluationRequest,
        contact_address: Option<String>,
        outcome: EvaluationOutcome,
        error: Option<String>,
    ) -> Result<EvaluationRequest> {
        let settled = self
            .store
            .record_outcome(
                &request.tenant_id,
                &request.id,
                outcome,
                error.as_deref(),
                contact_address.as_deref(),
            )
            .await?;
        self.bus.publish(EngineEvent::EvaluationDispatched {
            tenant_id: settled.tenant_id.clone(),
            conversation_id: settled.conversation_id.clone(),
            request_id: settled.id.clone(),
            outcome,
        });
        Ok(settled)
    }
}

#[async_trait]
impl CloseHook for EvaluationTrigger {
    async fn conversation_closed(&self, conversation: Conversation) {
        if let Err(err) = self.trigger(&conversation).await {
            warn!(
                tenant_id = %conversation.tenant_id,
                conversation_id = %conversation.id,
                error = %err,
                "post-close evaluation failed"
            );
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use {
        attendo_common::types::{ChannelKind, ConversationStatus, DeliveryState},
        attendo_directory::{SqliteBindingStore, SqliteDirectory, TenantSettings},
        attendo_events::EventFilter,
        sqlx::SqlitePool,
    };

    use super::*;
    use crate::{error::Error, sqlite::SqliteEvaluationStore};

    struct StubSender {
        calls: AtomicUsize,
        fail_with: Option<String>,
    }

    impl StubSender {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_with: None,
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_with: Some(reason.into()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SurveySender for StubSender {
        async fn send_survey(
            &self,
            tenant_id: &str,
            conversation_id: &str,
            content: &str,
        ) -> Result<Message> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(reason) => Err(Error::message(reason.clone())),
                None => Ok(Message {
                    id: attendo_common::new_id(),
                    conversation_id: conversation_id.into(),
                    tenant_id: tenant_id.into(),
                    sender: Sender::Bot,
                    content: content.into(),
                    media: None,
                    delivery: Some(DeliveryState::sending()),
                    provider_message_id: None,
                    seq: 1,
                    created_at: attendo_common::now_ms(),
                }),
            }
        }
    }

    struct Harness {
        trigger: EvaluationTrigger,
        store: Arc<SqliteEvaluationStore>,
        sender: Arc<StubSender>,
        directory: Arc<SqliteDirectory>,
        bindings: Arc<SqliteBindingStore>,
        bus: Arc<EventBus>,
    }

    async fn harness(sender: StubSender) -> Harness {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteDirectory::init(&pool).await.unwrap();
        SqliteBindingStore::init(&pool).await.unwrap();
        SqliteEvaluationStore::init(&pool).await.unwrap();

        let store = Arc::new(SqliteEvaluationStore::new(pool.clone()));
        let bindings = Arc::new(SqliteBindingStore::new(pool.clone()));
        let directory = Arc::new(SqliteDirectory::new(pool));
        let sender = Arc::new(sender);
        let bus = Arc::new(EventBus::default());

        let trigger = EvaluationTrigger::new(
            Arc::clone(&store) as Arc<dyn EvaluationStore>,
            Arc::clone(&bindings) as Arc<dyn BindingStore>,
            Arc::clone(&directory) as Arc<dyn Directory>,
            Arc::clone(&sender) as Arc<dyn SurveySender>,
            Arc::clone(&bus),
            "Rate us 1-5?",
        );

        Harness {
            trigger,
            store,
            sender,
            directory,
            bindings,
            bus,
        }
    }

    async fn enable_surveys(h: &Harness, tenant_id: &str, survey_text: &str) {
        let mut settings = TenantSettings::default();
        settings.evaluation.enabled = true;
        settings.evaluation.survey_text = survey_text.into();
        h.directory
            .set_tenant_settings(tenant_id, &settings)
            .await
            .unwrap();
    }

    async fn closed_conversation(h: &Harness, address: Option<&str>) -> Conversation {
        let contact_id = match address {
            Some(address) => h
                .bindings
                .ensure_binding("t1", ChannelKind::Telegram, address, None)
                .await
                .unwrap(),
            None => "contact-unbound".into(),
        };
        let mut conversation = Conversation::new("t1", contact_id, ChannelKind::Telegram, None);
        conversation.status = ConversationStatus::Closed;
        conversation.closed_at = Some(conversation.updated_at);
        conversation
    }

    #[tokio::test]
    async fn disabled_tenant_records_nothing() {
        let h = harness(StubSender::ok()).await;
        let conversation = closed_conversation(&h, Some("12345")).await;

        let result = h.trigger.trigger(&conversation).await.unwrap();
        assert!(result.is_none());
        assert_eq!(h.sender.calls(), 0);
        assert!(h
            .store
            .list_for_conversation("t1", &conversation.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn survey_goes_out_and_is_recorded() {
        let h = harness(StubSender::ok()).await;
        enable_surveys(&h, "t1", "How did we do?").await;
        let conversation = closed_conversation(&h, Some("12345")).await;

        let (_, mut rx) = h.bus.subscribe(EventFilter::default());
        let request = h.trigger.trigger(&conversation).await.unwrap().unwrap();

        assert_eq!(request.outcome, EvaluationOutcome::Sent);
        assert_eq!(request.contact_address.as_deref(), Some("12345"));
        assert_eq!(h.sender.calls(), 1);

        let frame = rx.recv().await.unwrap();
        match frame.event {
            EngineEvent::EvaluationDispatched {
                request_id,
                outcome,
                ..
            } => {
                assert_eq!(request_id, request.id);
                assert_eq!(outcome, EvaluationOutcome::Sent);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_close_does_not_send_twice() {
        let h = harness(StubSender::ok()).await;
        enable_surveys(&h, "t1", "How did we do?").await;
        let conversation = closed_conversation(&h, Some("12345")).await;

        h.trigger.trigger(&conversation).await.unwrap().unwrap();
        let second = h.trigger.trigger(&conversation).await.unwrap();

        assert!(second.is_none());
        assert_eq!(h.sender.calls(), 1);
    }

    #[tokio::test]
    async fn unbound_contact_is_skipped_without_sending() {
        let h = harness(StubSender::ok()).await;
        enable_surveys(&h, "t1", "How did we do?").await;
        let conversation = closed_conversation(&h, None).await;

        let request = h.trigger.trigger(&conversation).await.unwrap().unwrap();

        assert_eq!(request.outcome, EvaluationOutcome::Skipped);
        assert!(request.contact_address.is_none());
        assert_eq!(h.sender.calls(), 0);
    }

    #[tokio::test]
    async fn send_failure_is_recorded_and_frees_retry() {
        let h = harness(StubSender::failing("telegram transport: boom")).await;
        enable_surveys(&h, "t1", "How did we do?").await;
        let conversation = closed_conversation(&h, Some("12345")).await;

        let request = h.trigger.trigger(&conversation).await.unwrap().unwrap();
        assert_eq!(request.outcome, EvaluationOutcome::Failed);
        assert_eq!(
            request.error.as_deref(),
            Some("telegram transport: boom")
        );

        // A later close may try again because only a failed request exists.
        let retry = h.trigger.trigger(&conversation).await.unwrap().unwrap();
        assert_eq!(retry.outcome, EvaluationOutcome::Failed);
        assert_eq!(h.sender.calls(), 2);
    }

    #[tokio::test]
    async fn empty_tenant_text_falls_back_to_default() {
        let h = harness(StubSender::ok()).await;
        enable_surveys(&h, "t1", "").await;
        let conversation = closed_conversation(&h, Some("12345")).await;

        let request = h.trigger.trigger(&conversation).await.unwrap().unwrap();
        assert_eq!(request.outcome, EvaluationOutcome::Sent);
        assert_eq!(h.sender.calls(), 1);
    }

    #[tokio::test]
    async fn close_hook_swallows_trigger_errors() {
        // Directory tables exist but the evaluation table does not, so the
        // claim insert fails. The hook must not panic.
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteDirectory::init(&pool).await.unwrap();
        SqliteBindingStore::init(&pool).await.unwrap();

        let directory = Arc::new(SqliteDirectory::new(pool.clone()));
        let mut settings = TenantSettings::default();
        settings.evaluation.enabled = true;
        settings.evaluation.survey_text = "How did we do?".into();
        directory.set_tenant_settings("t1", &settings).await.unwrap();

        let trigger = EvaluationTrigger::new(
            Arc::new(SqliteEvaluationStore::new(pool.clone())),
            Arc::new(SqliteBindingStore::new(pool)),
            directory,
            Arc::new(StubSender::ok()),
            Arc::new(EventBus::default()),
            "Rate us 1-5?",
        );

        let conversation = Conversation::new("t1", "c-1", ChannelKind::Telegram, None);
        trigger.conversation_closed(conversation).await;
    }
}
