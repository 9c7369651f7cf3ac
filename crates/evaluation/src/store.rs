use async_trait::async_trait;

use attendo_common::types::EvaluationOutcome;

use crate::{error::Result, model::EvaluationRequest};

/// Persistence for post-close evaluation requests.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Claim the conversation's evaluation slot with a `pending` request.
    ///
    /// Returns `None` when a non-failed request already exists, which is how
    /// a second concurrent closer learns it lost.
    async fn claim(
        &self,
        tenant_id: &str,
        conversation_id: &str,
    ) -> Result<Option<EvaluationRequest>>;

    /// Settle a claimed request with its final outcome. `contact_address`
    /// is stored when given, kept as-is when `None`.
    async fn record_outcome(
        &self,
        tenant_id: &str,
        request_id: &str,
        outcome: EvaluationOutcome,
        error: Option<&str>,
        contact_address: Option<&str>,
    ) -> Result<EvaluationRequest>;

    async fn get(&self, tenant_id: &str, request_id: &str) -> Result<Option<EvaluationRequest>>;

    /// All requests ever made for a conversation, oldest first.
    async fn list_for_conversation(
        &self,
        tenant_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<EvaluationRequest>>;
}
