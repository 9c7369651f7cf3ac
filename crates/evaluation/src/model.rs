use serde::Serialize;

use attendo_common::types::EvaluationOutcome;

/// One attempt to survey a contact after their conversation closed.
///
/// At most one non-failed request exists per conversation, enforced by a
/// partial unique index. Claiming the slot is the idempotency gate for
/// concurrent closers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationRequest {
    pub id: String,
    pub tenant_id: String,
    pub conversation_id: String,
    /// Provider address the survey went to. None until resolved, and stays
    /// None when the contact had no binding on the conversation's channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_address: Option<String>,
    pub outcome: EvaluationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}
