use {
    async_trait::async_trait,
    attendo_common::{new_id, now_ms, types::EvaluationOutcome},
    sqlx::SqlitePool,
};

use crate::{
    error::{is_unique_violation, Context, Error, Result},
    model::EvaluationRequest,
    store::EvaluationStore,
};

type RequestRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    i64,
    i64,
);

const REQUEST_COLUMNS: &str =
    "id, tenant_id, conversation_id, contact_address, outcome, error, created_at, updated_at";

fn row_to_request(r: RequestRow) -> Result<EvaluationRequest> {
    let outcome = EvaluationOutcome::parse(&r.4)
        .with_context(|| format!("unknown evaluation outcome in store: {}", r.4))?;
    Ok(EvaluationRequest {
        id: r.0,
        tenant_id: r.1,
        conversation_id: r.2,
        contact_address: r.3,
        outcome,
        error: r.5,
        created_at: r.6,
        updated_at: r.7,
    })
}

/// SQLite-backed evaluation request store.
pub struct SqliteEvaluationStore {
    pool: SqlitePool,
}

impl SqliteEvaluationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the evaluation table schema.
    ///
    /// Schema is managed by sqlx migrations in production. This method is
    /// retained for tests that use in-memory databases.
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS evaluation_requests (
                id              TEXT PRIMARY KEY,
                tenant_id       TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                contact_address TEXT,
                outcome         TEXT NOT NULL DEFAULT 'pending',
                error           TEXT,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_evaluation_active
             ON evaluation_requests (conversation_id)
             WHERE outcome != 'failed'",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_evaluation_conversation
             ON evaluation_requests (tenant_id, conversation_id, created_at)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl EvaluationStore for SqliteEvaluationStore {
    async fn claim(
        &self,
        tenant_id: &str,
        conversation_id: &str,
    ) -> Result<Option<EvaluationRequest>> {
        let id = new_id();
        let now = now_ms();

        let inserted = sqlx::query(
            "INSERT INTO evaluation_requests
             (id, tenant_id, conversation_id, contact_address, outcome, error,
              created_at, updated_at)
             VALUES (?, ?, ?, NULL, 'pending', NULL, ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(conversation_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(Some(EvaluationRequest {
                id,
                tenant_id: tenant_id.into(),
                conversation_id: conversation_id.into(),
                contact_address: None,
                outcome: EvaluationOutcome::Pending,
                error: None,
                created_at: now,
                updated_at: now,
            })),
            // The partial unique index holds a non-failed request already.
            Err(err) if is_unique_violation(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn record_outcome(
        &self,
        tenant_id: &str,
        request_id: &str,
        outcome: EvaluationOutcome,
        error: Option<&str>,
        contact_address: Option<&str>,
    ) -> Result<EvaluationRequest> {
        let done = sqlx::query(
            "UPDATE evaluation_requests
             SET outcome = ?,
                 error = ?,
                 contact_address = COALESCE(?, contact_address),
                 updated_at = ?
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(outcome.as_str())
        .bind(error)
        .bind(contact_address)
        .bind(now_ms())
        .bind(tenant_id)
        .bind(request_id)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            return Err(Error::message(format!(
                "unknown evaluation request: {request_id}"
            )));
        }

        self.get(tenant_id, request_id)
            .await?
            .context("evaluation request missing after update")
    }

    async fn get(&self, tenant_id: &str, request_id: &str) -> Result<Option<EvaluationRequest>> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM evaluation_requests WHERE tenant_id = ? AND id = ?"
        ))
        .bind(tenant_id)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_request).transpose()
    }

    async fn list_for_conversation(
        &self,
        tenant_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<EvaluationRequest>> {
        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM evaluation_requests
             WHERE tenant_id = ? AND conversation_id = ?
             ORDER BY created_at, id"
        ))
        .bind(tenant_id)
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_request).collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteEvaluationStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteEvaluationStore::init(&pool).await.unwrap();
        SqliteEvaluationStore::new(pool)
    }

    #[tokio::test]
    async fn claim_wins_only_once() {
        let store = test_store().await;

        let first = store.claim("t1", "conv-1").await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().outcome, EvaluationOutcome::Pending);

        let second = store.claim("t1", "conv-1").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn sent_request_keeps_the_slot() {
        let store = test_store().await;

        let request = store.claim("t1", "conv-1").await.unwrap().unwrap();
        store
            .record_outcome(
                "t1",
                &request.id,
                EvaluationOutcome::Sent,
                None,
                Some("12345"),
            )
            .await
            .unwrap();

        assert!(store.claim("t1", "conv-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_request_frees_the_slot() {
        let store = test_store().await;

        let request = store.claim("t1", "conv-1").await.unwrap().unwrap();
        store
            .record_outcome(
                "t1",
                &request.id,
                EvaluationOutcome::Failed,
                Some("telegram transport: boom"),
                Some("12345"),
            )
            .await
            .unwrap();

        let retry = store.claim("t1", "conv-1").await.unwrap();
        assert!(retry.is_some());

        let history = store.list_for_conversation("t1", "conv-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].outcome, EvaluationOutcome::Failed);
        assert_eq!(history[1].outcome, EvaluationOutcome::Pending);
    }

    #[tokio::test]
    async fn record_outcome_round_trips() {
        let store = test_store().await;

        let request = store.claim("t1", "conv-1").await.unwrap().unwrap();
        let settled = store
            .record_outcome(
                "t1",
                &request.id,
                EvaluationOutcome::Skipped,
                Some("contact has no telegram address"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(settled.outcome, EvaluationOutcome::Skipped);
        assert_eq!(
            settled.error.as_deref(),
            Some("contact has no telegram address")
        );
        assert!(settled.contact_address.is_none());

        let loaded = store.get("t1", &request.id).await.unwrap().unwrap();
        assert_eq!(loaded, settled);
    }

    #[tokio::test]
    async fn requests_are_tenant_scoped() {
        let store = test_store().await;

        let request = store.claim("t1", "conv-1").await.unwrap().unwrap();
        assert!(store.get("t2", &request.id).await.unwrap().is_none());

        let err = store
            .record_outcome("t2", &request.id, EvaluationOutcome::Sent, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Message { .. }));
    }
}
