//! Post-closure satisfaction surveys.
//!
//! Hooks into conversation close, claims a per-conversation request slot so
//! concurrent closers dispatch at most one survey, and sends the tenant's
//! survey text to the contact through the message dispatcher.

pub mod error;
pub mod model;
pub mod sqlite;
pub mod store;
pub mod trigger;

pub use {
    error::{Error, Result},
    model::EvaluationRequest,
    sqlite::SqliteEvaluationStore,
    store::EvaluationStore,
    trigger::{EvaluationTrigger, SurveySender},
};

use crate::error::Context;

/// Run database migrations for the evaluation crate.
///
/// Creates the `evaluation_requests` table. Call at application startup.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await
        .context("evaluation migrations")
}
