//! Tenant directory: agents, queues, contacts, channel bindings, and
//! per-tenant settings.
//!
//! The binding store is the identity resolver: it maps a contact and a
//! channel to the provider address the dispatcher sends to, and maps inbound
//! addresses back to contacts (creating them on first touch).

pub mod error;
pub mod model;
pub mod sqlite;
pub mod store;

pub use {
    error::{Error, Result},
    model::{
        Agent, Contact, ContactChannelBinding, EvaluationSettings, Queue, SignatureSettings,
        TenantSettings,
    },
    sqlite::{SqliteBindingStore, SqliteDirectory},
    store::{BindingStore, Directory},
};

use crate::error::Context;

/// Run database migrations for the directory crate.
///
/// Creates the `agents`, `queues`, `contacts`, `contact_bindings` and
/// `tenant_settings` tables. Call at application startup.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await
        .context("directory migrations")
}
