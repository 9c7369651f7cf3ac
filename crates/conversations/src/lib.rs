//! Conversation lifecycle: the status state machine, inbound/outbound message
//! appends, forwarding, delivery progress, and per-conversation
//! serialization.

pub mod error;
pub mod locks;
pub mod manager;
pub mod model;
pub mod sqlite;
pub mod store;

pub use {
    error::{Error, Result},
    locks::ConversationLocks,
    manager::{CloseHook, ConversationManager},
    model::{Conversation, ConversationFilter, Message},
    sqlite::{SqliteConversationStore, SqliteMessageStore},
    store::{ConversationStore, MessageStore},
};

use crate::error::Context;

/// Run database migrations for the conversations crate.
///
/// Creates the `conversations` and `messages` tables. Call at application
/// startup.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await
        .context("conversations migrations")
}
