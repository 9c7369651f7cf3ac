//! Gateway: the engine's HTTP/WebSocket surface and process assembly.
//!
//! Lifecycle:
//! 1. Load config, open the SQLite pool, run migrations
//! 2. Wire stores, trackers, dispatcher and adapters into [`state::EngineState`]
//! 3. Mirror config-declared channel accounts into the account store
//! 4. Start enabled accounts, the tick timer and the HTTP server
//!
//! Domain logic (conversation lifecycle, dispatch, surveys) lives in the
//! other crates; handlers here translate HTTP and socket traffic into calls
//! on them.

pub mod accounts;
pub mod channel_routes;
pub mod conversation_routes;
pub mod error;
pub mod presence_routes;
pub mod server;
pub mod sink;
pub mod state;
pub mod ws;

pub use {
    server::{build_engine_app, build_engine_state, start_gateway},
    state::EngineState,
};

/// Run every crate's database migrations against one pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    attendo_directory::run_migrations(pool).await?;
    attendo_conversations::run_migrations(pool).await?;
    attendo_evaluation::run_migrations(pool).await?;
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
