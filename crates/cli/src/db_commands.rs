use {
    clap::Subcommand,
    std::path::{Path, PathBuf},
};

use attendo_config::AttendoConfig;

#[derive(Subcommand)]
pub enum DbAction {
    /// Delete the database file completely (including WAL/SHM sidecars).
    Reset,
    /// Clear all data from tables but keep the schema intact.
    Clear,
    /// Run all pending database migrations.
    Migrate,
}

pub async fn handle_db(action: DbAction, config: &AttendoConfig) -> anyhow::Result<()> {
    let db_path = config.storage.database_path();
    match action {
        DbAction::Reset => reset_database(&db_path),
        DbAction::Clear => clear_database(&db_path).await,
        DbAction::Migrate => run_migrations(&db_path).await,
    }
}

/// SQLite names its sidecar files by appending to the full database file
/// name, extension included.
fn sidecar(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(suffix);
    db_path.with_file_name(name)
}

/// Delete the database file and any WAL/SHM files SQLite left behind.
fn reset_database(db_path: &Path) -> anyhow::Result<()> {
    let mut deleted = false;

    for suffix in ["", "-wal", "-shm"] {
        let path = if suffix.is_empty() {
            db_path.to_path_buf()
        } else {
            sidecar(db_path, suffix)
        };
        if path.exists() {
            std::fs::remove_file(&path)?;
            println!("Deleted: {}", path.display());
            deleted = true;
        }
    }

    if deleted {
        println!("Database deleted. Run `attendo db migrate` to recreate it.");
    } else {
        println!("No database found at {}.", db_path.display());
    }

    Ok(())
}

/// Clear all data from tables but keep the schema intact.
async fn clear_database(db_path: &Path) -> anyhow::Result<()> {
    if !db_path.exists() {
        println!("Database not found: {}", db_path.display());
        return Ok(());
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
    let pool = sqlx::SqlitePool::connect(&db_url).await?;

    // Conversation data first, then directory and channel plumbing.
    let tables = [
        "messages",
        "conversations",
        "evaluation_requests",
        "contact_bindings",
        "contacts",
        "agents",
        "queues",
        "tenant_settings",
        "channel_accounts",
    ];

    for table in tables {
        // Raw query to avoid compile-time checks
        let query = format!("DELETE FROM {table}");
        if let Err(e) = sqlx::query(&query).execute(&pool).await {
            // Table might not exist if migrations haven't run
            eprintln!("Warning: could not clear {table}: {e}");
        } else {
            println!("Cleared table: {table}");
        }
    }

    pool.close().await;
    println!("Database cleared.");
    Ok(())
}

/// Run all pending database migrations.
async fn run_migrations(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    println!("Running migrations for {}...", db_path.display());
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
    let pool = sqlx::SqlitePool::connect(&db_url).await?;

    attendo_gateway::run_migrations(&pool).await?;

    pool.close().await;
    println!("All migrations complete.");
    Ok(())
}
