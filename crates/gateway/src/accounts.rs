//! SQLite-backed channel account store.

use {
    async_trait::async_trait,
    attendo_channels::{ChannelAccountStore, Error, Result, StoredChannelAccount},
    attendo_common::{now_ms, types::ChannelKind},
    sqlx::SqlitePool,
};

type AccountRow = (
    String, // channel
    String, // account_id
    String, // tenant_id
    String, // config (json)
    i64,    // enabled
    i64,    // created_at
    i64,    // updated_at
);

const ACCOUNT_COLUMNS: &str =
    "channel, account_id, tenant_id, config, enabled, created_at, updated_at";

fn row_to_account(r: AccountRow) -> Result<StoredChannelAccount> {
    Ok(StoredChannelAccount {
        channel: ChannelKind::parse(&r.0)
            .ok_or_else(|| Error::unavailable(format!("unknown channel in account store: {}", r.0)))?,
        account_id: r.1,
        tenant_id: r.2,
        config: serde_json::from_str(&r.3)?,
        enabled: r.4 != 0,
        created_at: r.5,
        updated_at: r.6,
    })
}

fn store_err(e: sqlx::Error) -> Error {
    Error::external("channel account store", e)
}

/// Channel accounts persisted in SQLite. The gateway reconciles the rows from
/// `channels.*` config at boot and starts whatever is enabled.
pub struct SqliteChannelAccountStore {
    pool: SqlitePool,
}

impl SqliteChannelAccountStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the channel accounts table schema.
    ///
    /// Schema is managed by sqlx migrations in production. This method is
    /// retained for tests that use in-memory databases.
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS channel_accounts (
                channel    TEXT NOT NULL,
                account_id TEXT NOT NULL,
                tenant_id  TEXT NOT NULL,
                config     TEXT NOT NULL DEFAULT '{}',
                enabled    INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (channel, account_id)
            )",
        )
        .execute(pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_channel_accounts_tenant
             ON channel_accounts (tenant_id, channel)",
        )
        .execute(pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }
}

#[async_trait]
impl ChannelAccountStore for SqliteChannelAccountStore {
    async fn list(&self) -> Result<Vec<StoredChannelAccount>> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM channel_accounts ORDER BY channel, account_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.into_iter().map(row_to_account).collect()
    }

    async fn list_enabled(&self) -> Result<Vec<StoredChannelAccount>> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM channel_accounts
             WHERE enabled = 1 ORDER BY channel, account_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.into_iter().map(row_to_account).collect()
    }

    async fn get(
        &self,
        channel: ChannelKind,
        account_id: &str,
    ) -> Result<Option<StoredChannelAccount>> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM channel_accounts
             WHERE channel = ? AND account_id = ?"
        ))
        .bind(channel.as_str())
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(row_to_account).transpose()
    }

    async fn find_for_tenant(
        &self,
        tenant_id: &str,
        channel: ChannelKind,
    ) -> Result<Option<StoredChannelAccount>> {
        // Deterministic pick when a tenant runs several accounts on one
        // channel: lowest account id wins.
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM channel_accounts
             WHERE tenant_id = ? AND channel = ? AND enabled = 1
             ORDER BY account_id LIMIT 1"
        ))
        .bind(tenant_id)
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(row_to_account).transpose()
    }

    async fn upsert(&self, account: StoredChannelAccount) -> Result<()> {
        let now = now_ms();
        sqlx::query(
            "INSERT INTO channel_accounts
             (channel, account_id, tenant_id, config, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (channel, account_id) DO UPDATE SET
                tenant_id  = excluded.tenant_id,
                config     = excluded.config,
                enabled    = excluded.enabled,
                updated_at = excluded.updated_at",
        )
        .bind(account.channel.as_str())
        .bind(&account.account_id)
        .bind(&account.tenant_id)
        .bind(account.config.to_string())
        .bind(i64::from(account.enabled))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn set_enabled(
        &self,
        channel: ChannelKind,
        account_id: &str,
        enabled: bool,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE channel_accounts SET enabled = ?, updated_at = ?
             WHERE channel = ? AND account_id = ?",
        )
        .bind(i64::from(enabled))
        .bind(now_ms())
        .bind(channel.as_str())
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::unknown_account(account_id));
        }
        Ok(())
    }

    async fn delete(&self, channel: ChannelKind, account_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM channel_accounts WHERE channel = ? AND account_id = ?")
            .bind(channel.as_str())
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
