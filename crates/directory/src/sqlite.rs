use {
    async_trait::async_trait,
    attendo_common::{new_id, now_ms, types::ChannelKind},
    sqlx::SqlitePool,
};

use crate::{
    error::{is_unique_violation, Context, Error, Result},
    model::{Agent, Contact, ContactChannelBinding, Queue, TenantSettings},
    store::{BindingStore, Directory},
};

fn parse_channel(value: &str) -> Result<ChannelKind> {
    ChannelKind::parse(value).with_context(|| format!("unknown channel in store: {value}"))
}

// ── SqliteDirectory ─────────────────────────────────────────────────────────

/// SQLite-backed agent, queue and tenant settings store.
pub struct SqliteDirectory {
    pool: SqlitePool,
    default_settings: TenantSettings,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_default_settings(pool, TenantSettings::default())
    }

    /// Directory that answers `tenant_settings` with `settings` for tenants
    /// that never saved their own. An explicit row always wins.
    pub fn with_default_settings(pool: SqlitePool, settings: TenantSettings) -> Self {
        Self {
            pool,
            default_settings: settings,
        }
    }

    /// Initialize the directory table schema.
    ///
    /// Schema is managed by sqlx migrations in production. This method is
    /// retained for tests that use in-memory databases.
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agents (
                tenant_id    TEXT NOT NULL,
                id           TEXT NOT NULL,
                display_name TEXT NOT NULL,
                PRIMARY KEY (tenant_id, id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS queues (
                tenant_id TEXT NOT NULL,
                id        TEXT NOT NULL,
                name      TEXT NOT NULL,
                PRIMARY KEY (tenant_id, id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tenant_settings (
                tenant_id  TEXT PRIMARY KEY,
                settings   TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Directory for SqliteDirectory {
    async fn agent(&self, tenant_id: &str, agent_id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "SELECT tenant_id, id, display_name FROM agents WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Agent {
            tenant_id: r.0,
            id: r.1,
            display_name: r.2,
        }))
    }

    async fn queue(&self, tenant_id: &str, queue_id: &str) -> Result<Option<Queue>> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "SELECT tenant_id, id, name FROM queues WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(queue_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Queue {
            tenant_id: r.0,
            id: r.1,
            name: r.2,
        }))
    }

    async fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            "INSERT INTO agents (tenant_id, id, display_name) VALUES (?, ?, ?)
             ON CONFLICT (tenant_id, id) DO UPDATE SET display_name = excluded.display_name",
        )
        .bind(&agent.tenant_id)
        .bind(&agent.id)
        .bind(&agent.display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_queue(&self, queue: &Queue) -> Result<()> {
        sqlx::query(
            "INSERT INTO queues (tenant_id, id, name) VALUES (?, ?, ?)
             ON CONFLICT (tenant_id, id) DO UPDATE SET name = excluded.name",
        )
        .bind(&queue.tenant_id)
        .bind(&queue.id)
        .bind(&queue.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn tenant_settings(&self, tenant_id: &str) -> Result<TenantSettings> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT settings FROM tenant_settings WHERE tenant_id = ?",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((json,)) => Ok(serde_json::from_str(&json)?),
            None => Ok(self.default_settings.clone()),
        }
    }

    async fn set_tenant_settings(
        &self,
        tenant_id: &str,
        settings: &TenantSettings,
    ) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        sqlx::query(
            "INSERT INTO tenant_settings (tenant_id, settings, updated_at) VALUES (?, ?, ?)
             ON CONFLICT (tenant_id) DO UPDATE SET
                settings = excluded.settings,
                updated_at = excluded.updated_at",
        )
        .bind(tenant_id)
        .bind(&json)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ── SqliteBindingStore ──────────────────────────────────────────────────────

/// SQLite-backed contact and channel binding store.
pub struct SqliteBindingStore {
    pool: SqlitePool,
}

impl SqliteBindingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the contact and binding table schema.
    ///
    /// Schema is managed by sqlx migrations in production. This method is
    /// retained for tests that use in-memory databases.
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contacts (
                tenant_id    TEXT NOT NULL,
                id           TEXT NOT NULL,
                display_name TEXT,
                created_at   INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contact_bindings (
                tenant_id  TEXT NOT NULL,
                contact_id TEXT NOT NULL,
                channel    TEXT NOT NULL,
                address    TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, contact_id, channel)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_bindings_address
             ON contact_bindings (tenant_id, channel, address)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn binding_row(
        &self,
        tenant_id: &str,
        channel: ChannelKind,
        address: &str,
    ) -> Result<Option<ContactChannelBinding>> {
        let row = sqlx::query_as::<_, (String, String, String, String, i64, i64)>(
            "SELECT tenant_id, contact_id, channel, address, created_at, updated_at
             FROM contact_bindings
             WHERE tenant_id = ? AND channel = ? AND address = ?",
        )
        .bind(tenant_id)
        .bind(channel.as_str())
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_binding).transpose()
    }
}

fn row_to_binding(r: (String, String, String, String, i64, i64)) -> Result<ContactChannelBinding> {
    Ok(ContactChannelBinding {
        tenant_id: r.0,
        contact_id: r.1,
        channel: parse_channel(&r.2)?,
        address: r.3,
        created_at: r.4,
        updated_at: r.5,
    })
}

#[async_trait]
impl BindingStore for SqliteBindingStore {
    async fn resolve_address(
        &self,
        tenant_id: &str,
        channel: ChannelKind,
        address: &str,
    ) -> Result<Option<ContactChannelBinding>> {
        self.binding_row(tenant_id, channel, address).await
    }

    async fn resolve_contact(
        &self,
        tenant_id: &str,
        contact_id: &str,
        channel: ChannelKind,
    ) -> Result<Option<ContactChannelBinding>> {
        let row = sqlx::query_as::<_, (String, String, String, String, i64, i64)>(
            "SELECT tenant_id, contact_id, channel, address, created_at, updated_at
             FROM contact_bindings
             WHERE tenant_id = ? AND contact_id = ? AND channel = ?",
        )
        .bind(tenant_id)
        .bind(contact_id)
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_binding).transpose()
    }

    async fn ensure_binding(
        &self,
        tenant_id: &str,
        channel: ChannelKind,
        address: &str,
        display_name: Option<&str>,
    ) -> Result<String> {
        if let Some(existing) = self.binding_row(tenant_id, channel, address).await? {
            if let Some(name) = display_name {
                sqlx::query(
                    "UPDATE contacts SET display_name = ?
                     WHERE tenant_id = ? AND id = ? AND display_name IS NULL",
                )
                .bind(name)
                .bind(tenant_id)
                .bind(&existing.contact_id)
                .execute(&self.pool)
                .await?;
            }
            return Ok(existing.contact_id);
        }

        let contact_id = new_id();
        let now = now_ms();

        sqlx::query(
            "INSERT INTO contacts (tenant_id, id, display_name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(tenant_id)
        .bind(&contact_id)
        .bind(display_name)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let inserted = sqlx::query(
            "INSERT INTO contact_bindings
             (tenant_id, contact_id, channel, address, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(tenant_id)
        .bind(&contact_id)
        .bind(channel.as_str())
        .bind(address)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(contact_id),
            // Lost a race to another writer binding the same address. Drop
            // our orphan contact and return the winner's.
            Err(err) if is_unique_violation(&err) => {
                sqlx::query("DELETE FROM contacts WHERE tenant_id = ? AND id = ?")
                    .bind(tenant_id)
                    .bind(&contact_id)
                    .execute(&self.pool)
                    .await?;
                let winner = self
                    .binding_row(tenant_id, channel, address)
                    .await?
                    .context("binding vanished after unique violation")?;
                Ok(winner.contact_id)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn bind(
        &self,
        tenant_id: &str,
        contact_id: &str,
        channel: ChannelKind,
        address: &str,
    ) -> Result<ContactChannelBinding> {
        if self.contact(tenant_id, contact_id).await?.is_none() {
            return Err(Error::message(format!("unknown contact: {contact_id}")));
        }

        let now = now_ms();
        let result = sqlx::query(
            "INSERT INTO contact_bindings
             (tenant_id, contact_id, channel, address, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (tenant_id, contact_id, channel) DO UPDATE SET
                address = excluded.address,
                updated_at = excluded.updated_at",
        )
        .bind(tenant_id)
        .bind(contact_id)
        .bind(channel.as_str())
        .bind(address)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(Error::conflict(format!(
                    "address {address} on {channel} is bound to another contact"
                )));
            }
            Err(err) => return Err(err.into()),
        }

        self.resolve_contact(tenant_id, contact_id, channel)
            .await?
            .ok_or_else(|| Error::message("binding missing after upsert"))
    }

    async fn contact(&self, tenant_id: &str, contact_id: &str) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, i64)>(
            "SELECT tenant_id, id, display_name, created_at
             FROM contacts
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Contact {
            tenant_id: r.0,
            id: r.1,
            display_name: r.2,
            created_at: r.3,
        }))
    }

    async fn bindings_for_contact(
        &self,
        tenant_id: &str,
        contact_id: &str,
    ) -> Result<Vec<ContactChannelBinding>> {
        let rows = sqlx::query_as::<_, (String, String, String, String, i64, i64)>(
            "SELECT tenant_id, contact_id, channel, address, created_at, updated_at
             FROM contact_bindings
             WHERE tenant_id = ? AND contact_id = ?
             ORDER BY channel",
        )
        .bind(tenant_id)
        .bind(contact_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_binding).collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteDirectory::init(&pool).await.unwrap();
        SqliteBindingStore::init(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn ensure_binding_creates_then_reuses_contact() {
        let store = SqliteBindingStore::new(test_pool().await);

        let first = store
            .ensure_binding("t1", ChannelKind::Telegram, "12345", Some("Ana"))
            .await
            .unwrap();
        let second = store
            .ensure_binding("t1", ChannelKind::Telegram, "12345", Some("Ana B."))
            .await
            .unwrap();
        assert_eq!(first, second);

        let contact = store.contact("t1", &first).await.unwrap().unwrap();
        assert_eq!(contact.display_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn ensure_binding_backfills_missing_display_name() {
        let store = SqliteBindingStore::new(test_pool().await);

        let id = store
            .ensure_binding("t1", ChannelKind::Telegram, "12345", None)
            .await
            .unwrap();
        store
            .ensure_binding("t1", ChannelKind::Telegram, "12345", Some("Ana"))
            .await
            .unwrap();

        let contact = store.contact("t1", &id).await.unwrap().unwrap();
        assert_eq!(contact.display_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn resolve_address_round_trips() {
        let store = SqliteBindingStore::new(test_pool().await);

        let id = store
            .ensure_binding("t1", ChannelKind::Widget, "sess-9", None)
            .await
            .unwrap();

        let binding = store
            .resolve_address("t1", ChannelKind::Widget, "sess-9")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(binding.contact_id, id);
        assert_eq!(binding.address, "sess-9");

        let back = store
            .resolve_contact("t1", &id, ChannelKind::Widget)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(back, binding);
    }

    #[tokio::test]
    async fn unknown_address_resolves_to_none() {
        let store = SqliteBindingStore::new(test_pool().await);
        let got = store
            .resolve_address("t1", ChannelKind::Telegram, "nobody")
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn bind_moves_contact_to_new_address() {
        let store = SqliteBindingStore::new(test_pool().await);

        let id = store
            .ensure_binding("t1", ChannelKind::Telegram, "old-addr", None)
            .await
            .unwrap();
        store
            .bind("t1", &id, ChannelKind::Telegram, "new-addr")
            .await
            .unwrap();

        assert!(store
            .resolve_address("t1", ChannelKind::Telegram, "old-addr")
            .await
            .unwrap()
            .is_none());
        let binding = store
            .resolve_address("t1", ChannelKind::Telegram, "new-addr")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(binding.contact_id, id);
    }

    #[tokio::test]
    async fn bind_rejects_address_owned_by_other_contact() {
        let store = SqliteBindingStore::new(test_pool().await);

        store
            .ensure_binding("t1", ChannelKind::Telegram, "taken", None)
            .await
            .unwrap();
        let other = store
            .ensure_binding("t1", ChannelKind::Telegram, "elsewhere", None)
            .await
            .unwrap();

        let err = store
            .bind("t1", &other, ChannelKind::Telegram, "taken")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn bindings_are_tenant_scoped() {
        let store = SqliteBindingStore::new(test_pool().await);

        let a = store
            .ensure_binding("t1", ChannelKind::Telegram, "12345", None)
            .await
            .unwrap();
        let b = store
            .ensure_binding("t2", ChannelKind::Telegram, "12345", None)
            .await
            .unwrap();
        assert_ne!(a, b);

        assert!(store
            .resolve_address("t3", ChannelKind::Telegram, "12345")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn bindings_for_contact_lists_all_channels() {
        let store = SqliteBindingStore::new(test_pool().await);

        let id = store
            .ensure_binding("t1", ChannelKind::Telegram, "12345", None)
            .await
            .unwrap();
        store
            .bind("t1", &id, ChannelKind::Widget, "sess-1")
            .await
            .unwrap();

        let bindings = store.bindings_for_contact("t1", &id).await.unwrap();
        assert_eq!(bindings.len(), 2);
    }

    #[tokio::test]
    async fn tenant_settings_default_then_round_trip() {
        let dir = SqliteDirectory::new(test_pool().await);

        let fresh = dir.tenant_settings("t1").await.unwrap();
        assert!(!fresh.evaluation.enabled);
        assert!(!fresh.signature.enabled);

        let mut settings = TenantSettings::default();
        settings.evaluation.enabled = true;
        settings.evaluation.survey_text = "How did we do?".into();
        settings.signature.enabled = true;
        dir.set_tenant_settings("t1", &settings).await.unwrap();

        let loaded = dir.tenant_settings("t1").await.unwrap();
        assert!(loaded.evaluation.enabled);
        assert_eq!(loaded.evaluation.survey_text, "How did we do?");
        assert!(loaded.signature.enabled);
    }

    #[tokio::test]
    async fn configured_defaults_apply_until_tenant_saves_own() {
        let mut defaults = TenantSettings::default();
        defaults.evaluation.enabled = true;
        let dir = SqliteDirectory::with_default_settings(test_pool().await, defaults);

        assert!(dir.tenant_settings("t1").await.unwrap().evaluation.enabled);

        let mut own = TenantSettings::default();
        own.evaluation.enabled = false;
        dir.set_tenant_settings("t1", &own).await.unwrap();
        assert!(!dir.tenant_settings("t1").await.unwrap().evaluation.enabled);
    }

    #[tokio::test]
    async fn agents_and_queues_round_trip() {
        let dir = SqliteDirectory::new(test_pool().await);

        dir.upsert_agent(&Agent {
            tenant_id: "t1".into(),
            id: "ag-1".into(),
            display_name: "Ana".into(),
        })
        .await
        .unwrap();
        dir.upsert_agent(&Agent {
            tenant_id: "t1".into(),
            id: "ag-1".into(),
            display_name: "Ana Silva".into(),
        })
        .await
        .unwrap();
        dir.upsert_queue(&Queue {
            tenant_id: "t1".into(),
            id: "q-1".into(),
            name: "Billing".into(),
        })
        .await
        .unwrap();

        let agent = dir.agent("t1", "ag-1").await.unwrap().unwrap();
        assert_eq!(agent.display_name, "Ana Silva");
        assert!(dir.agent("t2", "ag-1").await.unwrap().is_none());

        let queue = dir.queue("t1", "q-1").await.unwrap().unwrap();
        assert_eq!(queue.name, "Billing");
    }
}
