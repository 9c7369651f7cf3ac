use {
    async_trait::async_trait,
    attendo_common::types::{
        ChannelKind, ConversationStatus, DeliveryState, DeliveryStatus, Priority,
    },
    sqlx::SqlitePool,
};

use crate::{
    error::{Context, Error, Result},
    model::{Conversation, ConversationFilter, Message},
    store::{ConversationStore, MessageStore},
};

type ConversationRow = (
    String,         // id
    String,         // tenant_id
    String,         // channel
    String,         // contact_id
    String,         // status
    Option<String>, // assigned_agent
    Option<String>, // queue
    Option<String>, // flow_step
    String,         // priority
    Option<String>, // last_message_preview
    i64,            // version
    i64,            // created_at
    i64,            // updated_at
    Option<i64>,    // closed_at
);

type MessageRow = (
    String,         // id
    String,         // conversation_id
    String,         // tenant_id
    String,         // sender
    String,         // content
    Option<String>, // media
    Option<String>, // delivery_status
    Option<String>, // delivery_error
    Option<String>, // provider_message_id
    i64,            // seq
    i64,            // created_at
);

const CONVERSATION_COLUMNS: &str = "id, tenant_id, channel, contact_id, status, assigned_agent, \
     queue, flow_step, priority, last_message_preview, version, created_at, updated_at, closed_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, tenant_id, sender, content, media, \
     delivery_status, delivery_error, provider_message_id, seq, created_at";

fn row_to_conversation(r: ConversationRow) -> Result<Conversation> {
    Ok(Conversation {
        id: r.0,
        tenant_id: r.1,
        channel: ChannelKind::parse(&r.2)
            .with_context(|| format!("unknown channel in store: {}", r.2))?,
        contact_id: r.3,
        status: ConversationStatus::parse(&r.4)
            .with_context(|| format!("unknown status in store: {}", r.4))?,
        assigned_agent: r.5,
        queue: r.6,
        flow_step: r.7,
        priority: Priority::parse(&r.8)
            .with_context(|| format!("unknown priority in store: {}", r.8))?,
        last_message_preview: r.9,
        version: r.10,
        created_at: r.11,
        updated_at: r.12,
        closed_at: r.13,
    })
}

fn row_to_message(r: MessageRow) -> Result<Message> {
    let delivery = match r.6 {
        Some(status) => Some(DeliveryState {
            status: DeliveryStatus::parse(&status)
                .with_context(|| format!("unknown delivery status in store: {status}"))?,
            error: r.7,
        }),
        None => None,
    };
    Ok(Message {
        id: r.0,
        conversation_id: r.1,
        tenant_id: r.2,
        sender: serde_json::from_str(&r.3)?,
        content: r.4,
        media: r.5.as_deref().map(serde_json::from_str).transpose()?,
        delivery,
        provider_message_id: r.8,
        seq: r.9,
        created_at: r.10,
    })
}

// ── SqliteConversationStore ─────────────────────────────────────────────────

/// SQLite-backed conversation store.
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the conversations table schema.
    ///
    /// Schema is managed by sqlx migrations in production. This method is
    /// retained for tests that use in-memory databases.
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversations (
                id                   TEXT PRIMARY KEY,
                tenant_id            TEXT NOT NULL,
                channel              TEXT NOT NULL,
                contact_id           TEXT NOT NULL,
                status               TEXT NOT NULL,
                assigned_agent       TEXT,
                queue                TEXT,
                flow_step            TEXT,
                priority             TEXT NOT NULL DEFAULT 'normal',
                last_message_preview TEXT,
                version              INTEGER NOT NULL DEFAULT 1,
                created_at           INTEGER NOT NULL,
                updated_at           INTEGER NOT NULL,
                closed_at            INTEGER
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_tenant_status
             ON conversations (tenant_id, status, updated_at DESC)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_contact
             ON conversations (tenant_id, contact_id, channel)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn insert(&self, c: &Conversation) -> Result<()> {
        sqlx::query(
            "INSERT INTO conversations
             (id, tenant_id, channel, contact_id, status, assigned_agent, queue, flow_step,
              priority, last_message_preview, version, created_at, updated_at, closed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&c.id)
        .bind(&c.tenant_id)
        .bind(c.channel.as_str())
        .bind(&c.contact_id)
        .bind(c.status.as_str())
        .bind(&c.assigned_agent)
        .bind(&c.queue)
        .bind(&c.flow_step)
        .bind(c.priority.as_str())
        .bind(&c.last_message_preview)
        .bind(c.version)
        .bind(c.created_at)
        .bind(c.updated_at)
        .bind(c.closed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE tenant_id = ? AND id = ?"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_conversation).transpose()
    }

    async fn update(
        &self,
        c: &Conversation,
        expected_version: i64,
    ) -> Result<Conversation> {
        let result = sqlx::query(
            "UPDATE conversations SET
                status = ?, assigned_agent = ?, queue = ?, flow_step = ?, priority = ?,
                last_message_preview = ?, version = ?, updated_at = ?, closed_at = ?
             WHERE tenant_id = ? AND id = ? AND version = ?",
        )
        .bind(c.status.as_str())
        .bind(&c.assigned_agent)
        .bind(&c.queue)
        .bind(&c.flow_step)
        .bind(c.priority.as_str())
        .bind(&c.last_message_preview)
        .bind(expected_version + 1)
        .bind(c.updated_at)
        .bind(c.closed_at)
        .bind(&c.tenant_id)
        .bind(&c.id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return if self.get(&c.tenant_id, &c.id).await?.is_some() {
                Err(Error::conflict(format!(
                    "conversation {} changed under us (expected version {expected_version})",
                    c.id
                )))
            } else {
                Err(Error::not_found(&c.id))
            };
        }

        let mut committed = c.clone();
        committed.version = expected_version + 1;
        Ok(committed)
    }

    async fn find_latest(
        &self,
        tenant_id: &str,
        contact_id: &str,
        channel: ChannelKind,
    ) -> Result<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE tenant_id = ? AND contact_id = ? AND channel = ?
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(tenant_id)
        .bind(contact_id)
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_conversation).transpose()
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>> {
        let mut sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE tenant_id = ?"
        );
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.assigned_agent.is_some() {
            sql.push_str(" AND assigned_agent = ?");
        }
        if filter.queue.is_some() {
            sql.push_str(" AND queue = ?");
        }
        sql.push_str(" ORDER BY updated_at DESC LIMIT ?");

        let mut query = sqlx::query_as::<_, ConversationRow>(&sql).bind(tenant_id);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(agent) = &filter.assigned_agent {
            query = query.bind(agent);
        }
        if let Some(queue) = &filter.queue {
            query = query.bind(queue);
        }
        let rows = query.bind(filter.limit()).fetch_all(&self.pool).await?;

        rows.into_iter().map(row_to_conversation).collect()
    }
}

// ── SqliteMessageStore ──────────────────────────────────────────────────────

/// SQLite-backed message store.
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the messages table schema.
    ///
    /// Schema is managed by sqlx migrations in production. This method is
    /// retained for tests that use in-memory databases.
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id                  TEXT PRIMARY KEY,
                conversation_id     TEXT NOT NULL,
                tenant_id           TEXT NOT NULL,
                sender              TEXT NOT NULL,
                content             TEXT NOT NULL,
                media               TEXT,
                delivery_status     TEXT,
                delivery_error      TEXT,
                provider_message_id TEXT,
                seq                 INTEGER NOT NULL,
                created_at          INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_conversation_seq
             ON messages (conversation_id, seq)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_provider
             ON messages (tenant_id, provider_message_id)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, message: Message) -> Result<Message> {
        let sender = serde_json::to_string(&message.sender)?;
        let media = message
            .media
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let (delivery_status, delivery_error) = match &message.delivery {
            Some(d) => (Some(d.status.as_str()), d.error.clone()),
            None => (None, None),
        };

        // seq is assigned inside the insert; callers hold the conversation
        // lock so two appends to one conversation cannot race.
        sqlx::query(
            "INSERT INTO messages
             (id, conversation_id, tenant_id, sender, content, media,
              delivery_status, delivery_error, provider_message_id, seq, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?,
                     (SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?),
                     ?)",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.tenant_id)
        .bind(&sender)
        .bind(&message.content)
        .bind(&media)
        .bind(delivery_status)
        .bind(&delivery_error)
        .bind(&message.provider_message_id)
        .bind(&message.conversation_id)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        let (seq,) = sqlx::query_as::<_, (i64,)>("SELECT seq FROM messages WHERE id = ?")
            .bind(&message.id)
            .fetch_one(&self.pool)
            .await?;

        let mut stored = message;
        stored.seq = seq;
        Ok(stored)
    }

    async fn get(&self, tenant_id: &str, message_id: &str) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE tenant_id = ? AND id = ?"
        ))
        .bind(tenant_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_message).transpose()
    }

    async fn list(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        limit: u32,
        before_seq: Option<i64>,
    ) -> Result<Vec<Message>> {
        let mut sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE tenant_id = ? AND conversation_id = ?"
        );
        if before_seq.is_some() {
            sql.push_str(" AND seq < ?");
        }
        sql.push_str(" ORDER BY seq DESC LIMIT ?");

        let mut query = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(tenant_id)
            .bind(conversation_id);
        if let Some(seq) = before_seq {
            query = query.bind(seq);
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;

        rows.into_iter().map(row_to_message).collect()
    }

    async fn set_delivery(
        &self,
        tenant_id: &str,
        message_id: &str,
        delivery: &DeliveryState,
        provider_message_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE messages SET
                delivery_status = ?,
                delivery_error = ?,
                provider_message_id = COALESCE(?, provider_message_id)
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(delivery.status.as_str())
        .bind(&delivery.error)
        .bind(provider_message_id)
        .bind(tenant_id)
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_provider_id(
        &self,
        tenant_id: &str,
        channel: ChannelKind,
        provider_message_id: &str,
    ) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT m.id, m.conversation_id, m.tenant_id, m.sender, m.content, m.media,
                    m.delivery_status, m.delivery_error, m.provider_message_id, m.seq,
                    m.created_at
             FROM messages m
             JOIN conversations c ON c.id = m.conversation_id
             WHERE m.tenant_id = ? AND c.channel = ? AND m.provider_message_id = ?",
        )
        .bind(tenant_id)
        .bind(channel.as_str())
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_message).transpose()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use attendo_common::types::Sender;

    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteConversationStore::init(&pool).await.unwrap();
        SqliteMessageStore::init(&pool).await.unwrap();
        pool
    }

    fn sample_message(conversation_id: &str, content: &str) -> Message {
        Message {
            id: attendo_common::new_id(),
            conversation_id: conversation_id.into(),
            tenant_id: "t1".into(),
            sender: Sender::Contact,
            content: content.into(),
            media: None,
            delivery: None,
            provider_message_id: None,
            seq: 0,
            created_at: attendo_common::now_ms(),
        }
    }

    #[tokio::test]
    async fn insert_get_round_trips() {
        let pool = test_pool().await;
        let store = SqliteConversationStore::new(pool);

        let c = Conversation::new("t1", "contact-1", ChannelKind::Telegram, None);
        store.insert(&c).await.unwrap();

        let got = store.get("t1", &c.id).await.unwrap().unwrap();
        assert_eq!(got.status, ConversationStatus::Open);
        assert_eq!(got.version, 1);
        assert!(store.get("t2", &c.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_is_compare_and_set() {
        let pool = test_pool().await;
        let store = SqliteConversationStore::new(pool);

        let mut c = Conversation::new("t1", "contact-1", ChannelKind::Telegram, None);
        store.insert(&c).await.unwrap();

        c.status = ConversationStatus::Pending;
        let committed = store.update(&c, 1).await.unwrap();
        assert_eq!(committed.version, 2);

        // A write based on the stale version must not commit.
        c.status = ConversationStatus::InProgress;
        let err = store.update(&c, 1).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        let stored = store.get("t1", &c.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConversationStatus::Pending);
    }

    #[tokio::test]
    async fn update_missing_conversation_is_not_found() {
        let pool = test_pool().await;
        let store = SqliteConversationStore::new(pool);

        let c = Conversation::new("t1", "contact-1", ChannelKind::Widget, None);
        let err = store.update(&c, 1).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn find_latest_picks_newest() {
        let pool = test_pool().await;
        let store = SqliteConversationStore::new(pool);

        let mut old = Conversation::new("t1", "contact-1", ChannelKind::Telegram, None);
        old.created_at = 1_000;
        let mut new = Conversation::new("t1", "contact-1", ChannelKind::Telegram, None);
        new.created_at = 2_000;
        store.insert(&old).await.unwrap();
        store.insert(&new).await.unwrap();

        let latest = store
            .find_latest("t1", "contact-1", ChannelKind::Telegram)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, new.id);

        assert!(store
            .find_latest("t1", "contact-1", ChannelKind::Widget)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn list_filters_by_status_and_agent() {
        let pool = test_pool().await;
        let store = SqliteConversationStore::new(pool);

        let mut a = Conversation::new("t1", "c-1", ChannelKind::Telegram, None);
        a.status = ConversationStatus::Pending;
        a.assigned_agent = Some("ag-1".into());
        let b = Conversation::new("t1", "c-2", ChannelKind::Telegram, None);
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();

        let pending = store
            .list("t1", &ConversationFilter {
                status: Some(ConversationStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);

        let mine = store
            .list("t1", &ConversationFilter {
                assigned_agent: Some("ag-1".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);

        let all = store.list("t1", &ConversationFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn append_assigns_sequential_seq_per_conversation() {
        let pool = test_pool().await;
        let store = SqliteMessageStore::new(pool);

        let m1 = store.append(sample_message("conv-1", "first")).await.unwrap();
        let m2 = store.append(sample_message("conv-1", "second")).await.unwrap();
        let other = store.append(sample_message("conv-2", "elsewhere")).await.unwrap();

        assert_eq!(m1.seq, 1);
        assert_eq!(m2.seq, 2);
        assert_eq!(other.seq, 1);
    }

    #[tokio::test]
    async fn list_pages_backwards_by_seq() {
        let pool = test_pool().await;
        let store = SqliteMessageStore::new(pool);

        for i in 0..5 {
            store
                .append(sample_message("conv-1", &format!("m{i}")))
                .await
                .unwrap();
        }

        let newest = store.list("t1", "conv-1", 2, None).await.unwrap();
        let seqs: Vec<i64> = newest.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![5, 4]);

        let older = store.list("t1", "conv-1", 10, Some(4)).await.unwrap();
        let seqs: Vec<i64> = older.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn delivery_round_trips_and_provider_id_sticks() {
        let pool = test_pool().await;
        let conversations = SqliteConversationStore::new(pool.clone());
        let store = SqliteMessageStore::new(pool);

        let conv = Conversation::new("t1", "c-1", ChannelKind::Telegram, None);
        conversations.insert(&conv).await.unwrap();

        let mut message = sample_message(&conv.id, "hi");
        message.sender = Sender::Agent { id: "ag-1".into() };
        message.delivery = Some(DeliveryState::sending());
        let message = store.append(message).await.unwrap();

        store
            .set_delivery(
                "t1",
                &message.id,
                &DeliveryState::of(DeliveryStatus::Sent),
                Some("prov-42"),
            )
            .await
            .unwrap();
        // A later status update without a provider id must not erase it.
        store
            .set_delivery(
                "t1",
                &message.id,
                &DeliveryState::of(DeliveryStatus::Delivered),
                None,
            )
            .await
            .unwrap();

        let got = store
            .find_by_provider_id("t1", ChannelKind::Telegram, "prov-42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.id, message.id);
        assert_eq!(got.delivery.unwrap().status, DeliveryStatus::Delivered);
        assert_eq!(got.provider_message_id.as_deref(), Some("prov-42"));

        assert!(store
            .find_by_provider_id("t1", ChannelKind::Widget, "prov-42")
            .await
            .unwrap()
            .is_none());
    }
}
