//! Server assembly and startup.
//!
//! [`build_engine_state`] wires every store, tracker and adapter around one
//! SQLite pool; [`build_engine_app`] turns that state into the HTTP router
//! (shared between production startup and tests); [`start_gateway`] runs the
//! whole engine.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    anyhow::Context,
    attendo_channels::{
        AdapterRegistry, ChannelAccountStore, InboundSink, StoredChannelAccount,
    },
    attendo_common::{now_ms, types::ChannelKind},
    attendo_config::AttendoConfig,
    attendo_conversations::{ConversationManager, SqliteConversationStore, SqliteMessageStore},
    attendo_directory::{
        BindingStore, Directory, EvaluationSettings, SqliteBindingStore, SqliteDirectory,
        TenantSettings,
    },
    attendo_dispatch::{DeliveryPolicy, MessageDispatcher, RetryPolicy},
    attendo_evaluation::{EvaluationTrigger, SqliteEvaluationStore, SurveySender},
    attendo_events::EventBus,
    attendo_presence::{PresenceTracker, TypingTracker},
    attendo_protocol::{PROTOCOL_VERSION, TICK_INTERVAL_MS},
    attendo_telegram::TelegramAdapter,
    attendo_widget::{WidgetAdapter, WidgetRegistry},
    axum::{
        Json, Router,
        extract::State,
        response::IntoResponse,
        routing::{delete, get, post},
    },
    sqlx::sqlite::{SqlitePool, SqlitePoolOptions},
    tokio::sync::RwLock,
    tower_http::cors::{Any, CorsLayer},
    tracing::{info, warn},
};

use crate::{
    accounts::SqliteChannelAccountStore, channel_routes, conversation_routes, presence_routes,
    sink::EngineSink, state::EngineState, ws,
};

// ── Wiring ──────────────────────────────────────────────────────────────────

/// Build the full engine around an already-migrated pool.
///
/// Adapters are registered but no accounts are started; call
/// [`start_enabled_accounts`] for that. Tests skip it and drive the stores
/// directly.
pub async fn build_engine_state(
    pool: SqlitePool,
    config: &AttendoConfig,
) -> anyhow::Result<Arc<EngineState>> {
    let tenant_defaults = TenantSettings {
        evaluation: EvaluationSettings {
            enabled: config.evaluation.enabled,
            send_on_close: config.evaluation.send_on_close,
            survey_text: config.evaluation.survey_text.clone(),
        },
        ..TenantSettings::default()
    };

    let directory = Arc::new(SqliteDirectory::with_default_settings(
        pool.clone(),
        tenant_defaults,
    ));
    let bindings: Arc<dyn BindingStore> = Arc::new(SqliteBindingStore::new(pool.clone()));
    let accounts: Arc<dyn ChannelAccountStore> = Arc::new(SqliteChannelAccountStore::new(
        pool.clone(),
    ));
    let bus = Arc::new(EventBus::default());

    let manager = Arc::new(ConversationManager::new(
        Arc::new(SqliteConversationStore::new(pool.clone())),
        Arc::new(SqliteMessageStore::new(pool.clone())),
        Arc::clone(&directory) as Arc<dyn Directory>,
        Arc::clone(&bus),
    ));

    let registry = Arc::new(RwLock::new(AdapterRegistry::new()));
    let policy = DeliveryPolicy {
        send_timeout: Duration::from_secs(config.delivery.send_timeout_secs),
        retry: RetryPolicy {
            enabled: config.delivery.retry.enabled,
            max_attempts: config.delivery.retry.max_attempts,
            backoff: Duration::from_millis(config.delivery.retry.backoff_ms),
        },
    };
    let dispatcher = Arc::new(MessageDispatcher::new(
        Arc::clone(&manager),
        Arc::clone(&bindings),
        Arc::clone(&directory) as Arc<dyn Directory>,
        Arc::clone(&accounts),
        Arc::clone(&registry),
        policy,
    ));

    let trigger = Arc::new(EvaluationTrigger::new(
        Arc::new(SqliteEvaluationStore::new(pool.clone())),
        Arc::clone(&bindings),
        Arc::clone(&directory) as Arc<dyn Directory>,
        Arc::clone(&dispatcher) as Arc<dyn SurveySender>,
        Arc::clone(&bus),
        config.evaluation.survey_text.clone(),
    ));
    manager.set_close_hook(trigger).await;

    let presence = Arc::new(PresenceTracker::new(Arc::clone(&bus)));
    let typing = Arc::new(TypingTracker::new(
        Arc::clone(&bus),
        Duration::from_secs(config.presence.typing_ttl_secs),
    ));

    let widget = Arc::new(WidgetRegistry::new());
    let sink = Arc::new(EngineSink::new(
        Arc::clone(&manager),
        Arc::clone(&bindings),
        Arc::clone(&accounts),
        Arc::clone(&registry),
    ));

    {
        let mut reg = registry.write().await;
        reg.register(Box::new(TelegramAdapter::new(
            Arc::clone(&sink) as Arc<dyn InboundSink>
        )));
        reg.register(Box::new(WidgetAdapter::new(Arc::clone(&widget))));
    }

    Ok(Arc::new(EngineState {
        manager,
        dispatcher,
        presence,
        typing,
        bus,
        bindings,
        accounts,
        registry,
        widget,
        sink,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Mirror config-declared channel accounts into the account store.
///
/// Upserts are idempotent, so editing the config and restarting converges the
/// store. Accounts created through the store by other means are left alone.
pub async fn sync_accounts_from_config(
    state: &EngineState,
    config: &AttendoConfig,
) -> anyhow::Result<()> {
    let mut tenants: Vec<String> = Vec::new();
    for (account_id, telegram) in &config.channels.telegram {
        let blob =
            serde_json::to_value(telegram).context("serialize telegram account config")?;
        state
            .accounts
            .upsert(StoredChannelAccount {
                channel: ChannelKind::Telegram,
                account_id: account_id.clone(),
                tenant_id: telegram.tenant_id.clone(),
                config: blob,
                enabled: telegram.enabled,
                created_at: now_ms(),
                updated_at: now_ms(),
            })
            .await?;
        if !tenants.contains(&telegram.tenant_id) {
            tenants.push(telegram.tenant_id.clone());
        }
    }

    // The widget has no per-account credentials, so every tenant named in the
    // config gets one implicitly.
    if config.channels.widget.enabled {
        for tenant in tenants {
            state
                .accounts
                .upsert(StoredChannelAccount {
                    channel: ChannelKind::Widget,
                    account_id: format!("widget-{tenant}"),
                    tenant_id: tenant.clone(),
                    config: serde_json::json!({ "tenant_id": tenant }),
                    enabled: true,
                    created_at: now_ms(),
                    updated_at: now_ms(),
                })
                .await?;
        }
    }
    Ok(())
}

/// Start every enabled stored account on its adapter. Failures are logged and
/// skipped so one bad token does not keep the whole engine down.
pub async fn start_enabled_accounts(state: &EngineState) {
    let stored = match state.accounts.list_enabled().await {
        Ok(list) => list,
        Err(e) => {
            warn!(error = %e, "could not list channel accounts");
            return;
        },
    };

    let mut registry = state.registry.write().await;
    for account in stored {
        let Some(adapter) = registry.get_mut(account.channel) else {
            warn!(
                channel = %account.channel,
                account_id = %account.account_id,
                "no adapter registered for stored account"
            );
            continue;
        };
        match adapter
            .start_account(&account.account_id, account.config.clone())
            .await
        {
            Ok(()) => info!(
                channel = %account.channel,
                account_id = %account.account_id,
                tenant_id = %account.tenant_id,
                "channel account started"
            ),
            Err(e) => warn!(
                channel = %account.channel,
                account_id = %account.account_id,
                error = %e,
                "channel account failed to start"
            ),
        }
    }
}

fn spawn_tick_task(state: Arc<EngineState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
        loop {
            interval.tick().await;
            state.manager.sweep_locks();
            state.typing.sweep();
        }
    });
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Build the engine router (shared between production startup and tests).
pub fn build_engine_app(state: Arc<EngineState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/conversations",
            post(conversation_routes::create_conversation)
                .get(conversation_routes::list_conversations),
        )
        .route(
            "/api/conversations/{id}",
            get(conversation_routes::get_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(conversation_routes::list_messages).post(conversation_routes::send_message),
        )
        .route(
            "/api/conversations/{id}/messages/{message_id}",
            delete(conversation_routes::delete_message),
        )
        .route(
            "/api/conversations/{id}/status",
            post(conversation_routes::change_status),
        )
        .route(
            "/api/conversations/{id}/reopen",
            post(conversation_routes::reopen_conversation),
        )
        .route(
            "/api/conversations/{id}/forward",
            post(conversation_routes::forward_conversation),
        )
        .route("/api/presence/heartbeat", post(presence_routes::heartbeat))
        .route("/api/presence/disconnect", post(presence_routes::disconnect))
        .route("/api/presence", get(presence_routes::list_presence))
        .route(
            "/api/typing",
            post(presence_routes::set_typing).get(presence_routes::list_typing),
        )
        .route("/api/channels", get(channel_routes::list_accounts))
        .route(
            "/api/channels/{channel}/{account}/health",
            get(channel_routes::account_health),
        )
        .route("/hooks/{channel}/{account}", post(channel_routes::inbound_hook))
        .route(
            "/hooks/{channel}/{account}/status",
            post(channel_routes::status_hook),
        )
        .route("/ws", get(ws::events_upgrade))
        .route("/ws/widget", get(ws::widget_upgrade))
        .layer(cors)
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<EngineState>>) -> impl IntoResponse {
    let channels = state.registry.read().await.list();
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "protocol": PROTOCOL_VERSION,
        "channels": channels,
    }))
}

// ── Startup ─────────────────────────────────────────────────────────────────

/// Open the engine database. A literal `:memory:` storage path keeps
/// everything ephemeral.
pub async fn open_pool(config: &AttendoConfig) -> anyhow::Result<SqlitePool> {
    let path = config.storage.database_path();
    if path.as_os_str() == ":memory:" {
        // One connection only: each pooled connection would otherwise open
        // its own empty in-memory database.
        return SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("open in-memory database");
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let db_url = format!("sqlite:{}?mode=rwc", path.display());
    SqlitePool::connect(&db_url)
        .await
        .with_context(|| format!("open database at {}", path.display()))
}

/// Start the engine HTTP + WebSocket server and run until shutdown.
pub async fn start_gateway(config: AttendoConfig) -> anyhow::Result<()> {
    let pool = open_pool(&config).await?;
    crate::run_migrations(&pool).await?;

    let state = build_engine_state(pool, &config).await?;
    sync_accounts_from_config(&state, &config).await?;
    start_enabled_accounts(&state).await;

    let app = build_engine_app(Arc::clone(&state));
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    let addr = listener.local_addr()?;

    // Startup banner.
    let channel_names = state
        .registry
        .read()
        .await
        .list()
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let lines = vec![
        format!("attendo engine v{}", state.version),
        format!("protocol v{PROTOCOL_VERSION}, listening on http://{addr}"),
        format!("channels: {channel_names}"),
        format!("db: {}", config.storage.database_path().display()),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    spawn_tick_task(Arc::clone(&state));

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
