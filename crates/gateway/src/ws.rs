//! WebSocket endpoints: the agent event stream and the widget transport.

use std::sync::Arc;

use {
    attendo_channels::{DeliveryUpdate, InboundMessage, InboundSink, StoredChannelAccount},
    attendo_common::{new_id, types::ChannelKind},
    attendo_events::EventFilter,
    attendo_protocol::EventFrame,
    attendo_widget::WidgetClientFrame,
    axum::{
        extract::{
            Query, State,
            ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        },
        response::IntoResponse,
    },
    futures::{SinkExt, StreamExt, stream::SplitSink},
    serde::Deserialize,
    tracing::{debug, info, warn},
};

use crate::{
    error::{ApiError, ApiResult},
    state::EngineState,
};

// ── Agent event stream ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub tenant: Option<String>,
    pub conversation: Option<String>,
    pub since_seq: Option<u64>,
}

pub async fn events_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<EventsQuery>,
    State(state): State<Arc<EngineState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| events_connection(socket, state, query))
}

async fn events_connection(socket: WebSocket, state: Arc<EngineState>, query: EventsQuery) {
    let conn_id = new_id();
    let filter = EventFilter {
        tenant_id: query.tenant,
        conversation_id: query.conversation,
    };

    // Subscribe before replaying: a frame published in between arrives twice,
    // never not at all. Clients dedupe on seq.
    let (subscription_id, mut frames) = state.bus.subscribe(filter.clone());
    info!(conn_id = %conn_id, "event stream connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    if let Some(since_seq) = query.since_seq {
        for frame in state.bus.replay_since(since_seq) {
            if !filter.matches(&frame.event) {
                continue;
            }
            if send_frame(&mut ws_tx, &frame).await.is_err() {
                state.bus.unsubscribe(subscription_id);
                return;
            }
        }
    }

    let write_handle = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if send_frame(&mut ws_tx, &frame).await.is_err() {
                break;
            }
        }
    });

    // The read half only tells us when the peer goes away; agents do not
    // speak on this socket.
    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.bus.unsubscribe(subscription_id);
    write_handle.abort();
    info!(conn_id = %conn_id, "event stream closed");
}

async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, WsMessage>,
    frame: &EventFrame,
) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(text) => ws_tx.send(WsMessage::Text(text.into())).await,
        Err(e) => {
            warn!(error = %e, "event frame serialization failed");
            Ok(())
        }
    }
}

// ── Widget transport ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WidgetQuery {
    pub tenant: String,
    pub session: String,
}

pub async fn widget_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<WidgetQuery>,
    State(state): State<Arc<EngineState>>,
) -> ApiResult<impl IntoResponse> {
    if query.session.trim().is_empty() {
        return Err(ApiError::validation("session is required"));
    }
    // Resolve the tenant's widget account before upgrading; a tenant without
    // one gets a plain HTTP error instead of a doomed socket.
    let account = state
        .accounts
        .find_for_tenant(&query.tenant, ChannelKind::Widget)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("no widget account for tenant {}", query.tenant))
        })?;
    Ok(ws.on_upgrade(move |socket| widget_connection(socket, state, account, query)))
}

async fn widget_connection(
    socket: WebSocket,
    state: Arc<EngineState>,
    account: StoredChannelAccount,
    query: WidgetQuery,
) {
    let WidgetQuery { tenant, session } = query;
    let mut frames = state.widget.register(&account.account_id, &session);
    info!(session_id = %session, tenant = %tenant, "widget session connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let write_handle = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = ws_rx.next().await {
        let text = match message {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        match serde_json::from_str::<WidgetClientFrame>(&text) {
            Ok(frame) => handle_widget_frame(&state, &account, &tenant, &session, frame).await,
            Err(e) => {
                debug!(session_id = %session, error = %e, "unreadable widget frame dropped");
            }
        }
    }

    write_handle.abort();
    // A reconnect may already have replaced this registration; only drop the
    // entry when the registered stream is the dead one.
    if !state.widget.is_connected(&session) {
        state.widget.unregister(&session);
    }
    info!(session_id = %session, "widget session closed");
}

async fn handle_widget_frame(
    state: &EngineState,
    account: &StoredChannelAccount,
    tenant_id: &str,
    session_id: &str,
    frame: WidgetClientFrame,
) {
    match frame {
        WidgetClientFrame::Message {
            content,
            media,
            sender_name,
        } => {
            if content.trim().is_empty() && media.is_none() {
                debug!(session_id, "empty widget message dropped");
                return;
            }
            let inbound = InboundMessage {
                channel: ChannelKind::Widget,
                account_id: account.account_id.clone(),
                tenant_id: tenant_id.to_string(),
                address: session_id.to_string(),
                sender_name,
                content,
                media,
                provider_message_id: None,
            };
            if let Err(e) = state.sink.ingest(inbound).await {
                warn!(session_id, error = %e, "widget message ingest failed");
            }
        }
        WidgetClientFrame::Ack {
            provider_message_id,
            status,
        } => {
            state
                .sink
                .delivery_update(DeliveryUpdate {
                    channel: ChannelKind::Widget,
                    account_id: account.account_id.clone(),
                    provider_message_id,
                    status: status.delivery_status(),
                    error: None,
                })
                .await;
        }
        WidgetClientFrame::Typing => {
            // The visitor is typing; stamp it on their active conversation so
            // watching agents see it. No binding yet means no conversation to
            // scope to, so nothing to signal.
            let Ok(Some(binding)) = state
                .bindings
                .resolve_address(tenant_id, ChannelKind::Widget, session_id)
                .await
            else {
                return;
            };
            let Ok(Some(conversation)) = state
                .manager
                .find_active(tenant_id, &binding.contact_id, ChannelKind::Widget)
                .await
            else {
                return;
            };
            state
                .typing
                .set_typing(tenant_id, &conversation.id, &binding.contact_id);
        }
    }
}
