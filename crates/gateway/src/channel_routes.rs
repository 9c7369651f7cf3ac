//! Channel-facing HTTP surface: inbound webhooks, delivery callbacks, and
//! account health for operators.

use std::sync::Arc;

use {
    attendo_channels::{DeliveryUpdate, InboundMessage},
    attendo_common::types::{ChannelKind, DeliveryStatus, MediaKind, MediaRef},
    axum::{
        Json,
        extract::{Path, State},
        response::IntoResponse,
    },
    serde::Deserialize,
};

use crate::{
    error::{ApiError, ApiResult},
    state::EngineState,
};

fn parse_channel(value: &str) -> ApiResult<ChannelKind> {
    ChannelKind::parse(value)
        .ok_or_else(|| ApiError::validation(format!("unknown channel: {value}")))
}

/// Inbound wire form posted by providers (or provider bridges). The engine
/// fills in tenant and ids; the provider only knows its own address space.
#[derive(Debug, Deserialize)]
pub struct InboundHookBody {
    pub address: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_kind: Option<MediaKind>,
    #[serde(default)]
    pub provider_message_id: Option<String>,
}

pub async fn inbound_hook(
    State(state): State<Arc<EngineState>>,
    Path((channel, account_id)): Path<(String, String)>,
    Json(body): Json<InboundHookBody>,
) -> ApiResult<impl IntoResponse> {
    let channel = parse_channel(&channel)?;
    let account = state
        .accounts
        .get(channel, &account_id)
        .await?
        .filter(|a| a.enabled)
        .ok_or_else(|| attendo_channels::Error::unknown_account(&account_id))?;

    if body.address.trim().is_empty() {
        return Err(ApiError::validation("address is required"));
    }
    let media = match (body.media_url, body.media_kind) {
        (Some(url), Some(kind)) => Some(MediaRef { url, kind }),
        (None, None) => None,
        _ => {
            return Err(ApiError::validation(
                "media_url and media_kind go together",
            ));
        }
    };
    if body.content.trim().is_empty() && media.is_none() {
        return Err(ApiError::validation("message needs content or media"));
    }

    let appended = state
        .sink
        .ingest(InboundMessage {
            channel,
            account_id: account.account_id,
            tenant_id: account.tenant_id,
            address: body.address,
            sender_name: body.sender_name,
            content: body.content,
            media,
            provider_message_id: body.provider_message_id,
        })
        .await?;

    match appended {
        Some((_, message)) => Ok(Json(message.envelope()).into_response()),
        None => Ok(Json(serde_json::json!({ "duplicate": true })).into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusHookBody {
    pub provider_message_id: String,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub error: Option<String>,
}

pub async fn status_hook(
    State(state): State<Arc<EngineState>>,
    Path((channel, account_id)): Path<(String, String)>,
    Json(body): Json<StatusHookBody>,
) -> ApiResult<impl IntoResponse> {
    let channel = parse_channel(&channel)?;
    let advanced = state
        .sink
        .apply_delivery(DeliveryUpdate {
            channel,
            account_id,
            provider_message_id: body.provider_message_id,
            status: body.status,
            error: body.error,
        })
        .await?;
    Ok(Json(serde_json::json!({ "advanced": advanced })))
}

/// Stored accounts, without the config blob (it holds tokens).
pub async fn list_accounts(
    State(state): State<Arc<EngineState>>,
) -> ApiResult<impl IntoResponse> {
    let accounts: Vec<_> = state
        .accounts
        .list()
        .await?
        .into_iter()
        .map(|a| {
            serde_json::json!({
                "channel": a.channel,
                "account_id": a.account_id,
                "tenant_id": a.tenant_id,
                "enabled": a.enabled,
                "created_at": a.created_at,
                "updated_at": a.updated_at,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "accounts": accounts })))
}

pub async fn account_health(
    State(state): State<Arc<EngineState>>,
    Path((channel, account_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let channel = parse_channel(&channel)?;

    let registry = state.registry.read().await;
    let Some(status) = registry.get(channel).and_then(|a| a.status()) else {
        return Ok(Json(serde_json::json!({
            "connected": false,
            "account_id": account_id,
            "details": "adapter not running",
        })));
    };
    let health = status.probe(&account_id).await?;
    Ok(Json(serde_json::json!({
        "connected": health.connected,
        "account_id": health.account_id,
        "details": health.details,
    })))
}
