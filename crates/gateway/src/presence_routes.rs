//! REST surface for agent presence and typing indicators.

use std::sync::Arc;

use {
    attendo_common::types::PresenceStatus,
    axum::{
        Json,
        extract::{Query, State},
        response::IntoResponse,
    },
    serde::Deserialize,
    tracing::warn,
};

use crate::{
    error::{ApiError, ApiResult},
    state::EngineState,
};

#[derive(Debug, Deserialize)]
pub struct HeartbeatBody {
    pub tenant: String,
    pub agent: String,
    #[serde(default)]
    pub status: PresenceStatus,
}

pub async fn heartbeat(
    State(state): State<Arc<EngineState>>,
    Json(body): Json<HeartbeatBody>,
) -> ApiResult<impl IntoResponse> {
    if body.tenant.trim().is_empty() || body.agent.trim().is_empty() {
        return Err(ApiError::validation("tenant and agent are required"));
    }
    let record = state.presence.heartbeat(&body.tenant, &body.agent, body.status);
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct DisconnectBody {
    pub tenant: String,
    pub agent: String,
}

pub async fn disconnect(
    State(state): State<Arc<EngineState>>,
    Json(body): Json<DisconnectBody>,
) -> ApiResult<impl IntoResponse> {
    let record = state.presence.disconnect(&body.tenant, &body.agent);
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct PresenceQuery {
    pub tenant: String,
}

pub async fn list_presence(
    State(state): State<Arc<EngineState>>,
    Query(query): Query<PresenceQuery>,
) -> impl IntoResponse {
    let agents = state.presence.list(&query.tenant);
    Json(serde_json::json!({ "agents": agents }))
}

#[derive(Debug, Deserialize)]
pub struct TypingBody {
    pub tenant: String,
    pub scope: String,
    pub agent: String,
}

pub async fn set_typing(
    State(state): State<Arc<EngineState>>,
    Json(body): Json<TypingBody>,
) -> ApiResult<impl IntoResponse> {
    if body.scope.trim().is_empty() {
        return Err(ApiError::validation("scope is required"));
    }
    let expires_at = state.typing.set_typing(&body.tenant, &body.scope, &body.agent);

    // Mirror the indicator onto the contact's channel when the scope is a
    // conversation. Best effort: a provider hiccup never fails the call.
    if let Err(e) = state.dispatcher.notify_typing(&body.tenant, &body.scope).await {
        warn!(scope = %body.scope, error = %e, "channel typing indicator failed");
    }
    Ok(Json(serde_json::json!({ "expires_at": expires_at })))
}

#[derive(Debug, Deserialize)]
pub struct TypingQuery {
    pub tenant: String,
    pub scope: String,
}

pub async fn list_typing(
    State(state): State<Arc<EngineState>>,
    Query(query): Query<TypingQuery>,
) -> impl IntoResponse {
    let typists = state.typing.active_typists(&query.tenant, &query.scope);
    Json(serde_json::json!({ "typists": typists }))
}
