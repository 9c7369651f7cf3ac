//! REST surface for conversation lifecycle and messaging.

use std::sync::Arc;

use {
    attendo_channels::DeleteOutcome,
    attendo_common::types::{ChannelKind, ConversationStatus, ForwardTarget, MediaRef, Sender},
    attendo_conversations::ConversationFilter,
    axum::{
        Json,
        extract::{Path, Query, State},
        response::IntoResponse,
    },
    serde::Deserialize,
    tracing::info,
};

use crate::{
    error::{ApiError, ApiResult},
    state::EngineState,
};

#[derive(Debug, Deserialize)]
pub struct CreateConversationBody {
    pub tenant: String,
    pub contact: String,
    pub channel: ChannelKind,
    #[serde(default)]
    pub queue: Option<String>,
}

pub async fn create_conversation(
    State(state): State<Arc<EngineState>>,
    Json(body): Json<CreateConversationBody>,
) -> ApiResult<impl IntoResponse> {
    if body.tenant.trim().is_empty() || body.contact.trim().is_empty() {
        return Err(ApiError::validation("tenant and contact are required"));
    }
    let conversation = state
        .manager
        .create(&body.tenant, &body.contact, body.channel, body.queue)
        .await?;
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub tenant: String,
    pub status: Option<String>,
    pub agent: Option<String>,
    pub queue: Option<String>,
    pub limit: Option<u32>,
}

pub async fn list_conversations(
    State(state): State<Arc<EngineState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            ConversationStatus::parse(s)
                .ok_or_else(|| ApiError::validation(format!("unknown status: {s}")))
        })
        .transpose()?;

    let filter = ConversationFilter {
        status,
        assigned_agent: query.agent,
        queue: query.queue,
        limit: query.limit,
    };
    let conversations = state.manager.list(&query.tenant, &filter).await?;
    Ok(Json(serde_json::json!({ "conversations": conversations })))
}

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant: String,
}

pub async fn get_conversation(
    State(state): State<Arc<EngineState>>,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<impl IntoResponse> {
    let conversation = state
        .manager
        .get(&query.tenant, &id)
        .await?
        .ok_or_else(|| attendo_conversations::Error::not_found(&id))?;
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub tenant: String,
    pub limit: Option<u32>,
    pub before_seq: Option<i64>,
}

pub async fn list_messages(
    State(state): State<Arc<EngineState>>,
    Path(id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<impl IntoResponse> {
    // 404 for an unknown conversation, not an empty page.
    state
        .manager
        .get(&query.tenant, &id)
        .await?
        .ok_or_else(|| attendo_conversations::Error::not_found(&id))?;

    let messages = state
        .manager
        .messages(&query.tenant, &id, query.limit.unwrap_or(50), query.before_seq)
        .await?;
    let envelopes: Vec<_> = messages.iter().map(|m| m.envelope()).collect();
    Ok(Json(serde_json::json!({ "messages": envelopes })))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    pub tenant: String,
    pub sender: Sender,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media: Option<MediaRef>,
}

pub async fn send_message(
    State(state): State<Arc<EngineState>>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> ApiResult<impl IntoResponse> {
    if !body.sender.is_outbound() {
        return Err(ApiError::validation("sender must be an agent or the bot"));
    }
    if body.content.trim().is_empty() && body.media.is_none() {
        return Err(ApiError::validation("message needs content or media"));
    }

    let message = state
        .dispatcher
        .send_outbound(&body.tenant, &id, body.sender, &body.content, body.media)
        .await?;
    Ok(Json(message.envelope()))
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusBody {
    pub tenant: String,
    pub status: String,
    #[serde(default)]
    pub actor: Option<String>,
}

pub async fn change_status(
    State(state): State<Arc<EngineState>>,
    Path(id): Path<String>,
    Json(body): Json<ChangeStatusBody>,
) -> ApiResult<impl IntoResponse> {
    let target = ConversationStatus::parse(&body.status)
        .ok_or_else(|| ApiError::validation(format!("unknown status: {}", body.status)))?;

    let conversation = state.manager.change_status(&body.tenant, &id, target).await?;
    info!(
        tenant = %body.tenant,
        conversation = %id,
        status = %target,
        actor = body.actor.as_deref().unwrap_or("unknown"),
        "status changed via api"
    );
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize)]
pub struct ReopenBody {
    pub tenant: String,
    #[serde(default)]
    pub actor: Option<String>,
}

pub async fn reopen_conversation(
    State(state): State<Arc<EngineState>>,
    Path(id): Path<String>,
    Json(body): Json<ReopenBody>,
) -> ApiResult<impl IntoResponse> {
    let conversation = state.manager.reopen(&body.tenant, &id).await?;
    info!(
        tenant = %body.tenant,
        conversation = %id,
        actor = body.actor.as_deref().unwrap_or("unknown"),
        "conversation reopened via api"
    );
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize)]
pub struct ForwardBody {
    pub tenant: String,
    pub target: ForwardTarget,
}

pub async fn forward_conversation(
    State(state): State<Arc<EngineState>>,
    Path(id): Path<String>,
    Json(body): Json<ForwardBody>,
) -> ApiResult<impl IntoResponse> {
    let conversation = state.manager.forward(&body.tenant, &id, &body.target).await?;
    Ok(Json(conversation))
}

pub async fn delete_message(
    State(state): State<Arc<EngineState>>,
    Path((id, message_id)): Path<(String, String)>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state
        .dispatcher
        .delete_message(&query.tenant, &id, &message_id)
        .await?;
    let outcome = match outcome {
        DeleteOutcome::Deleted => "deleted",
        DeleteOutcome::Unsupported => "unsupported",
    };
    Ok(Json(serde_json::json!({ "outcome": outcome })))
}
