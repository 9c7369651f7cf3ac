use serde::{Deserialize, Serialize};

use {
    attendo_common::types::{
        ChannelKind, ConversationStatus, DeliveryState, MediaRef, Priority, Sender,
    },
    attendo_protocol::{Direction, MessageEnvelope},
};

/// Longest preview stored on a conversation, in characters.
pub const PREVIEW_MAX_CHARS: usize = 120;

/// One thread between a contact and the tenant, pinned to the channel it
/// arrived on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub tenant_id: String,
    pub channel: ChannelKind,
    pub contact_id: String,
    pub status: ConversationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// Position in the automated flow, None once a human owns the thread.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_step: Option<String>,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
    /// Bumped on every committed mutation; writes compare-and-set on it.
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    /// Set while the conversation is closed, cleared on reopen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<i64>,
}

impl Conversation {
    /// Fresh open conversation for a contact on a channel.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        contact_id: impl Into<String>,
        channel: ChannelKind,
        queue: Option<String>,
    ) -> Self {
        let now = attendo_common::now_ms();
        Self {
            id: attendo_common::new_id(),
            tenant_id: tenant_id.into(),
            channel,
            contact_id: contact_id.into(),
            status: ConversationStatus::Open,
            assigned_agent: None,
            queue,
            flow_step: None,
            priority: Priority::Normal,
            last_message_preview: None,
            version: 1,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }
}

/// One message in a conversation. `seq` is assigned by the store at append
/// time and orders messages within the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub tenant_id: String,
    pub sender: Sender,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
    /// Present on outbound messages only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryState>,
    /// Provider-side id, set once the channel accepted the message (outbound)
    /// or taken from the inbound payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    pub seq: i64,
    pub created_at: i64,
}

impl Message {
    /// Preview text for conversation lists, truncated on a char boundary.
    #[must_use]
    pub fn preview(&self) -> String {
        preview_of(&self.content, &self.media)
    }

    /// The wire representation crossing the engine boundary (message listings,
    /// webhook acks).
    #[must_use]
    pub fn envelope(&self) -> MessageEnvelope {
        MessageEnvelope {
            tenant_id: self.tenant_id.clone(),
            conversation_id: self.conversation_id.clone(),
            direction: if self.sender.is_outbound() {
                Direction::Out
            } else {
                Direction::In
            },
            sender: self.sender.clone(),
            content: self.content.clone(),
            media_url: self.media.as_ref().map(|m| m.url.clone()),
            media_kind: self.media.as_ref().map(|m| m.kind),
            provider_message_id: self.provider_message_id.clone(),
            delivery_status: self.delivery.as_ref().map(|d| d.status),
            message_id: self.id.clone(),
            created_at: self.created_at,
        }
    }
}

pub(crate) fn preview_of(content: &str, media: &Option<MediaRef>) -> String {
    if content.is_empty() {
        if let Some(media) = media {
            return format!("[{}]", media.kind);
        }
    }
    content.chars().take(PREVIEW_MAX_CHARS).collect()
}

/// Filter for conversation listings. Unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationFilter {
    pub status: Option<ConversationStatus>,
    pub assigned_agent: Option<String>,
    pub queue: Option<String>,
    pub limit: Option<u32>,
}

impl ConversationFilter {
    pub const DEFAULT_LIMIT: u32 = 50;

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}
