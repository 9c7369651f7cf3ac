//! Engine wire protocol: the typed realtime event model pushed to observers,
//! the canonical message envelope, and the error shape REST handlers return.
//!
//! Protocol version 1. All frames are JSON.

use serde::{Deserialize, Serialize};

use attendo_common::types::{
    ChannelKind, ConversationStatus, DeliveryStatus, EvaluationOutcome, MediaKind, PresenceStatus,
    Priority, Sender,
};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 1;
/// Periodic maintenance tick (typing sweep, lock sweep).
pub const TICK_INTERVAL_MS: u64 = 30_000;
/// Inbound idempotency window for provider-replayed updates.
pub const DEDUPE_TTL_MS: u64 = 300_000; // 5 min
pub const DEDUPE_MAX_ENTRIES: usize = 1_000;
/// Frames retained for `replay_since` on observer reconnect.
pub const EVENT_REPLAY_CAPACITY: usize = 512;

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INVALID_TRANSITION: &str = "INVALID_TRANSITION";
    pub const ALREADY_CLOSED: &str = "ALREADY_CLOSED";
    pub const CROSS_TENANT: &str = "CROSS_TENANT";
    pub const ADDRESS_UNRESOLVED: &str = "ADDRESS_UNRESOLVED";
    pub const CHANNEL_TRANSPORT: &str = "CHANNEL_TRANSPORT";
    pub const UNSUPPORTED: &str = "UNSUPPORTED";
    pub const CONFLICT: &str = "CONFLICT";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const INTERNAL: &str = "INTERNAL";
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Hint whether retrying the same call can succeed without operator
    /// intervention (transport blips yes, cross-tenant forwards no).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: None,
        }
    }

    #[must_use]
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}

// ── Engine events ────────────────────────────────────────────────────────────

/// Realtime events emitted by engine mutations. Every observer-visible state
/// change has exactly one variant here; consumers match on `kind` and get
/// typed fields, never a raw table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    ConversationCreated {
        tenant_id: String,
        conversation_id: String,
        channel: ChannelKind,
        contact_id: String,
        status: ConversationStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        queue: Option<String>,
        version: i64,
    },
    /// Any non-closing conversation mutation: status change, forward, reopen.
    ConversationUpdated {
        tenant_id: String,
        conversation_id: String,
        status: ConversationStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        assigned_agent: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        queue: Option<String>,
        priority: Priority,
        version: i64,
    },
    ConversationClosed {
        tenant_id: String,
        conversation_id: String,
        closed_at: i64,
        version: i64,
    },
    MessageAppended {
        tenant_id: String,
        conversation_id: String,
        message_id: String,
        sender: Sender,
        preview: String,
        has_media: bool,
        created_at: i64,
    },
    MessageStatusChanged {
        tenant_id: String,
        conversation_id: String,
        message_id: String,
        status: DeliveryStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    PresenceChanged {
        tenant_id: String,
        agent_id: String,
        online: bool,
        status: PresenceStatus,
        updated_at: i64,
    },
    TypingSignal {
        tenant_id: String,
        /// Conversation id, or a composed key for agent-to-agent chats.
        scope: String,
        agent_id: String,
        expires_at: i64,
    },
    EvaluationDispatched {
        tenant_id: String,
        conversation_id: String,
        request_id: String,
        outcome: EvaluationOutcome,
    },
}

impl EngineEvent {
    /// Tenant the event belongs to, for subscription filtering.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        match self {
            Self::ConversationCreated { tenant_id, .. }
            | Self::ConversationUpdated { tenant_id, .. }
            | Self::ConversationClosed { tenant_id, .. }
            | Self::MessageAppended { tenant_id, .. }
            | Self::MessageStatusChanged { tenant_id, .. }
            | Self::PresenceChanged { tenant_id, .. }
            | Self::TypingSignal { tenant_id, .. }
            | Self::EvaluationDispatched { tenant_id, .. } => tenant_id,
        }
    }

    /// Conversation-scoped key for per-conversation subscriptions. Presence
    /// events have none; typing matches on its scope key.
    #[must_use]
    pub fn conversation_key(&self) -> Option<&str> {
        match self {
            Self::ConversationCreated {
                conversation_id, ..
            }
            | Self::ConversationUpdated {
                conversation_id, ..
            }
            | Self::ConversationClosed {
                conversation_id, ..
            }
            | Self::MessageAppended {
                conversation_id, ..
            }
            | Self::MessageStatusChanged {
                conversation_id, ..
            }
            | Self::EvaluationDispatched {
                conversation_id, ..
            } => Some(conversation_id),
            Self::TypingSignal { scope, .. } => Some(scope),
            Self::PresenceChanged { .. } => None,
        }
    }

    /// Event kind as its wire tag, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConversationCreated { .. } => "conversation_created",
            Self::ConversationUpdated { .. } => "conversation_updated",
            Self::ConversationClosed { .. } => "conversation_closed",
            Self::MessageAppended { .. } => "message_appended",
            Self::MessageStatusChanged { .. } => "message_status_changed",
            Self::PresenceChanged { .. } => "presence_changed",
            Self::TypingSignal { .. } => "typing_signal",
            Self::EvaluationDispatched { .. } => "evaluation_dispatched",
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Server-push frame delivered to realtime observers.
///
/// `seq` is globally monotonic; frames for one conversation always arrive in
/// `seq` order. Delivery is at-least-once: after `replay_since` a client may
/// see a frame twice and should dedupe on `seq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub r#type: String, // always "event"
    pub seq: u64,
    pub ts: i64,
    #[serde(flatten)]
    pub event: EngineEvent,
}

impl EventFrame {
    pub fn new(seq: u64, ts: i64, event: EngineEvent) -> Self {
        Self {
            r#type: "event".into(),
            seq,
            ts,
            event,
        }
    }
}

// ── Message envelope ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "in")]
    In,
    #[serde(rename = "out")]
    Out,
}

/// Canonical message representation crossing the engine boundary, both for
/// inbound webhook bodies and message listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub tenant_id: String,
    pub conversation_id: String,
    pub direction: Direction,
    pub sender: Sender,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<MediaKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_status: Option<DeliveryStatus>,
    pub message_id: String,
    pub created_at: i64,
}
