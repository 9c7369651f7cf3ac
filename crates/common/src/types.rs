//! Domain vocabulary shared across the engine: channels, conversation and
//! delivery lifecycles, senders, media, forwarding targets.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generate a fresh opaque id (UUID v4, hyphenated).
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── ChannelKind ─────────────────────────────────────────────────────────────

/// The closed set of delivery channels the engine can route to.
///
/// Adding a channel means adding a variant here and registering an adapter
/// for it; free-form channel strings are not accepted anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Telegram,
    Widget,
}

impl ChannelKind {
    /// All variants, for iteration.
    pub const ALL: &'static [ChannelKind] = &[Self::Telegram, Self::Widget];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Widget => "widget",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "telegram" => Some(Self::Telegram),
            "widget" => Some(Self::Widget),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ConversationStatus ──────────────────────────────────────────────────────

/// Lifecycle state of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    Pending,
    InProgress,
    Resolved,
    Closed,
}

impl ConversationStatus {
    pub const ALL: &'static [ConversationStatus] = &[
        Self::Open,
        Self::Pending,
        Self::InProgress,
        Self::Resolved,
        Self::Closed,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Whether an explicit status change from `self` to `target` is allowed.
    ///
    /// `open`, `pending` and `in_progress` move freely between each other and
    /// into `resolved` or `closed`. `resolved` can only proceed to `closed`.
    /// `closed` accepts nothing here: a closed conversation comes back only
    /// through inbound contact activity or an explicit reopen.
    #[must_use]
    pub fn can_transition_to(self, target: ConversationStatus) -> bool {
        if self == target {
            return false;
        }
        match self {
            Self::Open | Self::Pending | Self::InProgress => true,
            Self::Resolved => matches!(target, Self::Closed),
            Self::Closed => false,
        }
    }

    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Priority ────────────────────────────────────────────────────────────────

/// Conversation priority, ordered from least to most urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Sender ──────────────────────────────────────────────────────────────────

/// Who authored a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Sender {
    /// The customer on the far end of the channel.
    Contact,
    /// A human agent, identified by their directory id.
    Agent { id: String },
    /// The platform itself (automated flows, surveys).
    Bot,
}

impl Sender {
    /// Outbound messages carry delivery state; inbound ones do not.
    #[must_use]
    pub fn is_outbound(&self) -> bool {
        !matches!(self, Self::Contact)
    }

    #[must_use]
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Agent { id } => Some(id),
            _ => None,
        }
    }
}

// ── Media ───────────────────────────────────────────────────────────────────

/// Kind of media attachment, determines how adapters shape the provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Document,
    Sticker,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Document => "document",
            Self::Sticker => "sticker",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "document" => Some(Self::Document),
            "sticker" => Some(Self::Sticker),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media attachment referenced by URL. The engine never stores payload
/// bytes; providers fetch from the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

// ── Delivery lifecycle ──────────────────────────────────────────────────────

/// Provider-facing delivery progress of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Position on the forward path. `failed` has no rank; it is terminal and
    /// reachable only from `sending` or `sent`.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Sending => Some(0),
            Self::Sent => Some(1),
            Self::Delivered => Some(2),
            Self::Read => Some(3),
            Self::Failed => None,
        }
    }

    /// Whether a callback moving `self` to `target` advances the delivery
    /// state. Duplicate and regressive callbacks do not; forward skips
    /// (a provider reporting `read` before we saw `delivered`) do.
    #[must_use]
    pub fn can_advance_to(self, target: DeliveryStatus) -> bool {
        match (self, target) {
            (Self::Sending | Self::Sent, Self::Failed) => true,
            (_, Self::Failed) | (Self::Failed, _) => false,
            (from, to) => match (from.rank(), to.rank()) {
                (Some(f), Some(t)) => t > f,
                _ => false,
            },
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Read | Self::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state embedded in an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryState {
    pub status: DeliveryStatus,
    /// Provider failure reason, present when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryState {
    #[must_use]
    pub fn sending() -> Self {
        Self {
            status: DeliveryStatus::Sending,
            error: None,
        }
    }

    #[must_use]
    pub fn of(status: DeliveryStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Failed,
            error: Some(reason.into()),
        }
    }
}

// ── Presence ────────────────────────────────────────────────────────────────

/// Agent availability advertised to teammates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    #[default]
    Available,
    Busy,
    Away,
}

impl PresenceStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::Away => "away",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ForwardTarget ───────────────────────────────────────────────────────────

/// Destination of a conversation forward: exactly one of a specific agent, a
/// queue, or back to the automated bot flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForwardTarget {
    Agent { id: String },
    Queue { id: String },
    Bot,
}

// ── EvaluationOutcome ───────────────────────────────────────────────────────

/// Final state of a post-closure evaluation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationOutcome {
    /// Claimed but not dispatched yet.
    Pending,
    Sent,
    /// Dispatch was deliberately not attempted (no resolvable address).
    Skipped,
    Failed,
}

impl EvaluationOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for EvaluationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
