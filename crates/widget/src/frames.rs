use serde::{Deserialize, Serialize};

use attendo_common::types::{DeliveryStatus, MediaRef};

// ── Server → widget ─────────────────────────────────────────────────────────

/// Frame pushed to a connected widget session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetFrame {
    /// Agent or bot reply to render in the widget.
    Message {
        provider_message_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media: Option<MediaRef>,
        sent_at: i64,
    },
    /// Remove a previously delivered message from the widget.
    Retract { provider_message_id: String },
    /// The agent is typing toward this session.
    Typing,
}

// ── Widget → server ─────────────────────────────────────────────────────────

/// Frame a widget client sends over its session socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetClientFrame {
    /// Visitor message typed into the widget.
    Message {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media: Option<MediaRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_name: Option<String>,
    },
    /// Receipt for a server-pushed message.
    Ack {
        provider_message_id: String,
        status: WidgetAck,
    },
    /// The visitor is typing.
    Typing,
}

/// The two receipt levels a widget reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetAck {
    Delivered,
    Read,
}

impl WidgetAck {
    #[must_use]
    pub fn delivery_status(self) -> DeliveryStatus {
        match self {
            Self::Delivered => DeliveryStatus::Delivered,
            Self::Read => DeliveryStatus::Read,
        }
    }
}
