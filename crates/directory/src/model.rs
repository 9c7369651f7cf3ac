use serde::{Deserialize, Serialize};

use attendo_common::types::ChannelKind;

/// A support agent registered in a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub tenant_id: String,
    pub id: String,
    pub display_name: String,
}

/// A routing queue agents pull conversations from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub tenant_id: String,
    pub id: String,
    pub name: String,
}

/// An end customer. Created implicitly the first time an unknown address
/// writes in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub tenant_id: String,
    pub id: String,
    pub display_name: Option<String>,
    pub created_at: i64,
}

/// Links a contact to their provider address on one channel.
///
/// Unique per (tenant, contact, channel) and per (tenant, channel, address):
/// a contact has at most one address per channel, and an address identifies
/// at most one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactChannelBinding {
    pub tenant_id: String,
    pub contact_id: String,
    pub channel: ChannelKind,
    pub address: String,
    pub created_at: i64,
    pub updated_at: i64,
}

// ── Tenant settings ─────────────────────────────────────────────────────────

/// Per-tenant behavior switches, stored as one JSON blob per tenant so new
/// settings never need a schema change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantSettings {
    pub evaluation: EvaluationSettings,
    pub signature: SignatureSettings,
}

/// Post-closure satisfaction survey switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    pub enabled: bool,
    pub send_on_close: bool,
    /// Survey message. Empty falls back to the server-wide default text.
    pub survey_text: String,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            send_on_close: true,
            survey_text: String::new(),
        }
    }
}

/// Agent signature appended to outbound agent messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureSettings {
    pub enabled: bool,
    /// `{agent}` expands to the agent display name.
    pub template: String,
}

impl Default for SignatureSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            template: "— {agent}".into(),
        }
    }
}

impl SignatureSettings {
    /// Apply the signature to outbound content. Returns the content untouched
    /// when signatures are disabled.
    #[must_use]
    pub fn apply(&self, content: &str, agent_display_name: &str) -> String {
        if !self.enabled {
            return content.to_string();
        }
        let signature = self.template.replace("{agent}", agent_display_name);
        if signature.is_empty() {
            return content.to_string();
        }
        format!("{content}\n\n{signature}")
    }
}
