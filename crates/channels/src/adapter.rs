use async_trait::async_trait;

use attendo_common::types::{ChannelKind, DeliveryStatus, MediaRef};

use crate::error::Result;

// ── Outbound payloads ───────────────────────────────────────────────────────

/// Instruction to deliver one outbound message to a provider address.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub account_id: String,
    /// Provider address resolved from the contact's channel binding.
    pub address: String,
    pub content: String,
    pub media: Option<MediaRef>,
}

/// Returned by a successful provider send.
#[derive(Debug, Clone, Default)]
pub struct DeliveryOutcome {
    /// Provider-assigned message id, when the provider reports one. Needed to
    /// correlate later delivery receipts and to retract the message.
    pub provider_message_id: Option<String>,
}

/// Result of a remote delete attempt.
///
/// `Unsupported` is a declared capability gap, not a failure: callers surface
/// it as-is instead of retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Unsupported,
}

/// Account connectivity snapshot.
#[derive(Debug, Clone)]
pub struct ChannelHealth {
    pub connected: bool,
    pub account_id: String,
    pub details: Option<String>,
}

// ── Adapter trait family ────────────────────────────────────────────────────

/// Core adapter trait. Each delivery channel implements this.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Which channel this adapter serves.
    fn kind(&self) -> ChannelKind;

    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start an account connection.
    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()>;

    /// Stop an account connection.
    async fn stop_account(&mut self, account_id: &str) -> Result<()>;

    /// Outbound surface for sending and retracting messages.
    fn outbound(&self) -> Option<&dyn ChannelOutbound>;

    /// Status surface for health checks.
    fn status(&self) -> Option<&dyn ChannelStatus>;
}

/// Send messages through a channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    /// Deliver one message. `Ok` means the provider accepted the send;
    /// delivery receipts beyond that arrive through [`InboundSink`].
    async fn send(&self, outbound: &OutboundMessage) -> Result<DeliveryOutcome>;

    /// Retract a previously sent message on the provider side.
    async fn delete_message(
        &self,
        account_id: &str,
        address: &str,
        provider_message_id: &str,
    ) -> Result<DeleteOutcome>;

    /// Surface an agent typing indicator to the contact. No-op by default.
    async fn send_typing(&self, _account_id: &str, _address: &str) -> Result<()> {
        Ok(())
    }
}

/// Probe channel account health.
#[async_trait]
pub trait ChannelStatus: Send + Sync {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealth>;
}

// ── Inbound sink ────────────────────────────────────────────────────────────

/// A message from a contact, normalized by the adapter.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: ChannelKind,
    pub account_id: String,
    /// Tenant the account serves; adapters know it from account config.
    pub tenant_id: String,
    /// Provider address of the sender (Telegram chat id, widget session id).
    pub address: String,
    pub sender_name: Option<String>,
    pub content: String,
    pub media: Option<MediaRef>,
    /// Provider message id, used to drop replayed updates.
    pub provider_message_id: Option<String>,
}

/// Provider-reported delivery progress for an outbound message.
#[derive(Debug, Clone)]
pub struct DeliveryUpdate {
    pub channel: ChannelKind,
    pub account_id: String,
    pub provider_message_id: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
}

/// Sink for inbound channel traffic. The gateway provides the concrete
/// implementation, so adapters never depend on the engine.
#[async_trait]
pub trait InboundSink: Send + Sync {
    /// A contact message arrived on a channel account.
    async fn inbound_message(&self, inbound: InboundMessage);

    /// The provider reported delivery progress for an outbound message.
    async fn delivery_update(&self, update: DeliveryUpdate);

    /// An account hit an unrecoverable error and asks to be stopped.
    async fn account_failed(&self, channel: ChannelKind, account_id: &str, reason: &str);
}
