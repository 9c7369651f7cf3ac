//! Embedded chat-widget channel.
//!
//! The widget has no external provider: sessions connect to this process
//! over the gateway's widget socket, and delivery is a frame push into the
//! session's queue. Receipts come back as client ack frames.

pub mod adapter;
pub mod frames;
pub mod registry;

pub use {
    adapter::{WidgetAccountConfig, WidgetAdapter},
    frames::{WidgetAck, WidgetClientFrame, WidgetFrame},
    registry::WidgetRegistry,
};
