//! Channel adapter system.
//!
//! Each delivery channel (Telegram, the embedded web widget) implements the
//! [`ChannelAdapter`] trait with sub-traits for outbound messaging and health
//! probing. Adapters push normalized inbound traffic into the engine through
//! [`InboundSink`], which the gateway implements.

pub mod adapter;
pub mod error;
pub mod registry;
pub mod store;

pub use {
    adapter::{
        ChannelAdapter, ChannelHealth, ChannelOutbound, ChannelStatus, DeleteOutcome,
        DeliveryOutcome, DeliveryUpdate, InboundMessage, InboundSink, OutboundMessage,
    },
    error::{Error, Result},
    registry::AdapterRegistry,
    store::{ChannelAccountStore, StoredChannelAccount},
};
