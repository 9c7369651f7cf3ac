//! Outbound message dispatch.
//!
//! Takes a persisted outbound message from `sending` to `sent` or `failed`
//! through the channel adapter for its conversation: resolve the contact's
//! provider address, pick the tenant's channel account, call the adapter
//! under a timeout, and record the outcome. An unresolved address
//! short-circuits to `failed` without touching the adapter.

pub mod dispatcher;
pub mod error;
pub mod policy;

pub use {
    dispatcher::{MessageDispatcher, ADDRESS_UNRESOLVED},
    error::{Error, Result},
    policy::{DeliveryPolicy, RetryPolicy},
};
