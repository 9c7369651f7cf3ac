//! Shared types, error definitions, and utilities used across all attendo crates.

pub mod error;
pub mod time;
pub mod types;

pub use {error::FromMessage, time::now_ms, types::new_id};
