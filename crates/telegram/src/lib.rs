//! Telegram channel adapter.
//!
//! Connects tenant bot accounts over Bot API long polling, normalizes
//! incoming chats into engine messages and delivers agent replies back,
//! media and stickers included.

pub mod adapter;
pub mod config;

mod bot;
mod inbound;
mod outbound;
mod state;

pub use {adapter::TelegramAdapter, config::TelegramAccountConfig};
