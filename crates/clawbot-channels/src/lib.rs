//! Clawbot channels — chat platforms connected to the message bus.
//!
//! - **base**: the `Channel` trait
//! - **manager**: `ChannelManager`, running channels and routing replies
//! - **commands**: bot commands, `/status` text and the allow-list
//! - **formatting**: Markdown → Telegram HTML and message splitting
//!
//! The Telegram adapter is behind the `telegram` feature.

pub mod base;
pub mod commands;
pub mod formatting;
pub mod manager;

#[cfg(feature = "telegram")]
pub mod telegram;

pub use base::Channel;
pub use commands::BotStatus;
pub use manager::ChannelManager;
