//! # Notification Services
//!
//! This crate provides the outbound channels used to alert operators when a
//! station receives a new fuel load: Telegram bot messages and CallMeBot
//! voice calls.

/// Telegram Bot API client.
pub mod telegram;
/// CallMeBot voice-call client.
pub mod callmebot;
/// Types and errors shared by the notification channels.
pub mod types;

pub use callmebot::{CallMeBotClient, classify_call_response};
pub use telegram::TelegramClient;
pub use types::{CallMeBotConfig, CallOutcome, NotificationError, TelegramConfig};
