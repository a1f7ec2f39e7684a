//! YourTurn Telegram channel
//!
//! Delivers questions through the Telegram Bot API and routes replies from
//! the configured chat back into the session manager.

pub mod api;
pub mod channel;
pub mod config;
pub mod error;

pub use api::BotClient;
pub use channel::{TelegramChannel, format_question};
pub use config::TelegramConfig;
pub use error::TelegramError;

pub type Result<T> = std::result::Result<T, TelegramError>;
