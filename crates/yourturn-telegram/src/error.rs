//! Telegram error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Invalid Telegram configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Telegram API error ({code}): {description}")]
    Api { code: i64, description: String },

    #[error("Telegram request timed out after {0}s")]
    Timeout(u64),

    #[error("Telegram bot is not connected")]
    NotConnected,
}

impl TelegramError {
    /// Operator hint for common failures
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Api { code, description } => {
                let description = description.to_lowercase();
                if *code == 401 || description.contains("unauthorized") {
                    Some("check your bot token, or get a new one from @BotFather")
                } else if description.contains("chat not found") {
                    Some("make sure you have sent a message to your bot first")
                } else {
                    None
                }
            }
            Self::Http(e) if e.is_connect() => Some("check your internet connection"),
            Self::Timeout(_) => Some("the Bot API is slow or unreachable, try again later"),
            _ => None,
        }
    }

    /// Message with the hint appended, for logs and user-facing replies
    pub fn describe(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{} ({})", self, hint),
            None => self.to_string(),
        }
    }
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        // Request URLs embed the bot token
        Self::Http(e.without_url())
    }
}
