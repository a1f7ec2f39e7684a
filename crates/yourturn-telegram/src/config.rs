//! Telegram configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Result, TelegramError};

/// Telegram bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Use Telegram as the reply channel when credentials are present
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Bot token from @BotFather (`<bot id>:<secret>`)
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Chat the bot talks to
    #[serde(default)]
    pub chat_id: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Upper bound for sending one message
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Pause after a failed getUpdates call
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_send_timeout_secs() -> u64 {
    10
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_retry_delay_secs() -> u64 {
    5
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bot_token: None,
            chat_id: None,
            api_base_url: default_api_base_url(),
            send_timeout_secs: default_send_timeout_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: Some(bot_token.into()),
            chat_id: Some(chat_id.into()),
            ..Default::default()
        }
    }

    /// Point the client at another Bot API server
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Enabled and both credentials present
    pub fn is_configured(&self) -> bool {
        self.enabled && self.bot_token.is_some() && self.chat_id.is_some()
    }

    /// First missing credential, for startup logs
    pub fn missing_credential(&self) -> Option<&'static str> {
        match (&self.bot_token, &self.chat_id) {
            (None, _) => Some("bot_token"),
            (_, None) => Some("chat_id"),
            _ => None,
        }
    }

    /// Check the credentials' shape and return `(token, chat_id)`
    ///
    /// The token must contain exactly one `:` and the chat id must be an integer.
    pub fn credentials(&self) -> Result<(&str, i64)> {
        let token = self
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TelegramError::InvalidConfig("bot_token is not set".to_string()))?;
        let chat_id = self
            .chat_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| TelegramError::InvalidConfig("chat_id is not set".to_string()))?;

        if token.matches(':').count() != 1 {
            return Err(TelegramError::InvalidConfig(
                "bot_token must look like <bot id>:<secret>".to_string(),
            ));
        }
        let chat_id = chat_id.parse::<i64>().map_err(|_| {
            TelegramError::InvalidConfig(format!("chat_id must be an integer, got '{}'", chat_id))
        })?;

        Ok((token, chat_id))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
