//! Minimal Telegram Bot API client
//!
//! Only the three methods the channel needs: `getMe`, `sendMessage` and
//! long-polling `getUpdates`.

use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{Result, TelegramError};

/// Envelope around every Bot API result
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

/// Bot API client bound to one bot token
#[derive(Clone)]
pub struct BotClient {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for BotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // base_url carries the token
        f.debug_struct("BotClient").finish_non_exhaustive()
    }
}

impl BotClient {
    pub fn new(api_base_url: &str, token: &str) -> Result<Self> {
        let client = ClientBuilder::new()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(format!("YourTurn/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                TelegramError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base_url.trim_end_matches('/'), token),
        })
    }

    /// Identify the bot; doubles as a credential check
    pub async fn get_me(&self, timeout: Duration) -> Result<User> {
        self.call("getMe", &serde_json::json!({}), timeout).await
    }

    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        timeout: Duration,
    ) -> Result<Message> {
        self.call("sendMessage", &SendMessage { chat_id, text }, timeout)
            .await
    }

    /// Long-poll for new messages
    ///
    /// The HTTP timeout is the long-poll timeout plus `grace`, so an idle
    /// poll returns an empty list instead of failing.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        poll_timeout: Duration,
        grace: Duration,
    ) -> Result<Vec<Update>> {
        let body = GetUpdates {
            offset,
            timeout: poll_timeout.as_secs(),
            allowed_updates: ["message"],
        };
        self.call("getUpdates", &body, poll_timeout + grace).await
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("Calling Telegram method {}", method);

        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TelegramError::Timeout(timeout.as_secs())
                } else {
                    e.into()
                }
            })?;

        let status = response.status();
        let text = response.text().await?;

        // Error replies carry the same envelope, with ok=false
        let envelope: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                return Err(TelegramError::Api {
                    code: i64::from(status.as_u16()),
                    description: if status.is_success() {
                        format!("Malformed {} response: {}", method, e)
                    } else {
                        text
                    },
                });
            }
        };

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                error_code,
                description,
                ..
            } => Err(TelegramError::Api {
                code: error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                description: description
                    .unwrap_or_else(|| format!("{} returned no result", method)),
            }),
        }
    }
}
