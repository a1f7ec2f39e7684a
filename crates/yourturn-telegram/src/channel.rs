//! Telegram reply channel
//!
//! Questions go out with `sendMessage`. Replies come back through a
//! background long-poll loop that submits each text message from the
//! configured chat to the newest active session for that chat.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use yourturn_core::{Channel, Error, Session};
use yourturn_session::{ReplyOutcome, SessionManager};

use crate::api::{BotClient, Update};
use crate::{Result, TelegramConfig, TelegramError};

/// Longest reply echoed back in the confirmation
const ECHO_CHARS: usize = 50;

/// Extra HTTP time on top of the long-poll timeout
const POLL_GRACE: Duration = Duration::from_secs(10);

const HELP_MESSAGE: &str =
    "ℹ️ No active questions found. I'll notify you when the agent needs your input!";

/// Render the question sent for `session`
pub fn format_question(session: &Session, now: DateTime<Local>) -> String {
    let mut text = format!("❓ Question for you:\n\n{}", session.message);
    text.push_str(&format!("\n\n🆔 Session: {}...", session.short_id()));

    let minutes = session.timeout.as_secs() / 60;
    if minutes > 0 {
        text.push_str(&format!("\n⏱️ Timeout: {} minutes", minutes));
    }

    text.push_str(&format!("\n⏰ {}", now.format("%H:%M:%S")));
    text.push_str("\n\n💬 Please reply with your answer.");
    text
}

fn confirmation(response: &str) -> String {
    let mut echo: String = response.chars().take(ECHO_CHARS).collect();
    if response.chars().count() > ECHO_CHARS {
        echo.push_str("...");
    }
    format!("✅ Got it! Your response: \"{}\"", echo)
}

struct PollerTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

struct Inner {
    client: BotClient,
    chat_id: String,
    config: TelegramConfig,
    manager: Arc<SessionManager>,
    connected: AtomicBool,
}

impl Inner {
    /// Route one inbound message; returns the text to send back, if any
    fn route_message(&self, chat_id: i64, text: Option<&str>) -> Option<String> {
        if chat_id.to_string() != self.chat_id {
            debug!("Ignoring message from unknown chat {}", chat_id);
            return None;
        }

        let text = text.map(str::trim).filter(|t| !t.is_empty())?;
        if text.starts_with('/') {
            debug!("Ignoring bot command {}", text);
            return None;
        }

        match self.manager.submit_for_target(&self.chat_id, text) {
            ReplyOutcome::Accepted { session_id } => {
                info!("Reply accepted for session {}", session_id);
                Some(confirmation(text))
            }
            ReplyOutcome::NoActiveSession => Some(HELP_MESSAGE.to_string()),
            ReplyOutcome::Rejected { session_id, reason } => {
                warn!("Reply rejected for session {}: {}", session_id, reason);
                Some(format!("❌ Failed to process your response: {}", reason))
            }
        }
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };

        if let Some(reply) = self.route_message(message.chat.id, message.text.as_deref())
            && let Err(e) = self
                .client
                .send_message(&self.chat_id, &reply, self.config.send_timeout())
                .await
        {
            error!("Failed to answer Telegram message: {}", e.describe());
        }
    }

    async fn poll_loop(self: Arc<Self>, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(
            "Starting Telegram poller (timeout: {}s)",
            self.config.poll_timeout_secs
        );

        let mut offset: Option<i64> = None;
        loop {
            let poll = self
                .client
                .get_updates(offset, self.config.poll_timeout(), POLL_GRACE);

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = poll => match result {
                    Ok(updates) => {
                        for update in updates {
                            offset = Some(update.update_id + 1);
                            self.handle_update(update).await;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Telegram poll failed, retrying in {}s: {}",
                            self.config.retry_delay_secs,
                            e.describe()
                        );
                        tokio::select! {
                            _ = shutdown_rx.recv() => break,
                            _ = sleep(self.config.retry_delay()) => {}
                        }
                    }
                }
            }
        }

        info!("Telegram poller shutting down");
    }
}

/// [`Channel`] backed by a Telegram bot
pub struct TelegramChannel {
    inner: Arc<Inner>,
    poller: Mutex<Option<PollerTask>>,
}

impl TelegramChannel {
    /// Build the channel; fails if the credentials are missing or malformed
    pub fn new(config: TelegramConfig, manager: Arc<SessionManager>) -> Result<Self> {
        let (token, chat_id) = config.credentials()?;
        let client = BotClient::new(&config.api_base_url, token)?;
        // Canonical form, so it matches the ids the Bot API reports
        let chat_id = chat_id.to_string();

        info!("Telegram channel initialized for chat {}", chat_id);

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                chat_id,
                config,
                manager,
                connected: AtomicBool::new(false),
            }),
            poller: Mutex::new(None),
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.inner.chat_id
    }

    /// Verify the bot token once; later calls are no-ops
    pub async fn connect(&self) -> Result<()> {
        if self.inner.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let me = self
            .inner
            .client
            .get_me(self.inner.config.send_timeout())
            .await?;
        info!(
            "Connected to Telegram as @{}",
            me.username.as_deref().unwrap_or("unknown")
        );
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Start the reply poller unless it is already running
    pub async fn start_polling(&self) -> Result<()> {
        if !self.inner.connected.load(Ordering::SeqCst) {
            return Err(TelegramError::NotConnected);
        }

        let mut poller = self.poller.lock().await;
        if poller.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(self.inner.clone().poll_loop(shutdown_rx));
        *poller = Some(PollerTask {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Stop the reply poller and wait for it to exit
    pub async fn shutdown(&self) {
        let task = self.poller.lock().await.take();
        if let Some(task) = task {
            let _ = task.shutdown_tx.send(()).await;
            if let Err(e) = task.handle.await {
                error!("Telegram poller ended abnormally: {}", e);
            }
        }
    }

    async fn send_question(&self, session: &Session) -> Result<()> {
        if !self.inner.connected.load(Ordering::SeqCst) {
            return Err(TelegramError::NotConnected);
        }

        let target = session.target.as_deref().unwrap_or(&self.inner.chat_id);
        let text = format_question(session, Local::now());
        let send_timeout = self.inner.config.send_timeout();

        tokio::time::timeout(
            send_timeout,
            self.inner.client.send_message(target, &text, send_timeout),
        )
        .await
        .map_err(|_| TelegramError::Timeout(send_timeout.as_secs()))??;

        info!("Question sent for session {}", session.id);
        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn default_target(&self) -> Option<&str> {
        Some(&self.inner.chat_id)
    }

    async fn is_live(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
            && self
                .poller
                .lock()
                .await
                .as_ref()
                .is_some_and(|task| !task.handle.is_finished())
    }

    async fn ensure_live(&self) -> yourturn_core::Result<()> {
        self.connect()
            .await
            .map_err(|e| Error::ChannelUnavailable(e.describe()))?;
        self.start_polling()
            .await
            .map_err(|e| Error::ChannelUnavailable(e.describe()))
    }

    async fn deliver(&self, session: &Session) -> yourturn_core::Result<()> {
        self.send_question(session)
            .await
            .map_err(|e| Error::DeliveryFailure(e.describe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use yourturn_core::{Metadata, SessionStatus};

    fn channel() -> (TelegramChannel, Arc<SessionManager>) {
        let manager = Arc::new(SessionManager::with_defaults());
        let config = TelegramConfig::new("1:abc", "42").with_api_base_url("http://127.0.0.1:9");
        (TelegramChannel::new(config, manager.clone()).unwrap(), manager)
    }

    #[test]
    fn test_rejects_bad_credentials() {
        let manager = Arc::new(SessionManager::with_defaults());
        let result = TelegramChannel::new(TelegramConfig::new("nocolon", "42"), manager);
        assert!(matches!(result, Err(TelegramError::InvalidConfig(_))));
    }

    #[test]
    fn test_format_question() {
        let session = Session::new(
            "abcdef1234567890".to_string(),
            "Deploy now?",
            None,
            Duration::from_secs(300),
            Metadata::new(),
        );
        let now = Local.with_ymd_and_hms(2024, 5, 1, 14, 3, 9).unwrap();

        assert_eq!(
            format_question(&session, now),
            "❓ Question for you:\n\nDeploy now?\n\n🆔 Session: abcdef12...\n⏱️ Timeout: 5 minutes\n⏰ 14:03:09\n\n💬 Please reply with your answer."
        );
    }

    #[test]
    fn test_format_question_omits_short_timeouts() {
        let session = Session::new(
            "abcdef1234567890".to_string(),
            "Quick?",
            None,
            Duration::from_secs(59),
            Metadata::new(),
        );
        let now = Local.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        assert!(!format_question(&session, now).contains("Timeout"));
    }

    #[test]
    fn test_confirmation_truncates_by_chars() {
        assert_eq!(confirmation("yes"), "✅ Got it! Your response: \"yes\"");

        let long = "é".repeat(60);
        let expected = format!("✅ Got it! Your response: \"{}...\"", "é".repeat(50));
        assert_eq!(confirmation(&long), expected);
    }

    #[tokio::test]
    async fn test_route_message_submits_to_latest_session() {
        let (channel, manager) = channel();
        let session = manager.create_session(
            "Continue?",
            Some("42".to_string()),
            Duration::from_secs(60),
            Metadata::new(),
        );

        let reply = channel.inner.route_message(42, Some("  go ahead \n"));
        assert_eq!(reply.as_deref(), Some("✅ Got it! Your response: \"go ahead\""));

        let stored = manager.get_session(&session.id).unwrap();
        assert_eq!(stored.status(), SessionStatus::Completed);
        assert_eq!(stored.response(), Some("go ahead"));
    }

    #[tokio::test]
    async fn test_route_message_filters() {
        let (channel, manager) = channel();
        let session = manager.create_session(
            "Continue?",
            Some("42".to_string()),
            Duration::from_secs(60),
            Metadata::new(),
        );

        assert!(channel.inner.route_message(7, Some("from elsewhere")).is_none());
        assert!(channel.inner.route_message(42, Some("/start")).is_none());
        assert!(channel.inner.route_message(42, Some("   ")).is_none());
        assert!(channel.inner.route_message(42, None).is_none());
        assert!(manager.get_session(&session.id).unwrap().is_active());
    }

    #[tokio::test]
    async fn test_route_message_accepts_padded_chat_id() {
        let manager = Arc::new(SessionManager::with_defaults());
        let config = TelegramConfig::new("1:abc", "+042").with_api_base_url("http://127.0.0.1:9");
        let channel = TelegramChannel::new(config, manager.clone()).unwrap();
        assert_eq!(channel.chat_id(), "42");

        let session = manager.create_session(
            "Proceed?",
            Some(channel.chat_id().to_string()),
            Duration::from_secs(60),
            Metadata::new(),
        );
        let reply = channel.inner.route_message(42, Some("yes"));
        assert_eq!(reply.as_deref(), Some("✅ Got it! Your response: \"yes\""));
        assert_eq!(
            manager.get_session(&session.id).unwrap().status(),
            SessionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_route_message_without_session_sends_help() {
        let (channel, _manager) = channel();
        assert_eq!(
            channel.inner.route_message(42, Some("hello?")).as_deref(),
            Some(HELP_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_not_live_before_connect() {
        let (channel, _manager) = channel();
        assert!(!channel.is_live().await);
        assert!(matches!(
            channel.start_polling().await,
            Err(TelegramError::NotConnected)
        ));
        assert_eq!(channel.default_target(), Some("42"));

        // Shutting down an idle channel is a no-op
        channel.shutdown().await;
    }
}
