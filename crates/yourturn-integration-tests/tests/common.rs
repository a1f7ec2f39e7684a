//! Common test utilities for integration tests

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};
use yourturn_session::{CollectorConfig, ResponseCollector, SessionConfig, SessionManager};
use yourturn_telegram::{TelegramChannel, TelegramConfig};

pub const TOKEN: &str = "777:integration-token";
pub const CHAT: &str = "31337";

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub fn bot_path(method_name: &str) -> String {
    format!("/bot{}/{}", TOKEN, method_name)
}

/// Everything needed to run a collection against a mocked Bot API
pub struct Harness {
    pub server: MockServer,
    pub manager: Arc<SessionManager>,
    pub channel: Arc<TelegramChannel>,
    pub collector: ResponseCollector,
}

#[allow(dead_code)]
impl Harness {
    pub async fn start(sessions: SessionConfig) -> Self {
        let server = MockServer::start().await;

        let mut telegram = TelegramConfig::new(TOKEN, CHAT).with_api_base_url(server.uri());
        telegram.send_timeout_secs = 2;
        telegram.poll_timeout_secs = 1;
        telegram.retry_delay_secs = 1;

        let manager = Arc::new(SessionManager::new(sessions));
        let channel = Arc::new(TelegramChannel::new(telegram, manager.clone()).unwrap());
        let collector = ResponseCollector::new(manager.clone(), CollectorConfig::default())
            .with_channel(channel.clone());

        Self {
            server,
            manager,
            channel,
            collector,
        }
    }

    pub async fn mount_bot(&self) {
        Mock::given(method("POST"))
            .and(path(bot_path("getMe")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"id": 777, "is_bot": true, "username": "integration_bot"}
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path(bot_path("sendMessage")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 1, "chat": {"id": 31337}}
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path(bot_path("getUpdates")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true, "result": []}))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&self.server)
            .await;
    }

    /// Deliver `text` from the configured chat on the first poll, after `delay`
    pub async fn mount_reply(&self, text: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(bot_path("getUpdates")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "ok": true,
                        "result": [{
                            "update_id": 500,
                            "message": {"message_id": 9, "chat": {"id": 31337}, "text": text}
                        }]
                    }))
                    .set_delay(delay),
            )
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    /// Texts of every sendMessage call, in order
    pub async fn sent_texts(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path().ends_with("/sendMessage"))
            .filter_map(|r| {
                let body: Value = serde_json::from_slice(&r.body).ok()?;
                body["text"].as_str().map(str::to_string)
            })
            .collect()
    }

    /// Wait until `count` messages were sent, or give up after two seconds
    pub async fn wait_for_sent(&self, count: usize) -> Vec<String> {
        for _ in 0..40 {
            let texts = self.sent_texts().await;
            if texts.len() >= count {
                return texts;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.sent_texts().await
    }
}

pub fn fast_sessions() -> SessionConfig {
    SessionConfig {
        poll_interval_ms: 50,
        ..Default::default()
    }
}
