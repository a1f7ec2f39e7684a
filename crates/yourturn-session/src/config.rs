//! Session manager and collector configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use yourturn_core::Session;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Run the sweeper every N seconds
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Keep terminal sessions at least this long before evicting them
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// How often a waiter checks its session
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Canned replies; the one flagged `default` is auto-submitted on timeout
    #[serde(default)]
    pub prewritten: Vec<PrewrittenMessage>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval_secs(),
            retention_secs: default_retention_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            prewritten: Vec::new(),
        }
    }
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_retention_secs() -> u64 {
    3600 // 1 hour
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl SessionConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The prewritten message used when a session times out, if any
    pub fn default_response(&self) -> Option<&PrewrittenMessage> {
        self.prewritten.iter().find(|m| m.default)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.cleanup_interval_secs == 0 {
            return Err("cleanup_interval_secs must be at least 1".to_string());
        }

        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be at least 1".to_string());
        }

        let defaults = self.prewritten.iter().filter(|m| m.default).count();
        if defaults > 1 {
            return Err(format!(
                "only one prewritten message may be marked default (found {})",
                defaults
            ));
        }

        Ok(())
    }
}

/// A canned reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrewrittenMessage {
    /// Optional short name shown to operators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Reply text
    ///
    /// Supported variables:
    /// - `${message}`: the question that timed out
    /// - `${session_id}`: ID of the session
    /// - `${timeout_secs}`: the session timeout in seconds
    pub text: String,

    /// Auto-submit this reply when a session times out
    #[serde(default)]
    pub default: bool,
}

impl PrewrittenMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            label: None,
            text: text.into(),
            default: false,
        }
    }

    /// Mark as the timeout default
    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// Render the reply for a session; empty text yields `None`
    pub fn resolve(&self, session: &Session) -> Option<String> {
        let text = self
            .text
            .replace("${message}", &session.message)
            .replace("${session_id}", &session.id)
            .replace("${timeout_secs}", &session.timeout.as_secs().to_string());

        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Response collector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Delay before re-reading a session the waiter gave up on
    #[serde(default = "default_recheck_delay_ms")]
    pub recheck_delay_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            recheck_delay_ms: default_recheck_delay_ms(),
        }
    }
}

fn default_recheck_delay_ms() -> u64 {
    100
}

impl CollectorConfig {
    pub fn recheck_delay(&self) -> Duration {
        Duration::from_millis(self.recheck_delay_ms)
    }
}
