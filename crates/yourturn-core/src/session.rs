//! Interactive session model
//!
//! A session is one outstanding question awaiting a human reply. Its status
//! moves along a small state machine:
//!
//! - Pending → Waiting: a waiter started polling it
//! - Pending/Waiting → Completed: a reply was submitted
//! - Pending/Waiting → TimedOut: the deadline passed without a reply
//! - Pending/Waiting → Errored: the question could not be delivered
//!
//! Completed, TimedOut and Errored are terminal. Every status change goes
//! through [`Session::apply`], which rejects anything leaving a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::{Error, Result};

/// Session identifier (UUID format)
pub type SessionId = String;

/// Caller-supplied metadata, never interpreted by the session machinery
pub type Metadata = HashMap<String, serde_json::Value>;

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, nobody is waiting on it yet
    Pending,
    /// A waiter is polling for the reply
    Waiting,
    /// A reply was accepted
    Completed,
    /// The deadline passed without a reply
    #[serde(rename = "timeout")]
    TimedOut,
    /// The question could not be delivered
    #[serde(rename = "error")]
    Errored,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Waiting => "waiting",
            SessionStatus::Completed => "completed",
            SessionStatus::TimedOut => "timeout",
            SessionStatus::Errored => "error",
        }
    }

    /// Pending and Waiting sessions can still be polled and answered
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::Waiting)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A waiter began polling
    BeginWaiting,
    /// A reply arrived
    Complete(String),
    /// The deadline passed
    TimeOut,
    /// Delivery failed
    Fail(String),
}

impl Transition {
    /// Status the session ends up in when the transition is accepted
    pub fn target(&self) -> SessionStatus {
        match self {
            Transition::BeginWaiting => SessionStatus::Waiting,
            Transition::Complete(_) => SessionStatus::Completed,
            Transition::TimeOut => SessionStatus::TimedOut,
            Transition::Fail(_) => SessionStatus::Errored,
        }
    }
}

/// One pending question
#[derive(Debug, Clone)]
pub struct Session {
    /// Session ID
    pub id: SessionId,

    /// Question text
    pub message: String,

    /// Channel address (e.g. a chat ID) the question belongs to
    pub target: Option<String>,

    /// Monotonic creation time, used for expiry and retention
    pub created_at: Instant,

    /// Wall-clock creation time, for display
    pub created_at_utc: DateTime<Utc>,

    /// Time allowed for a reply; zero means the session never expires
    pub timeout: Duration,

    /// Custom metadata
    pub metadata: Metadata,

    status: SessionStatus,
    response: Option<String>,
    error: Option<String>,
}

impl Session {
    /// Create a new pending session
    pub fn new(
        id: SessionId,
        message: impl Into<String>,
        target: Option<String>,
        timeout: Duration,
        metadata: Metadata,
    ) -> Self {
        Self {
            id,
            message: message.into(),
            target,
            created_at: Instant::now(),
            created_at_utc: Utc::now(),
            timeout,
            metadata,
            status: SessionStatus::Pending,
            response: None,
            error: None,
        }
    }

    /// Override the creation instant
    pub fn with_created_at(mut self, created_at: Instant) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// The accepted reply, only ever set on Completed sessions
    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    /// The delivery error, only ever set on Errored sessions
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn never_expires(&self) -> bool {
        self.timeout.is_zero()
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Whether the deadline has passed at `now`
    ///
    /// The boundary is exclusive: a session whose age equals its timeout is
    /// not expired yet.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        if self.never_expires() {
            return false;
        }
        now.saturating_duration_since(self.created_at) > self.timeout
    }

    /// Active and not past its deadline
    pub fn is_live_at(&self, now: Instant) -> bool {
        self.is_active() && !self.is_expired_at(now)
    }

    /// Time since creation
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// First eight characters of the ID, for display
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }

    /// Apply a status change
    ///
    /// Returns the new status, or `Error::InvalidTransition` when the session
    /// is already terminal. The session is left untouched on error.
    pub fn apply(&mut self, transition: Transition) -> Result<SessionStatus> {
        if self.status.is_terminal() {
            return Err(Error::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: transition.target(),
            });
        }

        let from = self.status;
        self.status = transition.target();
        tracing::debug!("Session {}: {} -> {}", self.id, from, self.status);
        match transition {
            Transition::Complete(text) => self.response = Some(text),
            Transition::Fail(reason) => self.error = Some(reason),
            Transition::BeginWaiting | Transition::TimeOut => {}
        }

        Ok(self.status)
    }
}

/// Convert a timeout given in seconds, where zero or negative means never
pub fn timeout_from_secs(secs: i64) -> Duration {
    if secs <= 0 {
        Duration::ZERO
    } else {
        Duration::from_secs(secs as u64)
    }
}
