//! In-memory session store
//!
//! The store is the only owner of the session map. Every check-then-mutate
//! sequence (submit, waiter poll, sweeper expiry) runs while holding the
//! session's map entry, so each one is atomic with respect to the others
//! no matter which task or thread calls it.

use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use yourturn_core::{Error, Metadata, Result, Session, SessionId, SessionStatus, Transition};

use crate::config::PrewrittenMessage;

/// Outcome of a single waiter poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    /// Still active and within its deadline
    Pending,
    /// A reply was accepted
    Completed(String),
    /// Expired and completed with the default reply
    AutoCompleted(String),
    /// Expired and marked TimedOut by this poll
    TimedOut,
    /// Terminal without a reply (timed out elsewhere, errored)
    Inactive(SessionStatus),
    /// No such session (evicted or never created)
    Missing,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a new pending session
    pub fn create(
        &self,
        message: impl Into<String>,
        target: Option<String>,
        timeout: Duration,
        metadata: Metadata,
    ) -> Session {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(id.clone(), message, target, timeout, metadata);
        self.sessions.insert(id.clone(), session.clone());

        info!(
            "Created interactive session {} (timeout: {}s)",
            id,
            session.timeout.as_secs()
        );
        session
    }

    /// Snapshot of a session
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Sessions that are Pending/Waiting and not past their deadline
    pub fn active(&self) -> HashMap<SessionId, Session> {
        let now = Instant::now();
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_live_at(now))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// All sessions addressed to `target`, whatever their status
    pub fn by_target(&self, target: &str) -> HashMap<SessionId, Session> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().target.as_deref() == Some(target))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// The most recently created live session for `target`
    pub fn latest_active_for_target(&self, target: &str) -> Option<Session> {
        let now = Instant::now();
        self.sessions
            .iter()
            .filter(|entry| {
                let session = entry.value();
                session.target.as_deref() == Some(target) && session.is_live_at(now)
            })
            .max_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.value().clone())
    }

    /// Delete a session; no-op if absent
    pub fn remove(&self, id: &str) {
        self.sessions.remove(id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Submit a reply, reporting why it was rejected
    ///
    /// # Errors
    /// - `Error::UnknownSession` if the ID is not in the store
    /// - `Error::InactiveSession` if the session is already terminal
    /// - `Error::ExpiredSession` if the deadline passed; the session is
    ///   marked TimedOut as a side effect
    pub fn try_submit(&self, id: &str, text: &str) -> Result<()> {
        let now = Instant::now();

        let Some(mut entry) = self.sessions.get_mut(id) else {
            warn!("Reply for unknown session {}", id);
            return Err(Error::UnknownSession(id.to_string()));
        };
        let session = entry.value_mut();

        if !session.is_active() {
            warn!(
                "Reply for inactive session {} (status: {})",
                id,
                session.status()
            );
            return Err(Error::InactiveSession {
                id: id.to_string(),
                status: session.status(),
            });
        }

        if session.is_expired_at(now) {
            session.apply(Transition::TimeOut)?;
            warn!("Reply for expired session {}, marked as timed out", id);
            return Err(Error::ExpiredSession(id.to_string()));
        }

        let previous = session.status();
        session.apply(Transition::Complete(text.to_string()))?;
        info!(
            "Response submitted for session {} ({} -> {})",
            id,
            previous,
            session.status()
        );
        Ok(())
    }

    /// Submit a reply; `true` only for the single accepted submission
    pub fn submit(&self, id: &str, text: &str) -> bool {
        self.try_submit(id, text).is_ok()
    }

    /// Mark the session as being waited on; returns its status afterwards
    pub fn begin_waiting(&self, id: &str) -> Option<SessionStatus> {
        let mut entry = self.sessions.get_mut(id)?;
        let session = entry.value_mut();
        if session.is_active() {
            // Pending or Waiting, always legal
            let _ = session.apply(Transition::BeginWaiting);
        }
        Some(session.status())
    }

    /// Record a delivery failure
    ///
    /// # Errors
    /// - `Error::UnknownSession` if the ID is not in the store
    /// - `Error::InvalidTransition` if the session is already terminal
    pub fn mark_errored(&self, id: &str, reason: &str) -> Result<()> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| Error::UnknownSession(id.to_string()))?;
        entry.value_mut().apply(Transition::Fail(reason.to_string()))?;
        warn!("Session {} errored: {}", id, reason);
        Ok(())
    }

    /// One waiter iteration: observe the session and finalize it if expired
    ///
    /// An expired session is completed with `default` when one resolves to
    /// non-empty text, otherwise it is marked TimedOut. A reply accepted
    /// before this call always wins over expiry.
    pub fn poll_step(
        &self,
        id: &str,
        now: Instant,
        default: Option<&PrewrittenMessage>,
    ) -> PollStep {
        let Some(mut entry) = self.sessions.get_mut(id) else {
            return PollStep::Missing;
        };
        let session = entry.value_mut();

        if session.status() == SessionStatus::Completed {
            return PollStep::Completed(session.response().unwrap_or_default().to_string());
        }

        if !session.is_active() {
            return PollStep::Inactive(session.status());
        }

        if !session.is_expired_at(now) {
            return PollStep::Pending;
        }

        if let Some(text) = default.and_then(|message| message.resolve(session))
            && session.apply(Transition::Complete(text.clone())).is_ok()
        {
            info!(
                "Session {} timed out, auto-submitted default response",
                id
            );
            return PollStep::AutoCompleted(text);
        }

        // Active, so TimeOut is legal
        let _ = session.apply(Transition::TimeOut);
        warn!(
            "Session {} timed out after {}s",
            id,
            session.timeout.as_secs()
        );
        PollStep::TimedOut
    }

    /// Mark every active session past its deadline as TimedOut
    pub fn expire_stale(&self, now: Instant) -> usize {
        let mut expired = 0;
        for mut entry in self.sessions.iter_mut() {
            let session = entry.value_mut();
            if session.is_active()
                && session.is_expired_at(now)
                && session.apply(Transition::TimeOut).is_ok()
            {
                debug!("Expired abandoned session {}", session.id);
                expired += 1;
            }
        }
        expired
    }

    /// Remove terminal sessions older than `retention`; active ones are kept
    pub fn evict_terminal(&self, now: Instant, retention: Duration) -> usize {
        let mut evicted = 0;
        self.sessions.retain(|_, session| {
            let stale = session.is_terminal() && session.age_at(now) > retention;
            if stale {
                evicted += 1;
            }
            !stale
        });
        evicted
    }
}
