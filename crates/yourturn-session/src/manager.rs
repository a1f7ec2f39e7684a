//! Session manager
//!
//! Owns the session store and the background sweeper. One manager is built
//! at startup and shared (behind an `Arc`) with the response collector and
//! the reply channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use yourturn_core::{Metadata, Result, Session, SessionId};

use crate::cleanup::{SweeperTask, spawn_sweeper};
use crate::config::SessionConfig;
use crate::store::SessionStore;

/// What happened to an inbound reply routed by target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The reply completed this session
    Accepted { session_id: SessionId },
    /// The target has no session waiting for a reply
    NoActiveSession,
    /// The chosen session refused the reply
    Rejected { session_id: SessionId, reason: String },
}

pub struct SessionManager {
    store: Arc<SessionStore>,
    config: SessionConfig,
    sweeper: Mutex<Option<SweeperTask>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            store: Arc::new(SessionStore::new()),
            config,
            sweeper: Mutex::new(None),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SessionConfig::default())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Start the background sweeper; no-op if it is already running
    pub async fn start(&self) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_none() {
            *sweeper = Some(spawn_sweeper(
                self.store.clone(),
                self.config.cleanup_interval(),
                self.config.retention(),
            ));
            info!("Interactive session manager started");
        }
    }

    /// Stop the background sweeper
    pub async fn stop(&self) {
        let task = self.sweeper.lock().await.take();
        if let Some(task) = task {
            task.shutdown().await;
            info!("Interactive session manager stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Create a new pending session
    pub fn create_session(
        &self,
        message: impl Into<String>,
        target: Option<String>,
        timeout: Duration,
        metadata: Metadata,
    ) -> Session {
        self.store.create(message, target, timeout, metadata)
    }

    /// Submit a reply for a session; `true` if it was accepted
    pub fn submit_response(&self, session_id: &str, response: &str) -> bool {
        debug!("Submitting response for session {}", session_id);
        self.store.submit(session_id, response)
    }

    /// Submit a reply, reporting why it was rejected
    pub fn try_submit_response(&self, session_id: &str, response: &str) -> Result<()> {
        self.store.try_submit(session_id, response)
    }

    /// Route an inbound reply to the newest live session for `target`
    pub fn submit_for_target(&self, target: &str, response: &str) -> ReplyOutcome {
        let Some(session) = self.store.latest_active_for_target(target) else {
            debug!("No active session for target {}", target);
            return ReplyOutcome::NoActiveSession;
        };

        match self.store.try_submit(&session.id, response) {
            Ok(()) => ReplyOutcome::Accepted {
                session_id: session.id,
            },
            Err(e) => ReplyOutcome::Rejected {
                session_id: session.id,
                reason: e.to_string(),
            },
        }
    }

    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        self.store.get(session_id)
    }

    pub fn active_sessions(&self) -> HashMap<SessionId, Session> {
        self.store.active()
    }

    pub fn sessions_for_target(&self, target: &str) -> HashMap<SessionId, Session> {
        self.store.by_target(target)
    }
}
