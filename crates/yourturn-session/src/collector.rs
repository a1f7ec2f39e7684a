//! Response collector
//!
//! Turns "ask the human and wait" into a single call that always produces a
//! result. Failures (no channel, channel down, delivery failed, internal
//! panic) are folded into [`CollectionResult`] instead of being returned as
//! errors, so the caller can always answer its own caller.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use yourturn_core::{Alert, Channel, Error, Metadata, Session, SessionId, SessionStatus};

use crate::config::CollectorConfig;
use crate::manager::SessionManager;

/// Outcome of a collection attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionResult {
    /// The human's reply (or the default reply on timeout)
    pub response: Option<String>,
    /// Whether a question was sent (or about to be sent) over a channel
    pub attempted: bool,
    /// Why no reply could be collected
    pub error: Option<String>,
}

impl CollectionResult {
    fn not_attempted(error: Option<String>) -> Self {
        Self {
            response: None,
            attempted: false,
            error,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            response: None,
            attempted: true,
            error: Some(error),
        }
    }

    fn answered(response: Option<String>) -> Self {
        Self {
            response,
            attempted: true,
            error: None,
        }
    }
}

pub struct ResponseCollector {
    manager: Arc<SessionManager>,
    channel: Option<Arc<dyn Channel>>,
    alert: Option<Arc<dyn Alert>>,
    config: CollectorConfig,
}

impl ResponseCollector {
    pub fn new(manager: Arc<SessionManager>, config: CollectorConfig) -> Self {
        Self {
            manager,
            channel: None,
            alert: None,
            config,
        }
    }

    /// Set the channel questions are delivered through
    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Set the alert raised once per collection
    pub fn with_alert(mut self, alert: Arc<dyn Alert>) -> Self {
        self.alert = Some(alert);
        self
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    /// Ask `question` and wait up to `timeout` for a reply
    ///
    /// `target` falls back to the channel's default target. A zero timeout
    /// waits until a reply arrives.
    pub async fn collect_response(
        &self,
        question: &str,
        target: Option<&str>,
        timeout: Duration,
    ) -> CollectionResult {
        self.raise_alert(question);

        let Some(channel) = self.channel.clone() else {
            info!("No reply channel configured, alert only");
            return CollectionResult::not_attempted(None);
        };

        if let Err(e) = channel.ensure_live().await {
            error!("Channel {} is not available: {}", channel.name(), e);
            return CollectionResult::not_attempted(Some(e.to_string()));
        }

        let target = target
            .map(str::to_string)
            .or_else(|| channel.default_target().map(str::to_string));
        let mut metadata = Metadata::new();
        metadata.insert("channel".to_string(), serde_json::json!(channel.name()));
        let session = self
            .manager
            .create_session(question, target, timeout, metadata);

        let poll_interval = self.manager.config().poll_interval();
        let recheck_delay = self.config.recheck_delay();

        // Run on its own task so a panic in a collaborator still yields a result
        let task = tokio::spawn(collect(
            self.manager.clone(),
            channel,
            session.clone(),
            poll_interval,
            recheck_delay,
        ));
        let mut collection = InFlight::new(self.manager.clone(), session.id.clone(), task);

        match collection.join().await {
            Ok(result) => result,
            Err(e) => {
                let reason = Error::Internal(e.to_string()).to_string();
                error!("Response collection for session {} failed: {}", session.id, e);
                if let Err(e) = self.manager.store().mark_errored(&session.id, &reason) {
                    warn!("Could not mark session {} as errored: {}", session.id, e);
                }
                CollectionResult::failed(reason)
            }
        }
    }

    fn raise_alert(&self, reason: &str) {
        if let Some(alert) = &self.alert
            && let Err(e) = alert.alert(reason)
        {
            warn!("Alert failed: {}", e);
        }
    }
}

/// A spawned collection and the session it resolves
///
/// Dropping it before the task finishes aborts the task and errors the
/// session, so an abandoned question can no longer be answered.
struct InFlight {
    manager: Arc<SessionManager>,
    session_id: SessionId,
    task: JoinHandle<CollectionResult>,
    finished: bool,
}

impl InFlight {
    fn new(
        manager: Arc<SessionManager>,
        session_id: SessionId,
        task: JoinHandle<CollectionResult>,
    ) -> Self {
        Self {
            manager,
            session_id,
            task,
            finished: false,
        }
    }

    async fn join(&mut self) -> Result<CollectionResult, JoinError> {
        let outcome = (&mut self.task).await;
        self.finished = true;
        outcome
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.task.abort();
        match self
            .manager
            .store()
            .mark_errored(&self.session_id, "collection cancelled")
        {
            Ok(()) => info!("Cancelled collection for session {}", self.session_id),
            Err(e) => debug!(
                "Cancelled collection for session {} ({})",
                self.session_id, e
            ),
        }
    }
}

async fn collect(
    manager: Arc<SessionManager>,
    channel: Arc<dyn Channel>,
    session: Session,
    poll_interval: Duration,
    recheck_delay: Duration,
) -> CollectionResult {
    if let Err(e) = channel.deliver(&session).await {
        let reason = e.to_string();
        error!("Failed to deliver question for session {}: {}", session.id, reason);
        if let Err(e) = manager.store().mark_errored(&session.id, &reason) {
            warn!("Could not mark session {} as errored: {}", session.id, e);
        }
        return CollectionResult::failed(reason);
    }

    info!("Waiting for user response to session {}", session.id);
    if let Some(response) = manager.wait_for_response(&session, poll_interval).await {
        info!("User response collected for session {}", session.id);
        return CollectionResult::answered(Some(response));
    }

    // The reply may have landed after the waiter's last look
    sleep(recheck_delay).await;
    match manager.get_session(&session.id) {
        Some(latest) if latest.status() == SessionStatus::Completed => {
            warn!(
                "Late completion detected for session {}, using stored response",
                session.id
            );
            CollectionResult::answered(latest.response().map(str::to_string))
        }
        _ => {
            info!("No user response received for session {}", session.id);
            CollectionResult::answered(None)
        }
    }
}
