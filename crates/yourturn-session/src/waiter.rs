//! Response waiter
//!
//! Blocks the calling task until a session gets a reply or runs out of time.
//! Replies arrive on an unrelated code path (the channel's inbound loop), so
//! the waiter polls the store instead of waiting on a shared signal. Each poll
//! is an atomic observe-and-finalize step; a reply accepted before the poll
//! that detects expiry always wins.

use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};
use yourturn_core::Session;

use crate::manager::SessionManager;
use crate::store::PollStep;

/// Emit a progress line every N polls
const PROGRESS_EVERY: u64 = 30;

impl SessionManager {
    /// Wait for a reply to `session`
    ///
    /// Returns the reply, the configured default reply when the session
    /// expires and one is configured, or `None` on timeout/error.
    pub async fn wait_for_response(
        &self,
        session: &Session,
        poll_interval: Duration,
    ) -> Option<String> {
        let id = session.id.as_str();
        let store = self.store();
        let default = self.config().default_response();

        store.begin_waiting(id);
        info!("Waiting for response to session {}", id);

        let mut polls: u64 = 0;
        loop {
            polls += 1;

            match store.poll_step(id, Instant::now(), default) {
                PollStep::Completed(text) => {
                    info!("Session {} completed after {} polls", id, polls);
                    return Some(text);
                }
                PollStep::AutoCompleted(text) => {
                    info!(
                        "Session {} completed with default response after {} polls",
                        id, polls
                    );
                    return Some(text);
                }
                PollStep::TimedOut => break,
                PollStep::Inactive(status) => {
                    warn!(
                        "Session {} became inactive without completion (status: {}, {} polls)",
                        id, status, polls
                    );
                    break;
                }
                PollStep::Missing => {
                    warn!("Session {} disappeared while waiting", id);
                    break;
                }
                PollStep::Pending => {}
            }

            if polls % PROGRESS_EVERY == 0 {
                info!("Still waiting for session {} (poll #{})", id, polls);
            }

            sleep(poll_interval).await;
        }

        // Final check before giving up
        match store.get(id) {
            Some(session) if session.response().is_some() => {
                info!("Session {} completed in final check", id);
                session.response().map(str::to_string)
            }
            _ => {
                info!("No response for session {} after {} polls", id, polls);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PrewrittenMessage, SessionConfig};
    use std::sync::Arc;
    use yourturn_core::{Metadata, SessionStatus};

    const POLL: Duration = Duration::from_millis(100);

    fn manager_with_default(text: Option<&str>) -> Arc<SessionManager> {
        let prewritten = text
            .map(|t| vec![PrewrittenMessage::new(t).as_default()])
            .unwrap_or_default();
        Arc::new(SessionManager::new(SessionConfig {
            prewritten,
            ..Default::default()
        }))
    }

    fn create(manager: &SessionManager, timeout: Duration) -> Session {
        manager.create_session("Proceed?", Some("chat".to_string()), timeout, Metadata::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_default_returns_none() {
        let manager = manager_with_default(None);
        let session = create(&manager, Duration::from_secs(2));
        let start = Instant::now();

        let response = manager.wait_for_response(&session, POLL).await;

        let elapsed = start.elapsed();
        assert!(response.is_none());
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed <= Duration::from_secs(2) + POLL * 2);
        assert_eq!(
            manager.get_session(&session.id).unwrap().status(),
            SessionStatus::TimedOut
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_returns_promptly() {
        let manager = manager_with_default(None);
        let session = create(&manager, Duration::from_secs(10));

        let submitter = {
            let manager = manager.clone();
            let id = session.id.clone();
            tokio::spawn(async move {
                sleep(Duration::from_secs(1)).await;
                assert!(manager.submit_response(&id, "hello"));
            })
        };

        let start = Instant::now();
        let response = manager.wait_for_response(&session, POLL).await;
        submitter.await.unwrap();

        assert_eq!(response.as_deref(), Some("hello"));
        assert!(start.elapsed() <= Duration::from_secs(1) + POLL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_default_completes_session() {
        let manager = manager_with_default(Some("continuing automatically"));
        let session = create(&manager, Duration::from_secs(1));

        let response = manager.wait_for_response(&session, POLL).await;

        assert_eq!(response.as_deref(), Some("continuing automatically"));
        let stored = manager.get_session(&session.id).unwrap();
        assert_eq!(stored.status(), SessionStatus::Completed);
        assert_eq!(stored.response(), Some("continuing automatically"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_at_last_moment_beats_timeout() {
        let manager = manager_with_default(Some("default"));
        let session = create(&manager, Duration::from_secs(1));

        let submitter = {
            let manager = manager.clone();
            let id = session.id.clone();
            tokio::spawn(async move {
                // Lands just before the deadline; the next poll is after it
                sleep(Duration::from_millis(950)).await;
                manager.submit_response(&id, "human answer")
            })
        };

        let response = manager.wait_for_response(&session, Duration::from_millis(300)).await;
        assert!(submitter.await.unwrap());
        assert_eq!(response.as_deref(), Some("human answer"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errored_session_stops_waiting() {
        let manager = manager_with_default(Some("default"));
        let session = create(&manager, Duration::from_secs(30));

        let failer = {
            let manager = manager.clone();
            let id = session.id.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(250)).await;
                manager.store().mark_errored(&id, "delivery lost").unwrap();
            })
        };

        let start = Instant::now();
        let response = manager.wait_for_response(&session, POLL).await;
        failer.await.unwrap();

        assert!(response.is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_on_already_completed_session() {
        let manager = manager_with_default(None);
        let session = create(&manager, Duration::from_secs(30));
        manager.submit_response(&session.id, "early");

        let response = manager.wait_for_response(&session, POLL).await;
        assert_eq!(response.as_deref(), Some("early"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_on_missing_session() {
        let manager = manager_with_default(None);
        let session = create(&manager, Duration::from_secs(30));
        manager.store().remove(&session.id);

        assert!(manager.wait_for_response(&session, POLL).await.is_none());
    }
}
