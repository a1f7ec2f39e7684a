//! Collaborator traits
//!
//! The session machinery never talks to a messaging service or a speaker
//! directly. A [`Channel`] delivers questions and feeds replies back through
//! the session manager; an [`Alert`] gets the human's attention.

use async_trait::async_trait;

use crate::{Result, session::Session};

/// A messaging channel that can carry questions to a human
///
/// Implementations deliver the question and, on an independent code path,
/// submit inbound replies to the session manager (selecting the most recent
/// active session for the replying target).
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short channel name for logs (e.g. "telegram")
    fn name(&self) -> &str;

    /// Target used when the caller does not name one
    fn default_target(&self) -> Option<&str> {
        None
    }

    /// Whether the channel can currently deliver and receive
    async fn is_live(&self) -> bool;

    /// Bring the channel up (verify credentials, start receiving replies)
    ///
    /// # Errors
    /// - `Error::ChannelUnavailable` if the channel cannot be brought up
    async fn ensure_live(&self) -> Result<()>;

    /// Deliver the session's question to its target
    ///
    /// # Errors
    /// - `Error::DeliveryFailure` if the question was not delivered
    async fn deliver(&self, session: &Session) -> Result<()>;
}

/// Fire-and-forget attention signal (sound, bell, desktop notification)
pub trait Alert: Send + Sync {
    /// Raise the alert. Callers log failures and carry on.
    fn alert(&self, reason: &str) -> Result<()>;
}
