//! Error types for YourTurn Core

use thiserror::Error;

use crate::session::{SessionId, SessionStatus};

#[derive(Debug, Error)]
pub enum Error {
    // Submission errors
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("Session {id} is no longer active (status: {status})")]
    InactiveSession { id: SessionId, status: SessionStatus },

    #[error("Session {0} expired before the response arrived")]
    ExpiredSession(SessionId),

    #[error("Invalid transition for session {id}: {from} cannot move to {to}")]
    InvalidTransition {
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    },

    // Collaborator errors
    #[error("Delivery failure: {0}")]
    DeliveryFailure(String),

    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Alert failed: {0}")]
    Alert(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
