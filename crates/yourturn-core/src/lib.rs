//! YourTurn Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout YourTurn:
//! - Interactive session model and its state machine
//! - Collaborator traits for reply channels and alerts
//! - Core error types

pub mod channel;
pub mod error;
pub mod session;

pub use channel::{Alert, Channel};
pub use error::{Error, Result};
pub use session::{Metadata, Session, SessionId, SessionStatus, Transition, timeout_from_secs};
