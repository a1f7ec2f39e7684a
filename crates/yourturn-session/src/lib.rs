//! YourTurn Interactive Sessions
//!
//! This crate tracks questions sent to a human and collects their replies:
//! - Session store with atomic submit/expire transitions
//! - Response waiter bridging a request/response call to an async reply
//! - Background sweeper expiring abandoned sessions
//! - Response collector producing a best-effort result

pub mod cleanup;
pub mod collector;
pub mod config;
pub mod manager;
pub mod store;
pub mod waiter;

pub use cleanup::{SweepStats, SweeperTask, spawn_sweeper, sweep};
pub use collector::{CollectionResult, ResponseCollector};
pub use config::{CollectorConfig, PrewrittenMessage, SessionConfig};
pub use manager::{ReplyOutcome, SessionManager};
pub use store::SessionStore;
