//! End-to-end integration tests for YourTurn
//!
//! These tests wire the response collector, the session manager and the
//! Telegram channel together against a mocked Bot API.
