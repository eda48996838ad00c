//! Shared helpers for integration tests.
//!
//! - `fixtures`: quota endpoint bodies and mock server setup
//! - `logger`: per-test structured logging

pub mod fixtures;
pub mod logger;
