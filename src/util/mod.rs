//! Utility functions.

pub mod env;
pub mod format;
pub mod time;

pub use format::{format_count, format_percent, progress_bar};
pub use time::{format_age_ms, format_countdown};
