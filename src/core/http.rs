//! HTTP client utilities.
//!
//! Builds the shared client for the quota endpoint and turns transport-level
//! failures into [`FetchError`]s.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, ClientBuilder};

use crate::error::{FetchError, FetchErrorKind, QuotaError, Result};

/// Default quota endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.github.com/copilot_internal/user";

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection establishment timeout; the per-attempt deadline still applies.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `User-Agent` sent with every request.
#[must_use]
pub fn user_agent() -> String {
    format!("quotabar/{}", env!("CARGO_PKG_VERSION"))
}

/// Build a configured HTTP client.
///
/// No total timeout is set on the client; callers bound each attempt.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client() -> Result<Client> {
    ClientBuilder::new()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(user_agent())
        .build()
        .map_err(|e| QuotaError::Network(e.to_string()))
}

/// Classify a transport error from reqwest.
#[must_use]
pub fn classify_transport_error(err: &reqwest::Error) -> FetchError {
    let kind = if err.is_timeout() {
        FetchErrorKind::Timeout
    } else if err.is_decode() {
        FetchErrorKind::Validation
    } else {
        FetchErrorKind::Network
    };
    FetchError::new(kind, err.to_string())
}

/// Parse a `Retry-After` header given in seconds.
///
/// HTTP-date values are ignored.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Shorten an error body for log and error messages.
#[must_use]
pub fn summarize_body(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn user_agent_has_version() {
        assert!(user_agent().starts_with("quotabar/"));
    }

    #[test]
    fn retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn summarize_truncates_long_bodies() {
        let long = "x".repeat(500);
        let summary = summarize_body(&long);
        assert_eq!(summary.len(), 203);
        assert_eq!(summarize_body("  short \n"), "short");
    }
}
