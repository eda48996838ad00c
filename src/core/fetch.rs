//! Quota fetching with retry and backoff.
//!
//! [`FetchClient`] performs one single-flight GET against the quota endpoint,
//! classifies failures into [`FetchErrorKind`]s and retries the transient
//! ones with exponential backoff. It never touches the cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::core::http::{
    DEFAULT_ENDPOINT, DEFAULT_TIMEOUT, build_client, classify_transport_error, parse_retry_after,
    summarize_body,
};
use crate::core::models::UsageSnapshot;
use crate::error::{FetchError, FetchErrorKind, Result};

/// Default quota entry read from `quota_snapshots`.
pub const DEFAULT_QUOTA_KEY: &str = "premium_interactions";

// =============================================================================
// Options
// =============================================================================

/// Retry and timeout settings for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Deadline for each attempt, not for the whole fetch.
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl FetchOptions {
    /// Delay after the failed attempt with zero-based index `attempt`:
    /// `min(base * 2^attempt, max)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Backoff delay, stretched to honour a server `Retry-After` (still capped).
    #[must_use]
    pub fn retry_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff_delay(attempt);
        retry_after.map_or(backoff, |ra| backoff.max(ra).min(self.max_delay))
    }
}

// =============================================================================
// Fetcher seam
// =============================================================================

/// Something that can produce a usage snapshot for a token.
///
/// Implemented by [`FetchClient`]; tests substitute scripted fetchers.
#[async_trait]
pub trait UsageFetcher: Send + Sync {
    /// # Errors
    ///
    /// Returns a classified [`FetchError`] once retries are exhausted, the
    /// failure is not retryable, or `cancel` fires.
    async fn fetch(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<UsageSnapshot, FetchError>;
}

// =============================================================================
// Fetch Client
// =============================================================================

/// HTTP client for the quota endpoint.
pub struct FetchClient {
    client: Client,
    endpoint: String,
    quota_key: String,
    budget_total: f64,
    options: FetchOptions,
    in_flight: AtomicBool,
}

impl FetchClient {
    /// Client for the default endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Client for a custom endpoint (used by tests and enterprise hosts).
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            endpoint: endpoint.into(),
            quota_key: DEFAULT_QUOTA_KEY.to_string(),
            budget_total: 0.0,
            options: FetchOptions::default(),
            in_flight: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn quota_key(mut self, key: impl Into<String>) -> Self {
        self.quota_key = key.into();
        self
    }

    /// Overage allowance reported as `budget_total` on every snapshot.
    #[must_use]
    pub const fn budget_total(mut self, budget_total: f64) -> Self {
        self.budget_total = budget_total;
        self
    }

    #[must_use]
    pub const fn options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether a fetch is currently running.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Fetch with explicit options.
    ///
    /// # Errors
    ///
    /// - `Conflict` immediately if another fetch is in flight.
    /// - `Cancelled` if `cancel` fires during a request or a backoff sleep.
    /// - The last classified error once retries are exhausted or on a
    ///   non-retryable failure.
    pub async fn fetch_with(
        &self,
        token: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> std::result::Result<UsageSnapshot, FetchError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::warn!("fetch requested while another fetch is in flight");
            return Err(FetchError::conflict());
        };

        let max_attempts = options.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::cancelled());
            }
            tracing::debug!(
                attempt = attempt + 1,
                max_attempts,
                endpoint = %self.endpoint,
                "fetching usage"
            );

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FetchError::cancelled()),
                outcome = tokio::time::timeout(options.timeout, self.attempt(token)) => {
                    outcome.unwrap_or_else(|_| {
                        Err(FetchError::new(
                            FetchErrorKind::Timeout,
                            format!("no response within {}ms", options.timeout.as_millis()),
                        ))
                    })
                }
            };

            let err = match result {
                Ok(snapshot) => {
                    tracing::debug!(attempt = attempt + 1, "usage fetched");
                    return Ok(snapshot);
                }
                Err(err) => err,
            };

            attempt += 1;
            if !err.retryable() || attempt >= max_attempts {
                tracing::warn!(
                    kind = %err.kind,
                    status = ?err.status,
                    attempts = attempt,
                    "usage fetch failed: {}",
                    err.message
                );
                return Err(err);
            }

            let delay = options.retry_delay(attempt - 1, err.retry_after);
            tracing::warn!(
                kind = %err.kind,
                status = ?err.status,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "transient fetch failure, retrying"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FetchError::cancelled()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One request, without retries or deadline.
    async fn attempt(&self, token: &str) -> std::result::Result<UsageSnapshot, FetchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {}", summarize_body(&body))
            };
            return Err(FetchError::from_status(status.as_u16(), message).with_retry_after(retry_after));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))?;
        parse_quota_response(&body, &self.quota_key, self.budget_total, Utc::now())
    }
}

#[async_trait]
impl UsageFetcher for FetchClient {
    async fn fetch(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<UsageSnapshot, FetchError> {
        let options = self.options;
        self.fetch_with(token, &options, cancel).await
    }
}

/// Clears the in-flight flag when the fetch ends, however it ends.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// =============================================================================
// Response parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct QuotaResponse {
    #[serde(default)]
    quota_snapshots: Option<HashMap<String, QuotaEntry>>,
    #[serde(default)]
    quota_reset_date_utc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuotaEntry {
    #[serde(default)]
    entitlement: Option<f64>,
    #[serde(default)]
    remaining: Option<f64>,
    #[serde(default)]
    overage_count: Option<f64>,
    #[serde(default)]
    unlimited: Option<bool>,
}

/// Parse a quota response body into a snapshot.
///
/// `included_used = entitlement - remaining` (clamped at 0) and
/// `budget_used = overage_count`, defaulting to 0. An entitlement of `-1` or
/// `unlimited: true` yields an unlimited snapshot.
///
/// # Errors
///
/// Returns a `Validation` error if the body is not JSON, the quota entry is
/// missing, or the entitlement/remaining pair is incomplete.
pub fn parse_quota_response(
    body: &str,
    quota_key: &str,
    budget_total: f64,
    captured_at: DateTime<Utc>,
) -> std::result::Result<UsageSnapshot, FetchError> {
    let response: QuotaResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::validation(format!("malformed quota response: {e}")))?;

    let entry = response
        .quota_snapshots
        .as_ref()
        .and_then(|snapshots| snapshots.get(quota_key))
        .ok_or_else(|| FetchError::validation(format!("missing quota entry '{quota_key}'")))?;

    let period_end = response
        .quota_reset_date_utc
        .as_deref()
        .and_then(parse_reset_date);

    let budget_used = entry.overage_count.unwrap_or(0.0).max(0.0);

    let unlimited = entry.unlimited.unwrap_or(false) || entry.entitlement.is_some_and(|e| e < 0.0);
    if unlimited {
        return Ok(UsageSnapshot {
            included_used: 0.0,
            included_total: 0.0,
            budget_used,
            budget_total,
            captured_at,
            period_end,
            unlimited: true,
        });
    }

    let (Some(entitlement), Some(remaining)) = (entry.entitlement, entry.remaining) else {
        return Err(FetchError::validation(format!(
            "quota entry '{quota_key}' lacks entitlement/remaining"
        )));
    };

    Ok(UsageSnapshot {
        included_used: (entitlement - remaining).max(0.0),
        included_total: entitlement,
        budget_used,
        budget_total,
        captured_at,
        period_end,
        unlimited: false,
    })
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
fn parse_reset_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
