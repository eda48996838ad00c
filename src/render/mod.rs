//! Output rendering for human and JSON modes.

pub mod error;
pub mod human;

use std::time::Duration;

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::core::models::{CachedSnapshot, ChangeEvent, DisplayState, UsageSnapshot};
use crate::core::state::usage_percent;
use crate::error::{FetchError, Result};
use crate::storage::cache::Freshness;
use crate::storage::config::ResolvedConfig;

/// What `status` and `watch` print for one change event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub state: DisplayState,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<UsageSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_percent: Option<f64>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Freshness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchError>,
}

impl UsageReport {
    #[must_use]
    pub fn from_event(event: &ChangeEvent, state: DisplayState, authenticated: bool) -> Self {
        Self {
            state,
            authenticated,
            snapshot: event.snapshot.clone(),
            usage_percent: event.snapshot.as_ref().and_then(usage_percent),
            from_cache: event.from_cache,
            cache_age_ms: event.cache_age_ms,
            freshness: event
                .cache_age_ms
                .map(|ms| Freshness::from_age(Duration::from_millis(ms))),
            error: event.error.clone(),
        }
    }
}

/// What `cache show` prints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheReport {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<CachedSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Freshness>,
}

/// Render a usage report.
///
/// # Errors
///
/// Returns error if JSON serialization fails.
pub fn render_usage(
    report: &UsageReport,
    format: OutputFormat,
    pretty: bool,
    color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_usage(report, color)),
        OutputFormat::Json => to_json(report, pretty),
    }
}

/// Render the cache inspection.
///
/// # Errors
///
/// Returns error if JSON serialization fails.
pub fn render_cache(
    report: &CacheReport,
    format: OutputFormat,
    pretty: bool,
    color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_cache(report, color)),
        OutputFormat::Json => to_json(report, pretty),
    }
}

/// Render resolved configuration with sources.
///
/// # Errors
///
/// Returns error if JSON serialization fails.
pub fn render_config(
    config: &ResolvedConfig,
    format: OutputFormat,
    pretty: bool,
    color: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_config(config, color)),
        OutputFormat::Json => to_json(&human::config_entries(config), pretty),
    }
}

/// Serialize any value as JSON.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_snapshot;

    #[test]
    fn report_from_fallback_event() {
        let cached = CachedSnapshot {
            data: make_snapshot(30.0, 300.0),
            cached_at: chrono::Utc::now() - chrono::TimeDelta::minutes(10),
        };
        let event = ChangeEvent::fallback(
            FetchError::from_status(503, "down"),
            Some(cached),
            chrono::Utc::now(),
        );
        let report = UsageReport::from_event(&event, DisplayState::Error, true);
        assert_eq!(report.freshness, Some(Freshness::Valid));
        assert!((report.usage_percent.unwrap() - 10.0).abs() < 1e-9);

        let json: serde_json::Value =
            serde_json::from_str(&render_usage(&report, OutputFormat::Json, false, false).unwrap())
                .unwrap();
        assert_eq!(json["state"], "error");
        assert_eq!(json["fromCache"], true);
        assert_eq!(json["error"]["kind"], "server");
        assert_eq!(json["freshness"], "valid");
    }
}
