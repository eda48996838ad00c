//! Core data models.
//!
//! These types describe one quota reading and the events that carry it to
//! consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

// =============================================================================
// Usage Snapshot
// =============================================================================

/// One quota reading.
///
/// # Fields
/// - `included_used` / `included_total`: requests consumed from / granted by the plan.
/// - `budget_used` / `budget_total`: overage consumed and the configured overage
///   allowance (0 when none is configured).
/// - `captured_at`: when the reading was fetched.
/// - `period_end`: when the included quota resets, if the server reported it.
/// - `unlimited`: the plan grants an unbounded quota; `included_total` is 0.
///
/// Usage may exceed `included_total` once overage begins. Snapshots are
/// immutable; a newer fetch supersedes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub included_used: f64,
    pub included_total: f64,
    pub budget_used: f64,
    pub budget_total: f64,
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unlimited: bool,
}

impl UsageSnapshot {
    /// Snapshot with no overage, captured now.
    #[must_use]
    pub fn new(included_used: f64, included_total: f64) -> Self {
        Self {
            included_used,
            included_total,
            budget_used: 0.0,
            budget_total: 0.0,
            captured_at: Utc::now(),
            period_end: None,
            unlimited: false,
        }
    }

    #[must_use]
    pub const fn with_budget(mut self, budget_used: f64, budget_total: f64) -> Self {
        self.budget_used = budget_used;
        self.budget_total = budget_total;
        self
    }

    #[must_use]
    pub const fn with_period_end(mut self, period_end: DateTime<Utc>) -> Self {
        self.period_end = Some(period_end);
        self
    }

    /// Included requests left before overage starts (never negative).
    #[must_use]
    pub fn included_remaining(&self) -> f64 {
        (self.included_total - self.included_used).max(0.0)
    }

    /// Whether usage has gone past the included quota.
    #[must_use]
    pub fn is_in_overage(&self) -> bool {
        !self.unlimited && self.included_total > 0.0 && self.included_used > self.included_total
    }
}

// =============================================================================
// Cached Snapshot
// =============================================================================

/// The persisted form of the last good snapshot.
///
/// `cached_at` is serialized as epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedSnapshot {
    pub data: UsageSnapshot,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub cached_at: DateTime<Utc>,
}

impl CachedSnapshot {
    /// Age of the entry in milliseconds, clamped at 0 for clock skew.
    #[must_use]
    pub fn age_ms(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.cached_at).num_milliseconds()).unwrap_or(0)
    }
}

// =============================================================================
// Change Event
// =============================================================================

/// Delivered to every `on_data_change` subscriber after each refresh.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub snapshot: Option<UsageSnapshot>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age_ms: Option<u64>,
}

impl ChangeEvent {
    /// A fresh snapshot straight from the network.
    #[must_use]
    pub const fn fresh(snapshot: UsageSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            from_cache: false,
            error: None,
            cache_age_ms: None,
        }
    }

    /// A failure, with the cached fallback when one exists.
    #[must_use]
    pub fn fallback(error: FetchError, cached: Option<CachedSnapshot>, now: DateTime<Utc>) -> Self {
        let cache_age_ms = cached.as_ref().map(|c| c.age_ms(now));
        Self {
            snapshot: cached.map(|c| c.data),
            from_cache: true,
            error: Some(error),
            cache_age_ms,
        }
    }

    /// No session: nothing was fetched and nothing may be shown.
    #[must_use]
    pub fn signed_out() -> Self {
        Self {
            snapshot: None,
            from_cache: false,
            error: Some(FetchError::auth_required()),
            cache_age_ms: None,
        }
    }
}

// =============================================================================
// Display State
// =============================================================================

/// Which presentation a consumer should pick.
///
/// Not persisted; recomputed from current conditions by
/// [`crate::core::state::determine_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisplayState {
    Loading,
    Normal,
    Warning,
    Error,
    NoAuth,
    NoSubscription,
}

impl DisplayState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::NoAuth => "signed out",
            Self::NoSubscription => "no subscription",
        }
    }
}

impl std::fmt::Display for DisplayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn overage_is_not_an_error() {
        let snapshot = UsageSnapshot::new(320.0, 300.0).with_budget(20.0, 50.0);
        assert!(snapshot.is_in_overage());
        assert!(snapshot.included_remaining().abs() < f64::EPSILON);
    }

    #[test]
    fn cached_snapshot_serializes_epoch_millis() {
        let cached_at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let entry = CachedSnapshot {
            data: UsageSnapshot::new(1.0, 2.0),
            cached_at,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["cachedAt"], 1_700_000_000_123_i64);
        assert_eq!(json["data"]["includedTotal"], 2.0);

        let back: CachedSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn cache_age_clamps_future_timestamps() {
        let now = Utc::now();
        let entry = CachedSnapshot {
            data: UsageSnapshot::new(1.0, 2.0),
            cached_at: now + TimeDelta::seconds(10),
        };
        assert_eq!(entry.age_ms(now), 0);
    }

    #[test]
    fn fallback_event_reports_cache_age() {
        let now = Utc::now();
        let cached = CachedSnapshot {
            data: UsageSnapshot::new(10.0, 100.0),
            cached_at: now - TimeDelta::seconds(90),
        };
        let event = ChangeEvent::fallback(FetchError::auth_required(), Some(cached), now);
        assert!(event.from_cache);
        assert_eq!(event.cache_age_ms, Some(90_000));
        assert!(event.snapshot.is_some());

        let empty = ChangeEvent::fallback(FetchError::auth_required(), None, now);
        assert!(empty.snapshot.is_none());
        assert!(empty.cache_age_ms.is_none());
    }
}
