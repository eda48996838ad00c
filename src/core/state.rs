//! Display state resolution.
//!
//! Pure functions: consumers call [`determine_state`] whenever they render.
//! Because the state is re-derived from current conditions every time, there
//! is no stored state machine and no transition to reject.

use crate::core::models::{DisplayState, UsageSnapshot};
use crate::error::FetchError;

/// Default warning threshold in percent.
pub const DEFAULT_WARNING_THRESHOLD: f64 = 90.0;

/// Resolve the display state. Checks run in strict priority order:
///
/// 1. not signed in -> [`DisplayState::NoAuth`]
/// 2. no subscription -> [`DisplayState::NoSubscription`]
/// 3. any error -> [`DisplayState::Error`]
/// 4. no snapshot yet -> [`DisplayState::Loading`]
/// 5. usage at or above the threshold -> [`DisplayState::Warning`]
/// 6. otherwise [`DisplayState::Normal`]
#[must_use]
pub fn determine_state(
    snapshot: Option<&UsageSnapshot>,
    is_authenticated: bool,
    has_subscription: bool,
    error: Option<&FetchError>,
    warning_threshold: f64,
) -> DisplayState {
    if !is_authenticated {
        return DisplayState::NoAuth;
    }
    if !has_subscription {
        return DisplayState::NoSubscription;
    }
    if error.is_some() {
        return DisplayState::Error;
    }
    let Some(snapshot) = snapshot else {
        return DisplayState::Loading;
    };
    if is_warning_threshold_exceeded(snapshot, warning_threshold) {
        DisplayState::Warning
    } else {
        DisplayState::Normal
    }
}

/// Included usage in percent, or `None` when there is no bounded quota.
#[must_use]
pub fn usage_percent(snapshot: &UsageSnapshot) -> Option<f64> {
    if snapshot.unlimited || snapshot.included_total <= 0.0 {
        return None;
    }
    Some(snapshot.included_used / snapshot.included_total * 100.0)
}

/// Usage of included quota plus overage budget, in percent.
///
/// Not used for the warning decision; offered for consumers that want to
/// show how close the combined allowance is to exhaustion.
#[must_use]
pub fn combined_usage_percent(snapshot: &UsageSnapshot) -> Option<f64> {
    if snapshot.unlimited {
        return None;
    }
    let total = snapshot.included_total + snapshot.budget_total;
    if total <= 0.0 {
        return None;
    }
    Some((snapshot.included_used + snapshot.budget_used) / total * 100.0)
}

/// Whether included usage has reached `threshold` percent.
///
/// A zero total short-circuits to `false`.
#[must_use]
pub fn is_warning_threshold_exceeded(snapshot: &UsageSnapshot, threshold: f64) -> bool {
    usage_percent(snapshot).is_some_and(|percent| percent >= threshold)
}

/// Check snapshot invariants.
///
/// Usage above the included total is overage and is accepted.
///
/// # Errors
///
/// Returns a `Validation` error when the total is not positive or a usage
/// counter is negative.
pub fn validate(snapshot: &UsageSnapshot) -> Result<(), FetchError> {
    if snapshot.included_total <= 0.0 {
        return Err(FetchError::validation(format!(
            "included total must be positive, got {}",
            snapshot.included_total
        )));
    }
    if snapshot.included_used < 0.0 {
        return Err(FetchError::validation(format!(
            "included usage must not be negative, got {}",
            snapshot.included_used
        )));
    }
    if snapshot.budget_used < 0.0 {
        return Err(FetchError::validation(format!(
            "budget usage must not be negative, got {}",
            snapshot.budget_used
        )));
    }
    Ok(())
}
