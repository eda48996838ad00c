//! Time formatting utilities.

use chrono::{DateTime, Utc};

/// Format a countdown to a future time.
#[must_use]
pub fn format_countdown(target: DateTime<Utc>) -> String {
    format_countdown_from(target, Utc::now())
}

#[must_use]
pub fn format_countdown_from(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = target.signed_duration_since(now);

    if duration.num_seconds() <= 0 {
        return "now".to_string();
    }

    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;

    if hours > 24 {
        let days = hours / 24;
        format!("in {days} day{}", if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {hours}h {minutes}m")
    } else if minutes > 0 {
        format!("in {minutes}m")
    } else {
        format!("in {}s", duration.num_seconds())
    }
}

/// Format a cache age given in milliseconds, e.g. `"3m ago"`.
#[must_use]
pub fn format_age_ms(age_ms: u64) -> String {
    let secs = age_ms / 1000;
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        let days = secs / 86_400;
        format!("{days} day{} ago", if days == 1 { "" } else { "s" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn countdown_hours() {
        let now = Utc::now();
        let target = now + Duration::hours(3) + Duration::minutes(30);
        assert_eq!(format_countdown_from(target, now), "in 3h 30m");
    }

    #[test]
    fn countdown_days_and_past() {
        let now = Utc::now();
        assert_eq!(format_countdown_from(now + Duration::days(3), now), "in 3 days");
        assert_eq!(format_countdown_from(now - Duration::minutes(1), now), "now");
    }

    #[test]
    fn cache_ages() {
        assert_eq!(format_age_ms(5_000), "just now");
        assert_eq!(format_age_ms(5 * 60_000), "5m ago");
        assert_eq!(format_age_ms(2 * 3_600_000), "2h ago");
        assert_eq!(format_age_ms(86_400_000), "1 day ago");
    }
}
