//! Human-readable terminal output.

use colored::{ColoredString, Colorize};
use serde::Serialize;

use super::{CacheReport, UsageReport};
use crate::core::models::{DisplayState, UsageSnapshot};
use crate::storage::cache::Freshness;
use crate::storage::config::{ConfigSource, ResolvedConfig};
use crate::util::{format_age_ms, format_count, format_countdown, format_percent, progress_bar};

const BAR_WIDTH: usize = 20;

fn paint(text: ColoredString, color: bool) -> String {
    if color {
        text.to_string()
    } else {
        text.clear().to_string()
    }
}

fn state_badge(state: DisplayState, color: bool) -> String {
    let label = format!("[{}]", state.label());
    let styled = match state {
        DisplayState::Normal => label.green(),
        DisplayState::Warning => label.yellow().bold(),
        DisplayState::Error => label.red().bold(),
        DisplayState::NoAuth | DisplayState::NoSubscription => label.magenta(),
        DisplayState::Loading => label.dimmed(),
    };
    paint(styled, color)
}

// =============================================================================
// Usage
// =============================================================================

#[must_use]
pub fn render_usage(report: &UsageReport, color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        paint("Premium requests".bold(), color),
        state_badge(report.state, color)
    )];

    match report.state {
        DisplayState::NoAuth => {
            lines.push("  Not signed in. Run `quotabar auth login`.".to_string());
            return lines.join("\n");
        }
        DisplayState::NoSubscription => {
            lines.push("  No quota found for this account.".to_string());
        }
        _ => {}
    }

    match &report.snapshot {
        Some(snapshot) => lines.extend(snapshot_lines(snapshot, report, color)),
        None if report.state != DisplayState::NoSubscription => {
            lines.push(format!("  {}", paint("No usage data yet.".dimmed(), color)));
        }
        None => {}
    }

    if report.from_cache {
        if let Some(age) = report.cache_age_ms {
            let freshness = report.freshness.map_or("", freshness_label);
            lines.push(format!(
                "  {}",
                paint(format!("cached {} ({freshness})", format_age_ms(age)).dimmed(), color)
            ));
        }
    }

    if let Some(error) = &report.error {
        if report.state != DisplayState::NoSubscription {
            lines.push(format!(
                "  {} {}",
                paint("Error:".red().bold(), color),
                error
            ));
        }
    }

    lines.join("\n")
}

fn snapshot_lines(snapshot: &UsageSnapshot, report: &UsageReport, color: bool) -> Vec<String> {
    let prefix = report.freshness.map_or("", Freshness::prefix);
    let mut lines = Vec::new();

    if snapshot.unlimited {
        lines.push(format!("  {}", paint("Unlimited".green(), color)));
    } else if let Some(percent) = report.usage_percent {
        let bar = progress_bar(percent, BAR_WIDTH);
        let bar = match report.state {
            DisplayState::Warning => paint(bar.yellow(), color),
            DisplayState::Error => paint(bar.red(), color),
            _ => paint(bar.green(), color),
        };
        lines.push(format!(
            "  {bar} {prefix}{}  {prefix}{} / {} used",
            format_percent(percent),
            format_count(snapshot.included_used),
            format_count(snapshot.included_total),
        ));
    }

    if snapshot.budget_used > 0.0 || snapshot.budget_total > 0.0 {
        let budget = if snapshot.budget_total > 0.0 {
            format!(
                "{} / {}",
                format_count(snapshot.budget_used),
                format_count(snapshot.budget_total)
            )
        } else {
            format_count(snapshot.budget_used)
        };
        lines.push(format!("  Overage: {prefix}{budget}"));
    }

    if let Some(period_end) = snapshot.period_end {
        lines.push(format!(
            "  Resets {} ({})",
            format_countdown(period_end),
            period_end.format("%Y-%m-%d")
        ));
    }
    lines
}

const fn freshness_label(freshness: Freshness) -> &'static str {
    match freshness {
        Freshness::Fresh => "fresh",
        Freshness::Valid => "recent",
        Freshness::Stale => "stale",
        Freshness::VeryStale => "very stale",
    }
}

// =============================================================================
// Cache
// =============================================================================

#[must_use]
pub fn render_cache(report: &CacheReport, color: bool) -> String {
    let mut lines = vec![format!("{} {}", paint("Cache:".bold(), color), report.path)];
    match &report.entry {
        None => lines.push("  (empty)".to_string()),
        Some(entry) => {
            let data = &entry.data;
            lines.push(format!(
                "  included {} / {}, overage {}",
                format_count(data.included_used),
                format_count(data.included_total),
                format_count(data.budget_used)
            ));
            lines.push(format!(
                "  cached at {}",
                entry.cached_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            if let (Some(age), Some(freshness)) = (report.age_ms, report.freshness) {
                lines.push(format!(
                    "  {} ({})",
                    format_age_ms(age),
                    freshness_label(freshness)
                ));
            }
        }
    }
    lines.join("\n")
}

// =============================================================================
// Config
// =============================================================================

/// One resolved setting.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigEntry {
    pub key: &'static str,
    pub value: String,
    pub source: ConfigSource,
}

#[must_use]
pub fn config_entries(config: &ResolvedConfig) -> Vec<ConfigEntry> {
    let s = &config.sources;
    let entry = |key: &'static str, value: String, source: ConfigSource| ConfigEntry {
        key,
        value,
        source,
    };
    vec![
        entry(
            "refresh.interval_seconds",
            config.refresh.interval_secs().to_string(),
            s.interval,
        ),
        entry(
            "refresh.enabled",
            config.refresh.enabled.to_string(),
            s.auto_refresh,
        ),
        entry(
            "display.warning_threshold_percent",
            config.warning_threshold.to_string(),
            s.warning_threshold,
        ),
        entry("api.endpoint", config.endpoint.clone(), s.endpoint),
        entry("api.quota_key", config.quota_key.clone(), s.quota_key),
        entry(
            "api.overage_budget",
            config.overage_budget.to_string(),
            s.overage_budget,
        ),
        entry(
            "api.timeout_seconds",
            config.fetch.timeout.as_secs().to_string(),
            s.timeout,
        ),
        entry(
            "api.max_attempts",
            config.fetch.max_attempts.to_string(),
            s.max_attempts,
        ),
        entry("output.format", config.format.as_str().to_string(), s.format),
        entry("output.pretty", config.pretty.to_string(), s.pretty),
        entry("output.no_color", config.no_color.to_string(), s.no_color),
    ]
}

#[must_use]
pub fn render_config(config: &ResolvedConfig, color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        paint("Config file:".bold(), color),
        config.config_path.display()
    )];
    for entry in config_entries(config) {
        lines.push(format!(
            "  {:<36} {:<48} {}",
            entry.key,
            entry.value,
            paint(format!("({})", entry.source).dimmed(), color)
        ));
    }
    lines.join("\n")
}
