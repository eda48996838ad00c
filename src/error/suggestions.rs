//! Fix suggestion database for quotabar errors.
//!
//! Provides actionable fix suggestions mapped to specific error types,
//! including commands, context explanations, and prevention tips.

use std::time::Duration;

// =============================================================================
// Fix Suggestion Types
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Commands to run, in order of preference. Copy-paste ready.
    pub commands: Vec<String>,

    /// Explanation of why this error occurred.
    pub context: String,

    /// Tips to prevent this error in the future.
    pub prevention: Option<String>,

    /// Link to documentation for more information.
    pub doc_url: Option<String>,
}

impl FixSuggestion {
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
            doc_url: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }

    /// Builder: adds documentation URL.
    #[must_use]
    pub fn with_doc_url(mut self, url: impl Into<String>) -> Self {
        self.doc_url = Some(url.into());
        self
    }
}

// =============================================================================
// Suggestion Generators
// =============================================================================

#[must_use]
pub fn auth_required_suggestions() -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![
                "quotabar auth login".to_string(),
                "export QUOTABAR_TOKEN=<token>".to_string(),
            ],
            "No session was found. Quota data can only be read on behalf of a \
             signed-in user.",
        )
        .with_doc_url("https://docs.github.com/en/copilot"),
    ]
}

#[must_use]
pub fn auth_rejected_suggestions(status: u16) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![
                "quotabar auth logout".to_string(),
                "quotabar auth login".to_string(),
            ],
            format!(
                "The server rejected the stored token (HTTP {status}). It may have \
                 expired or been revoked."
            ),
        )
        .with_prevention(
            "Run `quotabar watch` and press Enter after an auth failure to sign in again.",
        ),
    ]
}

#[must_use]
pub fn forbidden_suggestions(message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["quotabar auth status".to_string()],
        format!(
            "The signed-in account may not read quota data: {message}. The token \
             may be missing a required scope."
        ),
    )]
}

#[must_use]
pub fn timeout_suggestions(seconds: u64) -> Vec<FixSuggestion> {
    let context = if seconds == 0 {
        "The quota endpoint did not answer in time.".to_string()
    } else {
        format!("The quota endpoint did not answer within {seconds}s.")
    };
    vec![
        FixSuggestion::new(vec!["quotabar status -v".to_string()], context).with_prevention(
            "Raise `api.timeout_seconds` in config.toml on slow connections.",
        ),
    ]
}

#[must_use]
pub fn network_suggestions(message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["quotabar status -v".to_string()],
        format!("Network error: {message}. Check your internet connection or proxy settings."),
    )]
}

#[must_use]
pub fn config_not_found_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("mkdir -p \"$(dirname {path})\" && touch {path}")],
        format!("No configuration file exists at {path}. Built-in defaults are used otherwise."),
    )]
}

#[must_use]
pub fn config_parse_suggestions(path: &str, line: Option<usize>, message: &str) -> Vec<FixSuggestion> {
    let location = line.map_or_else(|| path.to_string(), |l| format!("{path}:{l}"));
    vec![
        FixSuggestion::new(
            vec![format!("$EDITOR {path}")],
            format!("The configuration at {location} is not valid TOML: {message}"),
        )
        .with_prevention("Run `quotabar config show` after editing to verify the result."),
    ]
}

#[must_use]
pub fn config_invalid_suggestions(key: &str, value: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["quotabar config show".to_string()],
        format!("'{value}' is not a valid value for {key}: {message}"),
    )]
}

#[must_use]
pub fn rate_limited_suggestions(retry_after: Option<Duration>) -> Vec<FixSuggestion> {
    let context = retry_after.map_or_else(
        || "The quota endpoint is rate limiting requests.".to_string(),
        |d| {
            format!(
                "The quota endpoint is rate limiting requests. Retry in {}s.",
                d.as_secs()
            )
        },
    );
    vec![
        FixSuggestion::new(vec!["quotabar cache show".to_string()], context).with_prevention(
            "Increase `refresh.interval_seconds` to poll less often.",
        ),
    ]
}

#[must_use]
pub fn server_error_suggestions(status: u16) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["quotabar cache show".to_string()],
        format!(
            "The quota service returned HTTP {status}. This is usually transient; \
             cached data stays available meanwhile."
        ),
    )]
}

#[must_use]
pub fn no_subscription_suggestions() -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["quotabar auth status".to_string()],
            "The signed-in account has no quota entitlement. Check that the right \
             account is signed in.",
        )
        .with_doc_url("https://docs.github.com/en/copilot"),
    ]
}

#[must_use]
pub fn keyring_suggestions(message: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["export QUOTABAR_TOKEN=<token>".to_string()],
            format!("The OS keyring could not be used: {message}"),
        )
        .with_prevention("On headless Linux, make sure a Secret Service provider is running."),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_mentions_retry_after() {
        let suggestions = rate_limited_suggestions(Some(Duration::from_secs(42)));
        assert!(suggestions[0].context.contains("42s"));
    }

    #[test]
    fn config_parse_includes_line() {
        let suggestions = config_parse_suggestions("/tmp/config.toml", Some(3), "bad");
        assert!(suggestions[0].context.contains("/tmp/config.toml:3"));
    }
}
