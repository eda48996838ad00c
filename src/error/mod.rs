//! Error types for quotabar.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Two layers
//!
//! - [`FetchError`] is what the usage pipeline produces. Every failure of a
//!   quota fetch is classified into a [`FetchErrorKind`] that decides whether
//!   it is retried and how consumers present it. It never escapes the
//!   coordinator as a Rust error; it travels inside change events.
//! - [`QuotaError`] is the application error used by CLI, config and storage
//!   paths. Each variant has a stable error code (e.g., `QB-A001`), a category
//!   and fix suggestions.

pub mod suggestions;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub use suggestions::FixSuggestion;

// =============================================================================
// Fetch Errors
// =============================================================================

/// Classification of a failed usage fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Connection, DNS or TLS failure before an HTTP status was received.
    Network,
    /// HTTP 401: the token was rejected.
    Auth,
    /// HTTP 403.
    Forbidden,
    /// HTTP 404.
    NotFound,
    /// HTTP 429.
    RateLimit,
    /// HTTP 5xx.
    Server,
    /// The attempt exceeded its per-attempt deadline.
    Timeout,
    /// The response body lacked required quota fields.
    Validation,
    /// Anything else (unexpected status codes, unreadable bodies).
    Unknown,
    /// No session or no token available; no request was made.
    AuthRequired,
    /// A fetch was started while another one was in flight.
    Conflict,
    /// The fetch was aborted through its cancellation token.
    Cancelled,
}

impl FetchErrorKind {
    /// Whether a failure of this kind is worth another attempt.
    #[must_use]
    pub const fn retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::RateLimit | Self::Server | Self::Timeout
        )
    }

    /// Classify an HTTP status code.
    ///
    /// Only meaningful for non-success statuses.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Auth,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }

    /// Stable lowercase name, used in logs and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::RateLimit => "rate_limit",
            Self::Server => "server",
            Self::Timeout => "timeout",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
            Self::AuthRequired => "auth_required",
            Self::Conflict => "conflict",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified usage fetch failure.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{kind} error: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    /// Server-provided `Retry-After`, only set for rate limits.
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

impl FetchError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Create an error from a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::from_status(status),
            status: Some(status),
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// No session exists; surfaced without a network call.
    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(FetchErrorKind::AuthRequired, "not signed in")
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Validation, message)
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(FetchErrorKind::Cancelled, "fetch cancelled")
    }

    #[must_use]
    pub fn conflict() -> Self {
        Self::new(FetchErrorKind::Conflict, "a fetch is already in flight")
    }

    #[must_use]
    pub const fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing, expired or rejected credentials.
    Authentication,
    /// Timeout, DNS, connection refused.
    Network,
    /// Config parse errors and invalid values.
    Configuration,
    /// Rate limits, server errors, unexpected responses.
    Provider,
    /// Keyring and filesystem problems.
    Environment,
    /// Bugs and unclassified failures.
    Internal,
}

impl ErrorCategory {
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication error",
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Provider => "Provider error",
            Self::Environment => "Environment error",
            Self::Internal => "Internal error",
        }
    }

    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Authentication => "A",
            Self::Network => "N",
            Self::Configuration => "C",
            Self::Provider => "P",
            Self::Environment => "E",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Not signed in or credentials rejected
    AuthError = 2,
    /// Config or response parse errors
    ParseError = 3,
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

// =============================================================================
// Application Errors
// =============================================================================

/// Main error type for quotabar operations.
#[derive(Error, Debug)]
pub enum QuotaError {
    // ==========================================================================
    // Authentication errors
    // ==========================================================================
    /// No session is available.
    #[error("not signed in")]
    AuthRequired,

    /// The server rejected the stored token.
    #[error("credentials rejected (HTTP {status})")]
    AuthRejected { status: u16 },

    /// The account is not allowed to read quota data.
    #[error("access forbidden: {message}")]
    Forbidden { message: String },

    // ==========================================================================
    // Network errors
    // ==========================================================================
    #[error("request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("network error: {0}")]
    Network(String),

    // ==========================================================================
    // Configuration errors
    // ==========================================================================
    #[error("config file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("config parse error at {path}: {message}")]
    ConfigParse {
        path: String,
        line: Option<usize>,
        message: String,
    },

    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // Provider errors
    // ==========================================================================
    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("server error (HTTP {status})")]
    ServerError { status: u16 },

    /// The account has no quota entitlement.
    #[error("no subscription found for this account")]
    NoSubscription,

    #[error("failed to parse response: {0}")]
    ParseResponse(String),

    #[error("fetch failed: {reason}")]
    FetchFailed { reason: String },

    // ==========================================================================
    // Environment errors
    // ==========================================================================
    #[error("keyring error: {0}")]
    Keyring(String),

    // ==========================================================================
    // Internal errors
    // ==========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<FetchError> for QuotaError {
    fn from(err: FetchError) -> Self {
        match err.kind {
            FetchErrorKind::AuthRequired => Self::AuthRequired,
            FetchErrorKind::Auth => Self::AuthRejected {
                status: err.status.unwrap_or(401),
            },
            FetchErrorKind::Forbidden => Self::Forbidden {
                message: err.message,
            },
            FetchErrorKind::NotFound => Self::NoSubscription,
            FetchErrorKind::RateLimit => Self::RateLimited {
                retry_after: err.retry_after,
                message: err.message,
            },
            FetchErrorKind::Server => Self::ServerError {
                status: err.status.unwrap_or(500),
            },
            FetchErrorKind::Timeout => Self::Timeout { seconds: 0 },
            FetchErrorKind::Network => Self::Network(err.message),
            FetchErrorKind::Validation => Self::ParseResponse(err.message),
            FetchErrorKind::Unknown | FetchErrorKind::Conflict | FetchErrorKind::Cancelled => {
                Self::FetchFailed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

impl QuotaError {
    /// Map error to process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::AuthRequired | Self::AuthRejected { .. } | Self::Forbidden { .. } => {
                ExitCode::AuthError
            }

            Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::Config(_)
            | Self::ParseResponse(_) => ExitCode::ParseError,

            Self::Timeout { .. } => ExitCode::Timeout,

            Self::Network(_)
            | Self::RateLimited { .. }
            | Self::ServerError { .. }
            | Self::NoSubscription
            | Self::FetchFailed { .. }
            | Self::Keyring(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthRequired | Self::AuthRejected { .. } | Self::Forbidden { .. } => {
                ErrorCategory::Authentication
            }
            Self::Timeout { .. } | Self::Network(_) => ErrorCategory::Network,
            Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::Config(_) => ErrorCategory::Configuration,
            Self::RateLimited { .. }
            | Self::ServerError { .. }
            | Self::NoSubscription
            | Self::ParseResponse(_)
            | Self::FetchFailed { .. } => ErrorCategory::Provider,
            Self::Keyring(_) => ErrorCategory::Environment,
            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Stable error code for programmatic handling.
    ///
    /// Format: `QB-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AuthRequired => "QB-A001",
            Self::AuthRejected { .. } => "QB-A002",
            Self::Forbidden { .. } => "QB-A003",

            Self::Timeout { .. } => "QB-N001",
            Self::Network(_) => "QB-N099",

            Self::ConfigNotFound { .. } => "QB-C001",
            Self::ConfigParse { .. } => "QB-C002",
            Self::ConfigInvalid { .. } => "QB-C003",
            Self::Config(_) => "QB-C004",

            Self::RateLimited { .. } => "QB-P001",
            Self::ServerError { .. } => "QB-P002",
            Self::NoSubscription => "QB-P003",
            Self::ParseResponse(_) => "QB-P020",
            Self::FetchFailed { .. } => "QB-P099",

            Self::Keyring(_) => "QB-E001",

            Self::Io(_) => "QB-X001",
            Self::Json(_) => "QB-X002",
            Self::Other(_) => "QB-X099",
        }
    }

    /// Whether retrying the same operation could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Network(_)
                | Self::RateLimited { .. }
                | Self::ServerError { .. }
        )
    }

    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Actionable fix suggestions for this error.
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::AuthRequired => suggestions::auth_required_suggestions(),
            Self::AuthRejected { status } => suggestions::auth_rejected_suggestions(*status),
            Self::Forbidden { message } => suggestions::forbidden_suggestions(message),
            Self::Timeout { seconds } => suggestions::timeout_suggestions(*seconds),
            Self::Network(msg) => suggestions::network_suggestions(msg),
            Self::ConfigNotFound { path } => suggestions::config_not_found_suggestions(path),
            Self::ConfigParse {
                path,
                line,
                message,
            } => suggestions::config_parse_suggestions(path, *line, message),
            Self::ConfigInvalid {
                key,
                value,
                message,
            } => suggestions::config_invalid_suggestions(key, value, message),
            Self::Config(msg) => vec![FixSuggestion::new(
                vec!["quotabar config show".to_string()],
                format!("Configuration error: {msg}"),
            )],
            Self::RateLimited { retry_after, .. } => {
                suggestions::rate_limited_suggestions(*retry_after)
            }
            Self::ServerError { status } => suggestions::server_error_suggestions(*status),
            Self::NoSubscription => suggestions::no_subscription_suggestions(),
            Self::ParseResponse(msg) => vec![FixSuggestion::new(
                vec!["quotabar status --json".to_string()],
                format!(
                    "The quota response could not be understood: {msg}. The API may have changed."
                ),
            )],
            Self::FetchFailed { reason } => vec![FixSuggestion::new(
                vec!["quotabar status -v".to_string()],
                format!("Fetching usage failed: {reason}"),
            )],
            Self::Keyring(msg) => suggestions::keyring_suggestions(msg),
            Self::Io(_) | Self::Json(_) | Self::Other(_) => Vec::new(),
        }
    }
}

/// Result type alias for quotabar operations.
pub type Result<T> = std::result::Result<T, QuotaError>;
