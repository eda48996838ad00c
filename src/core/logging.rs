//! Diagnostic logging setup.
//!
//! Logs go to stderr (or `QUOTABAR_LOG_FILE`) so stdout stays clean for
//! command output. `RUST_LOG` overrides the computed filter when set.

use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const LOG_LEVEL_ENV: &str = "QUOTABAR_LOG";
pub const LOG_FORMAT_ENV: &str = "QUOTABAR_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "QUOTABAR_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable logs.
    #[default]
    Human,
    /// JSON logs (one event per line).
    Json,
    /// Compact logs (single line, terse).
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" => Some(Self::Human),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "verbose" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Level from `QUOTABAR_LOG`.
#[must_use]
pub fn level_from_env() -> Option<LogLevel> {
    env_value(LOG_LEVEL_ENV).and_then(|v| LogLevel::from_arg(&v))
}

/// Format from `QUOTABAR_LOG_FORMAT`.
#[must_use]
pub fn format_from_env() -> Option<LogFormat> {
    env_value(LOG_FORMAT_ENV).and_then(|v| LogFormat::from_arg(&v))
}

/// File from `QUOTABAR_LOG_FILE`.
#[must_use]
pub fn file_from_env() -> Option<PathBuf> {
    env_value(LOG_FILE_ENV).map(PathBuf::from)
}

/// Level actually applied: `-v` raises the default to debug, `-vv` and
/// beyond to trace. An explicit level always wins.
#[must_use]
pub fn effective_level(explicit: Option<LogLevel>, verbosity: u8) -> LogLevel {
    explicit.unwrap_or(match verbosity {
        0 => LogLevel::default(),
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    })
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(level: LogLevel, format: LogFormat, log_file: Option<PathBuf>) {
    let file = log_file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| eprintln!("quotabar: cannot open log file {}: {e}", path.display()))
            .ok()
    });

    let writer = match file {
        Some(file) => BoxMakeWriter::new(file),
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("quotabar={}", level.as_filter())));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);

    match format {
        LogFormat::Json => builder
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .try_init()
            .ok(),
        LogFormat::Compact => builder.compact().with_target(true).try_init().ok(),
        LogFormat::Human => builder.with_target(false).without_time().try_init().ok(),
    };
}
