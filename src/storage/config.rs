//! Configuration file loading and resolution.
//!
//! Loads configuration from `<config dir>/config.toml` (see [`AppPaths`]),
//! or from the file named by `QUOTABAR_CONFIG`.
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `QUOTABAR_REFRESH_INTERVAL`: seconds between refreshes (min 30)
//! - `QUOTABAR_AUTO_REFRESH`: enable the refresh timer (1, true, yes, on / 0, false, no, off)
//! - `QUOTABAR_WARNING_THRESHOLD`: warning threshold in percent (0-100)
//! - `QUOTABAR_ENDPOINT`: quota endpoint URL
//! - `QUOTABAR_QUOTA_KEY`: entry of `quota_snapshots` to report
//! - `QUOTABAR_FORMAT`: output format (human, json)
//! - `QUOTABAR_NO_COLOR` or `NO_COLOR`: disable colors
//! - `QUOTABAR_PRETTY`: pretty-print JSON output
//! - `QUOTABAR_CONFIG`: override config file path

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cli::args::{Cli, OutputFormat, WatchArgs};
use crate::core::fetch::{DEFAULT_QUOTA_KEY, FetchOptions};
use crate::core::http::DEFAULT_ENDPOINT;
use crate::core::scheduler::{DEFAULT_INTERVAL_SECS, RefreshConfig};
use crate::core::state::DEFAULT_WARNING_THRESHOLD;
use crate::error::{QuotaError, Result};

// =============================================================================
// Environment Variable Names
// =============================================================================

pub const ENV_CONFIG: &str = "QUOTABAR_CONFIG";
pub const ENV_REFRESH_INTERVAL: &str = "QUOTABAR_REFRESH_INTERVAL";
pub const ENV_AUTO_REFRESH: &str = "QUOTABAR_AUTO_REFRESH";
pub const ENV_WARNING_THRESHOLD: &str = "QUOTABAR_WARNING_THRESHOLD";
pub const ENV_ENDPOINT: &str = "QUOTABAR_ENDPOINT";
pub const ENV_QUOTA_KEY: &str = "QUOTABAR_QUOTA_KEY";
pub const ENV_FORMAT: &str = "QUOTABAR_FORMAT";
pub const ENV_NO_COLOR: &str = "QUOTABAR_NO_COLOR";
/// Standard environment variable to disable colors.
pub const ENV_NO_COLOR_STD: &str = "NO_COLOR";
pub const ENV_PRETTY: &str = "QUOTABAR_PRETTY";

const MAX_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Config file
// =============================================================================

/// Contents of `config.toml`. Every value is optional; unset values fall
/// through to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub refresh: RefreshSection,
    pub display: DisplaySection,
    pub api: ApiSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_threshold_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_key: Option<String>,
    /// Overage allowance reported as `budgetTotal`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overage_budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Config {
    /// Load from the default path. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().config_file())
    }

    /// Load from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigParse` for malformed TOML.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| QuotaError::ConfigParse {
            path: path.display().to_string(),
            line: e.span().map(|span| line_of(&content, span.start)),
            message: e.message().to_string(),
        })
    }

    /// Write the config to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| QuotaError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(path, content)?;
        tracing::debug!(?path, "config file saved");
        Ok(())
    }

    /// Reject values that cannot be clamped into range.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.api.endpoint {
            validate_endpoint("api.endpoint", endpoint)?;
        }
        if let Some(key) = &self.api.quota_key {
            if key.trim().is_empty() {
                return Err(invalid("api.quota_key", key, "must not be empty"));
            }
        }
        if let Some(budget) = self.api.overage_budget {
            if !budget.is_finite() || budget < 0.0 {
                return Err(invalid(
                    "api.overage_budget",
                    &budget.to_string(),
                    "must be a non-negative number",
                ));
            }
        }
        if let Some(timeout) = self.api.timeout_seconds {
            if timeout == 0 || timeout > MAX_TIMEOUT_SECS {
                return Err(invalid(
                    "api.timeout_seconds",
                    &timeout.to_string(),
                    "must be between 1 and 300 seconds",
                ));
            }
        }
        if self.api.max_attempts == Some(0) {
            return Err(invalid("api.max_attempts", "0", "must be at least 1"));
        }
        if let Some(threshold) = self.display.warning_threshold_percent {
            if !threshold.is_finite() {
                return Err(invalid(
                    "display.warning_threshold_percent",
                    &threshold.to_string(),
                    "must be a number",
                ));
            }
        }
        Ok(())
    }
}

fn line_of(content: &str, offset: usize) -> usize {
    content
        .get(..offset)
        .map_or(1, |prefix| prefix.matches('\n').count() + 1)
}

fn invalid(key: &str, value: &str, message: &str) -> QuotaError {
    QuotaError::ConfigInvalid {
        key: key.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}

fn validate_endpoint(key: &str, endpoint: &str) -> Result<()> {
    if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
        Ok(())
    } else {
        Err(invalid(key, endpoint, "must be an http(s) URL"))
    }
}

// =============================================================================
// CLI overrides
// =============================================================================

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub interval_secs: Option<u64>,
    pub auto_refresh: Option<bool>,
    pub format: Option<OutputFormat>,
    pub pretty: bool,
    pub no_color: bool,
}

impl ConfigOverrides {
    #[must_use]
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            interval_secs: None,
            auto_refresh: None,
            format: cli.requested_format(),
            pretty: cli.pretty,
            no_color: cli.no_color,
        }
    }

    #[must_use]
    pub fn with_watch(mut self, args: &WatchArgs) -> Self {
        self.interval_secs = args.interval;
        if args.no_auto_refresh {
            self.auto_refresh = Some(false);
        }
        self
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigSource {
    Cli,
    Env,
    ConfigFile,
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSources {
    pub interval: ConfigSource,
    pub auto_refresh: ConfigSource,
    pub warning_threshold: ConfigSource,
    pub endpoint: ConfigSource,
    pub quota_key: ConfigSource,
    pub overage_budget: ConfigSource,
    pub timeout: ConfigSource,
    pub max_attempts: ConfigSource,
    pub format: ConfigSource,
    pub pretty: ConfigSource,
    pub no_color: ConfigSource,
}

/// Final settings after merging CLI, environment and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub refresh: RefreshConfig,
    pub warning_threshold: f64,
    pub endpoint: String,
    pub quota_key: String,
    pub overage_budget: f64,
    pub fetch: FetchOptions,
    pub format: OutputFormat,
    pub pretty: bool,
    pub no_color: bool,
    pub config_path: PathBuf,
    pub sources: ConfigSources,
}

impl ResolvedConfig {
    /// Resolve from the process environment and the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `QUOTABAR_CONFIG` names a file that does not exist
    /// - the config file is malformed or holds invalid values
    /// - an environment variable holds an unparseable value
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let (config, path) = Self::load_config()?;
        Self::resolve_from(overrides, &config, path, |name| std::env::var(name).ok())
    }

    fn load_config() -> Result<(Config, PathBuf)> {
        if let Some(path) = std::env::var_os(ENV_CONFIG).filter(|v| !v.is_empty()) {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(QuotaError::ConfigNotFound {
                    path: path.display().to_string(),
                });
            }
            Ok((Config::load_from(&path)?, path))
        } else {
            let path = AppPaths::new().config_file();
            Ok((Config::load_from(&path)?, path))
        }
    }

    /// Resolve against an explicit config and environment lookup.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`].
    pub fn resolve_from(
        overrides: &ConfigOverrides,
        config: &Config,
        config_path: PathBuf,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        config.validate()?;
        let env = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut sources = ConfigSources::default();

        let interval_env = env(ENV_REFRESH_INTERVAL)
            .map(|v| parse_env(ENV_REFRESH_INTERVAL, &v, |s| s.parse::<u64>().ok()))
            .transpose()?;
        let interval = pick(
            overrides.interval_secs,
            interval_env,
            config.refresh.interval_seconds,
            DEFAULT_INTERVAL_SECS,
            &mut sources.interval,
        );

        let enabled_env = env(ENV_AUTO_REFRESH)
            .map(|v| parse_env(ENV_AUTO_REFRESH, &v, parse_bool))
            .transpose()?;
        let enabled = pick(
            overrides.auto_refresh,
            enabled_env,
            config.refresh.enabled,
            true,
            &mut sources.auto_refresh,
        );

        let threshold_env = env(ENV_WARNING_THRESHOLD)
            .map(|v| {
                parse_env(ENV_WARNING_THRESHOLD, &v, |s| {
                    s.parse::<f64>().ok().filter(|t| t.is_finite())
                })
            })
            .transpose()?;
        let threshold = pick(
            None,
            threshold_env,
            config.display.warning_threshold_percent,
            DEFAULT_WARNING_THRESHOLD,
            &mut sources.warning_threshold,
        );

        let endpoint_env = env(ENV_ENDPOINT);
        if let Some(endpoint) = &endpoint_env {
            validate_endpoint(ENV_ENDPOINT, endpoint)?;
        }
        let endpoint = pick(
            None,
            endpoint_env,
            config.api.endpoint.clone(),
            DEFAULT_ENDPOINT.to_string(),
            &mut sources.endpoint,
        );

        let quota_key = pick(
            None,
            env(ENV_QUOTA_KEY),
            config.api.quota_key.clone(),
            DEFAULT_QUOTA_KEY.to_string(),
            &mut sources.quota_key,
        );

        let overage_budget = pick(
            None,
            None,
            config.api.overage_budget,
            0.0,
            &mut sources.overage_budget,
        );

        let defaults = FetchOptions::default();
        let timeout_secs = pick(
            None,
            None,
            config.api.timeout_seconds,
            defaults.timeout.as_secs(),
            &mut sources.timeout,
        );
        let max_attempts = pick(
            None,
            None,
            config.api.max_attempts,
            defaults.max_attempts,
            &mut sources.max_attempts,
        );

        let format_env = env(ENV_FORMAT)
            .map(|v| parse_env(ENV_FORMAT, &v, OutputFormat::parse))
            .transpose()?;
        let format = pick(
            overrides.format,
            format_env,
            None,
            OutputFormat::Human,
            &mut sources.format,
        );

        let pretty = pick(
            overrides.pretty.then_some(true),
            env(ENV_PRETTY).map(|v| parse_bool(&v).unwrap_or(false)),
            None,
            false,
            &mut sources.pretty,
        );

        let no_color_env = env(ENV_NO_COLOR)
            .map(|v| parse_bool(&v).unwrap_or(false))
            .or_else(|| env(ENV_NO_COLOR_STD).map(|_| true));
        let no_color = pick(
            overrides.no_color.then_some(true),
            no_color_env,
            None,
            false,
            &mut sources.no_color,
        );

        Ok(Self {
            refresh: RefreshConfig::new(interval, enabled),
            warning_threshold: clamp_threshold(threshold),
            endpoint,
            quota_key,
            overage_budget,
            fetch: FetchOptions {
                timeout: Duration::from_secs(timeout_secs),
                max_attempts,
                ..defaults
            },
            format,
            pretty,
            no_color,
            config_path,
            sources,
        })
    }
}

/// First present value by precedence, recording where it came from.
fn pick<T>(
    cli: Option<T>,
    env: Option<T>,
    file: Option<T>,
    default: T,
    source: &mut ConfigSource,
) -> T {
    if let Some(v) = cli {
        *source = ConfigSource::Cli;
        v
    } else if let Some(v) = env {
        *source = ConfigSource::Env;
        v
    } else if let Some(v) = file {
        *source = ConfigSource::ConfigFile;
        v
    } else {
        *source = ConfigSource::Default;
        default
    }
}

fn parse_env<T>(name: &str, value: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T> {
    parse(value).ok_or_else(|| invalid(name, value, "unrecognized value"))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn clamp_threshold(threshold: f64) -> f64 {
    let clamped = threshold.clamp(0.0, 100.0);
    if (clamped - threshold).abs() > f64::EPSILON {
        tracing::warn!(
            requested = threshold,
            applied = clamped,
            "warning threshold out of range, clamping"
        );
    }
    clamped
}
