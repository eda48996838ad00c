//! CLI argument parsing and command dispatch.

pub mod args;
pub mod auth;
pub mod cache;
pub mod config;
pub mod status;
pub mod watch;

use std::sync::Arc;

pub use args::{Cli, Commands, OutputFormat};

use crate::core::auth::{AuthTokenProvider, EnvTokenProvider, KeyringTokenProvider};
use crate::core::coordinator::Coordinator;
use crate::core::fetch::FetchClient;
use crate::error::Result;
use crate::storage::cache::UsageCache;
use crate::storage::config::{ConfigOverrides, ResolvedConfig};
use crate::util::env::should_use_color;

/// Run the parsed command line.
///
/// # Errors
///
/// Returns the error the command failed with; `main` renders it and maps it
/// to an exit code.
pub async fn run(cli: Cli) -> Result<()> {
    let overrides = ConfigOverrides::from_cli(&cli);
    match cli.command {
        None | Some(Commands::Status) => {
            let config = ResolvedConfig::resolve(&overrides)?;
            status::execute(&config).await
        }
        Some(Commands::Watch(args)) => {
            let config = ResolvedConfig::resolve(&overrides.with_watch(&args))?;
            watch::execute(&config).await
        }
        Some(Commands::Auth(cmd)) => {
            let config = ResolvedConfig::resolve(&overrides)?;
            auth::execute(&cmd, &config)
        }
        Some(Commands::Cache(cmd)) => {
            let config = ResolvedConfig::resolve(&overrides)?;
            cache::execute(&cmd, &config)
        }
        Some(Commands::Config(cmd)) => {
            let config = ResolvedConfig::resolve(&overrides)?;
            config::execute(&cmd, &config)
        }
    }
}

// =============================================================================
// Shared wiring
// =============================================================================

/// Where the session comes from for this process.
pub enum Session {
    /// `QUOTABAR_TOKEN` or `GITHUB_TOKEN` is set; sign-in and sign-out do not apply.
    Env(Arc<EnvTokenProvider>),
    Keyring(Arc<KeyringTokenProvider>),
}

impl Session {
    /// Environment token when present, otherwise the OS keyring.
    #[must_use]
    pub fn detect() -> Self {
        let env = EnvTokenProvider::from_env();
        if env.is_authenticated() {
            tracing::debug!("using token from environment");
            Self::Env(Arc::new(env))
        } else {
            Self::Keyring(Arc::new(KeyringTokenProvider::new()))
        }
    }

    #[must_use]
    pub fn provider(&self) -> Arc<dyn AuthTokenProvider> {
        match self {
            Self::Env(p) => Arc::clone(p) as Arc<dyn AuthTokenProvider>,
            Self::Keyring(p) => Arc::clone(p) as Arc<dyn AuthTokenProvider>,
        }
    }

    #[must_use]
    pub const fn keyring(&self) -> Option<&Arc<KeyringTokenProvider>> {
        match self {
            Self::Keyring(p) => Some(p),
            Self::Env(_) => None,
        }
    }

    /// Re-read the keyring so a sign-in or sign-out made by another
    /// process reaches the coordinator. No-op for environment tokens.
    pub fn reload(&self) {
        if let Some(keyring) = self.keyring() {
            if let Err(e) = keyring.reload() {
                tracing::warn!("could not re-read keyring: {e}");
            }
        }
    }

    #[must_use]
    pub const fn source(&self) -> &'static str {
        match self {
            Self::Env(_) => "environment",
            Self::Keyring(_) => "keyring",
        }
    }
}

/// Build a coordinator for the resolved settings.
///
/// # Errors
///
/// Returns error if the HTTP client cannot be built.
pub fn build_coordinator(config: &ResolvedConfig, session: &Session) -> Result<Coordinator> {
    let fetcher = FetchClient::with_endpoint(config.endpoint.clone())?
        .quota_key(config.quota_key.clone())
        .budget_total(config.overage_budget)
        .options(config.fetch);
    Ok(Coordinator::new(
        session.provider(),
        Arc::new(fetcher),
        UsageCache::new(),
        config.refresh,
    ))
}

/// Whether human output should be colored.
#[must_use]
pub fn color_enabled(config: &ResolvedConfig) -> bool {
    config.format == OutputFormat::Human && should_use_color(config.no_color)
}
