//! CLI argument definitions using clap.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

/// quotabar - Watch your Copilot premium request quota.
#[derive(Parser, Debug)]
#[command(name = "quotabar")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Output format [default: human]
    #[arg(long, value_enum, global = true)]
    pub format: Option<OutputFormat>,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Cli {
    /// Format requested on the command line, if any.
    #[must_use]
    pub const fn requested_format(&self) -> Option<OutputFormat> {
        if self.json {
            Some(OutputFormat::Json)
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch once and show current usage (default command)
    Status,

    /// Keep refreshing and print every update
    Watch(WatchArgs),

    /// Manage the stored GitHub token
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Inspect or clear the cached snapshot
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Arguments for the `watch` command.
#[derive(Parser, Debug, Default)]
pub struct WatchArgs {
    /// Seconds between refreshes (minimum 30)
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Only refresh on demand (press Enter)
    #[arg(long)]
    pub no_auto_refresh: bool,
}

/// `auth` subcommands.
#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Store a token (prompts when --token is omitted)
    Login {
        /// Token to store
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
    },
    /// Forget the stored token and clear cached usage
    Logout,
    /// Show whether a token is available
    Status,
}

/// `cache` subcommands.
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show the cached snapshot and its freshness
    Show,
    /// Delete the cached snapshot
    Clear,
}

/// `config` subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved settings and where each came from
    Show,
}

/// Output format.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable colored output
    #[default]
    Human,
    /// JSON output for scripts
    Json,
}

impl OutputFormat {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" => Some(Self::Human),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}
