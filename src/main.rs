//! quotabar - premium request quota tracker
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use quotabar::cli::{Cli, OutputFormat};
use quotabar::core::logging;
use quotabar::storage::config::{ENV_FORMAT, ENV_NO_COLOR, ENV_NO_COLOR_STD, ENV_PRETTY};
use quotabar::util::env::should_use_color;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let explicit_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or_else(logging::level_from_env);
    let log_format = if cli.json_output {
        logging::LogFormat::Json
    } else {
        logging::format_from_env().unwrap_or_default()
    };
    logging::init(
        logging::effective_level(explicit_level, cli.verbose),
        log_format,
        logging::file_from_env(),
    );

    // Config resolution may itself fail, so error output settings are read
    // from flags and environment directly.
    let format = cli
        .requested_format()
        .or_else(|| std::env::var(ENV_FORMAT).ok().as_deref().and_then(OutputFormat::parse))
        .unwrap_or_default();
    let pretty = cli.pretty || env_flag(ENV_PRETTY);
    let no_color =
        cli.no_color || env_flag(ENV_NO_COLOR) || std::env::var_os(ENV_NO_COLOR_STD).is_some();

    match quotabar::cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = %e, code = e.error_code(), "command failed");
            let rendered = quotabar::render::error::render_error(
                &e,
                format,
                should_use_color(no_color),
                pretty,
            );
            eprintln!("{rendered}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| {
        matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
    })
}
