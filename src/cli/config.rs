//! `quotabar config`: show resolved settings.

use crate::cli::args::ConfigCommand;
use crate::cli::color_enabled;
use crate::error::Result;
use crate::render::render_config;
use crate::storage::config::ResolvedConfig;

/// Execute a `config` subcommand.
///
/// # Errors
///
/// Returns error if output fails.
pub fn execute(cmd: &ConfigCommand, config: &ResolvedConfig) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            println!(
                "{}",
                render_config(config, config.format, config.pretty, color_enabled(config))?
            );
        }
    }
    Ok(())
}
