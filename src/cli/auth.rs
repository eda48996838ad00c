//! `quotabar auth`: store, forget and inspect the GitHub token.

use std::io::{BufRead, Write};

use serde::Serialize;

use crate::cli::args::{AuthCommand, OutputFormat};
use crate::cli::Session;
use crate::core::auth::{AuthTokenProvider, KeyringTokenProvider};
use crate::error::{QuotaError, Result};
use crate::render::to_json;
use crate::storage::cache::UsageCache;
use crate::storage::config::ResolvedConfig;
use crate::util::env::stdin_is_tty;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthStatus {
    authenticated: bool,
    source: &'static str,
}

/// Execute an `auth` subcommand.
///
/// # Errors
///
/// Returns error if the keyring cannot be read or written, or if no token
/// was supplied to `login`.
pub fn execute(cmd: &AuthCommand, config: &ResolvedConfig) -> Result<()> {
    match cmd {
        AuthCommand::Login { token } => {
            let token = match token {
                Some(token) => token.clone(),
                None => read_token()?,
            };
            KeyringTokenProvider::new().sign_in(&token)?;
            tracing::info!("token stored in keyring");
            println!("Signed in.");
            Ok(())
        }
        AuthCommand::Logout => {
            KeyringTokenProvider::new().sign_out()?;
            UsageCache::new().clear()?;
            println!("Signed out. Cached usage cleared.");
            Ok(())
        }
        AuthCommand::Status => {
            let session = Session::detect();
            let status = AuthStatus {
                authenticated: session.provider().is_authenticated(),
                source: session.source(),
            };
            println!("{}", render_status(&status, config)?);
            Ok(())
        }
    }
}

fn render_status(status: &AuthStatus, config: &ResolvedConfig) -> Result<String> {
    if config.format == OutputFormat::Json {
        return to_json(status, config.pretty);
    }
    Ok(if status.authenticated {
        format!("Signed in (token from {}).", status.source)
    } else {
        "Not signed in. Run `quotabar auth login`.".to_string()
    })
}

/// Read a token from stdin, prompting when interactive.
fn read_token() -> Result<String> {
    if stdin_is_tty() {
        eprint!("Paste a GitHub token: ");
        std::io::stderr().flush()?;
    }
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    parse_token(&line)
}

fn parse_token(line: &str) -> Result<String> {
    let token = line.trim();
    if token.is_empty() {
        return Err(QuotaError::AuthRequired);
    }
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_line_is_trimmed() {
        assert_eq!(parse_token("  ghu_123\n").unwrap(), "ghu_123");
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(matches!(parse_token("\n"), Err(QuotaError::AuthRequired)));
    }

    #[test]
    fn status_json_shape() {
        let status = AuthStatus {
            authenticated: true,
            source: "environment",
        };
        let json: serde_json::Value =
            serde_json::from_str(&to_json(&status, false).unwrap()).unwrap();
        assert_eq!(json["authenticated"], true);
        assert_eq!(json["source"], "environment");
    }
}
