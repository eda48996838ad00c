//! Error rendering with fix suggestions.
//!
//! Human mode prints the message, its stable code and the first suggested
//! command; JSON mode prints a structured object for scripts.

use colored::Colorize;
use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::{FixSuggestion, QuotaError};

// =============================================================================
// Public API
// =============================================================================

#[must_use]
pub fn render_error(error: &QuotaError, format: OutputFormat, color: bool, pretty: bool) -> String {
    match format {
        OutputFormat::Json => render_error_json(error, pretty),
        OutputFormat::Human if color => render_colored(error),
        OutputFormat::Human => render_simple(error),
    }
}

/// Render error as structured JSON for machine consumption.
#[must_use]
pub fn render_error_json(error: &QuotaError, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error);
    let rendered = if pretty {
        serde_json::to_string_pretty(&error_json)
    } else {
        serde_json::to_string(&error_json)
    };
    rendered.unwrap_or_else(|_| render_simple(error))
}

// =============================================================================
// Terminal Rendering
// =============================================================================

fn first_command(suggestions: &[FixSuggestion]) -> Option<&str> {
    suggestions
        .iter()
        .flat_map(|s| s.commands.iter())
        .map(String::as_str)
        .find(|cmd| !cmd.starts_with('#'))
}

fn render_simple(error: &QuotaError) -> String {
    let suggestions = error.fix_suggestions();
    let mut lines = vec![format!("Error [{}]: {}", error.error_code(), error)];
    if let Some(cmd) = first_command(&suggestions) {
        lines.push(format!("Fix: {cmd}"));
    }
    lines.join("\n")
}

fn render_colored(error: &QuotaError) -> String {
    let suggestions = error.fix_suggestions();
    let mut lines = vec![format!(
        "{} {} {}",
        "Error".red().bold(),
        error.to_string().red(),
        format!("[{}]", error.error_code()).dimmed()
    )];

    if let Some(suggestion) = suggestions.first() {
        if !suggestion.context.is_empty() {
            lines.push(format!("  {}", suggestion.context));
        }
        for cmd in &suggestion.commands {
            if cmd.starts_with('#') {
                lines.push(format!("  {}", cmd.dimmed()));
            } else {
                lines.push(format!("  {} {}", "$".dimmed(), cmd.cyan()));
            }
        }
        if let Some(prevention) = &suggestion.prevention {
            lines.push(format!("  {} {prevention}", "Tip:".yellow()));
        }
        if let Some(url) = &suggestion.doc_url {
            lines.push(format!("  {} {}", "Docs:".dimmed(), url.underline()));
        }
    }
    lines.join("\n")
}

// =============================================================================
// JSON Rendering
// =============================================================================

#[derive(Serialize)]
struct ErrorJson {
    error_code: &'static str,
    category: String,
    message: String,
    is_retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
    exit_code: i32,
    suggestions: Vec<SuggestionJson>,
}

#[derive(Serialize)]
struct SuggestionJson {
    commands: Vec<String>,
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prevention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    doc_url: Option<String>,
}

impl ErrorJson {
    fn from_error(error: &QuotaError) -> Self {
        Self {
            error_code: error.error_code(),
            category: error.category().to_string(),
            message: error.to_string(),
            is_retryable: error.is_retryable(),
            retry_after_seconds: error.retry_after().map(|d| d.as_secs()),
            exit_code: error.exit_code().into(),
            suggestions: error
                .fix_suggestions()
                .into_iter()
                .map(|s| SuggestionJson {
                    commands: s.commands,
                    context: s.context,
                    prevention: s.prevention,
                    doc_url: s.doc_url,
                })
                .collect(),
        }
    }
}
