//! `quotabar watch`: keep the coordinator running and print every update.
//!
//! Keys (line-buffered on stdin):
//! - Enter: manual refresh
//! - a pasted token while signed out or after the token was rejected:
//!   sign in, then refresh
//! - `q`: quit
//!
//! The keyring is re-read on every manual refresh and once per refresh
//! interval, so `quotabar auth logout` in another terminal clears the cache
//! and shows up here as signed out.

use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cli::args::OutputFormat;
use crate::cli::{Session, build_coordinator, color_enabled};
use crate::core::coordinator::Coordinator;
use crate::core::models::ChangeEvent;
use crate::error::Result;
use crate::render::{UsageReport, render_usage};
use crate::storage::config::ResolvedConfig;

/// What a line typed on stdin asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Refresh,
    Quit,
    Token(String),
}

impl Input {
    /// Interpret one line. Anything that is not empty or `q` is treated as a
    /// token, and only used while signed out or after a rejection.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Self::Refresh,
            "q" | "quit" => Self::Quit,
            token => Self::Token(token.to_string()),
        }
    }
}

/// Execute the watch command until Ctrl+C or `q`.
///
/// # Errors
///
/// Returns error if the HTTP client cannot be built or output fails.
pub async fn execute(config: &ResolvedConfig) -> Result<()> {
    let session = Session::detect();
    let coordinator = Arc::new(build_coordinator(config, &session)?);
    let color = color_enabled(config);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ChangeEvent>();
    let subscription = coordinator.on_data_change(move |event| {
        let _ = event_tx.send(event.clone());
    });

    let mut input_rx = spawn_stdin_reader();
    let mut stdin_open = true;

    // Ctrl+C handler for clean shutdown.
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
    });

    if config.format == OutputFormat::Human {
        let refresh = config.refresh;
        let timer = if refresh.enabled {
            format!("every {}s", refresh.interval_secs())
        } else {
            "auto refresh off".to_string()
        };
        println!("Watching premium request quota ({timer}). Enter refreshes, q quits.");
    }

    spawn_refresh(&coordinator, Refresh::Activate);

    let mut session_poll = tokio::time::interval_at(
        tokio::time::Instant::now() + config.refresh.interval(),
        config.refresh.interval(),
    );

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::debug!("ctrl-c received, stopping watch");
                break;
            }
            Some(event) = event_rx.recv() => {
                print_event(&coordinator, &event, config, color)?;
            }
            _ = session_poll.tick() => session.reload(),
            input = input_rx.recv(), if stdin_open => match input {
                Some(Input::Quit) => break,
                Some(Input::Refresh) => {
                    session.reload();
                    spawn_refresh(&coordinator, Refresh::Manual);
                }
                Some(Input::Token(token)) => {
                    if sign_in(&session, &coordinator, &token) {
                        spawn_refresh(&coordinator, Refresh::Manual);
                    }
                }
                // stdin closed: keep going on the timer alone
                None => stdin_open = false,
            },
        }
    }

    subscription.unsubscribe();
    coordinator.dispose();
    Ok(())
}

#[derive(Clone, Copy)]
enum Refresh {
    Activate,
    Manual,
}

fn spawn_refresh(coordinator: &Arc<Coordinator>, kind: Refresh) {
    let coordinator = Arc::clone(coordinator);
    tokio::spawn(async move {
        match kind {
            Refresh::Activate => coordinator.activate().await,
            Refresh::Manual => coordinator.refresh().await,
        }
    });
}

fn sign_in(session: &Session, coordinator: &Coordinator, token: &str) -> bool {
    if !accepts_token(coordinator.is_authenticated(), coordinator.needs_reauth()) {
        tracing::debug!("ignoring input while signed in");
        return false;
    }
    let Some(keyring) = session.keyring() else {
        return false;
    };
    match keyring.sign_in(token) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Sign-in failed: {e}");
            false
        }
    }
}

/// A pasted token replaces the session only when there is none or the
/// server rejected the current one.
const fn accepts_token(signed_in: bool, needs_reauth: bool) -> bool {
    !signed_in || needs_reauth
}

fn print_event(
    coordinator: &Coordinator,
    event: &ChangeEvent,
    config: &ResolvedConfig,
    color: bool,
) -> Result<()> {
    let state = coordinator.display_state(config.warning_threshold);
    let report = UsageReport::from_event(event, state, coordinator.is_authenticated());
    let rendered = render_usage(&report, config.format, config.pretty, color)?;
    if config.format == OutputFormat::Human {
        println!(
            "\n{}\n{rendered}",
            chrono::Local::now().format("%H:%M:%S")
        );
        if coordinator.needs_reauth() {
            println!("Token rejected. Paste a new token and press Enter to sign in again.");
        }
    } else {
        println!("{rendered}");
    }
    Ok(())
}

/// Forward stdin lines from a detached thread, which must not hold up
/// runtime shutdown while blocked on a read.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<Input> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(Input::parse(&line)).is_err() {
                break;
            }
        }
    });
    rx
}
