//! `quotabar status`: one refresh, one report.

use std::sync::{Arc, Mutex, PoisonError};

use crate::cli::{Session, build_coordinator, color_enabled};
use crate::core::coordinator::Coordinator;
use crate::core::models::ChangeEvent;
use crate::error::{QuotaError, Result};
use crate::render::{UsageReport, render_usage};
use crate::storage::config::ResolvedConfig;

/// Execute the status command.
///
/// The report is printed even when the refresh failed; the failure is then
/// returned so the process exits non-zero.
///
/// # Errors
///
/// Returns the refresh failure (not signed in, rejected token, network) or
/// an output error.
pub async fn execute(config: &ResolvedConfig) -> Result<()> {
    let session = Session::detect();
    let coordinator = build_coordinator(config, &session)?;
    let event = refresh_once(&coordinator).await;

    let state = coordinator.display_state(config.warning_threshold);
    let report = UsageReport::from_event(&event, state, coordinator.is_authenticated());
    coordinator.dispose();

    println!(
        "{}",
        render_usage(&report, config.format, config.pretty, color_enabled(config))?
    );

    match event.error {
        Some(err) => Err(QuotaError::from(err)),
        None => Ok(()),
    }
}

/// Run the activation refresh and return the event it produced.
pub async fn refresh_once(coordinator: &Coordinator) -> ChangeEvent {
    let last: Arc<Mutex<Option<ChangeEvent>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&last);
    let subscription = coordinator.on_data_change(move |event| {
        *sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(event.clone());
    });
    coordinator.activate_once().await;
    subscription.unsubscribe();

    let event = last.lock().unwrap_or_else(PoisonError::into_inner).take();
    event.unwrap_or_else(|| match coordinator.current_data() {
        Some(snapshot) => ChangeEvent::fresh(snapshot),
        None => ChangeEvent::signed_out(),
    })
}
