//! The facade consumers talk to.
//!
//! A [`Coordinator`] wires an [`AuthTokenProvider`], a [`UsageFetcher`], the
//! [`UsageCache`] and a [`RefreshScheduler`] together. Every refresh, whether
//! from activation, the timer, a manual request or a visibility change, runs
//! the same sequence under the scheduler lock:
//!
//! 1. no session: emit a signed-out event, touch nothing else
//! 2. fetch; on success store to cache and emit the fresh snapshot
//! 3. on failure emit the error together with the cached fallback
//! 4. session ended while fetching: drop the result, emit signed-out
//!
//! Failures never escape as errors; they arrive as [`ChangeEvent`]s. Only
//! disposal suppresses the event.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::core::auth::AuthTokenProvider;
use crate::core::events::{EventEmitter, Subscription};
use crate::core::fetch::UsageFetcher;
use crate::core::models::{ChangeEvent, DisplayState, UsageSnapshot};
use crate::core::scheduler::{RefreshConfig, RefreshHandler, RefreshScheduler, RefreshTrigger};
use crate::core::state;
use crate::error::{FetchError, FetchErrorKind};
use crate::storage::cache::UsageCache;

// =============================================================================
// Shared core
// =============================================================================

#[derive(Debug)]
struct Status {
    current: Option<UsageSnapshot>,
    last_error: Option<FetchError>,
    has_subscription: bool,
}

/// State shared between the facade, the scheduler and the session callback.
struct CoordinatorCore {
    auth: Arc<dyn AuthTokenProvider>,
    fetcher: Arc<dyn UsageFetcher>,
    cache: UsageCache,
    events: EventEmitter<ChangeEvent>,
    status: Mutex<Status>,
    /// Set after an `Auth` failure; the next manual refresh prompts.
    needs_reauth: AtomicBool,
    /// Bumped on sign-out. A fetch that started under an older epoch is discarded.
    session_epoch: AtomicU64,
    cancel: CancellationToken,
}

impl CoordinatorCore {
    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn epoch(&self) -> u64 {
        self.session_epoch.load(Ordering::SeqCst)
    }

    fn publish(&self, event: &ChangeEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        tracing::trace!(
            has_snapshot = event.snapshot.is_some(),
            from_cache = event.from_cache,
            error = event.error.as_ref().map(|e| e.kind.as_str()),
            "emitting change event"
        );
        self.events.emit(event);
    }

    /// Publish a refresh outcome. If a sign-out slipped in after the outcome
    /// was applied, follow up so the last event seen is the signed-out one.
    fn publish_outcome(&self, epoch: u64, event: &ChangeEvent) {
        self.publish(event);
        if self.epoch() != epoch && !self.auth.is_authenticated() {
            self.publish_signed_out();
        }
    }

    fn publish_signed_out(&self) {
        {
            let mut status = self.status();
            status.current = None;
            status.last_error = Some(FetchError::auth_required());
        }
        self.publish(&ChangeEvent::signed_out());
    }

    fn handle_session_change(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self.auth.is_authenticated() {
            tracing::info!("signed in");
            self.needs_reauth.store(false, Ordering::SeqCst);
            return;
        }

        tracing::info!("signed out, clearing cached usage");
        {
            // Epoch bump and cache clear happen under the status lock, the
            // same lock a refresh holds while it checks the epoch and stores.
            let mut status = self.status();
            self.session_epoch.fetch_add(1, Ordering::SeqCst);
            self.needs_reauth.store(false, Ordering::SeqCst);
            if let Err(e) = self.cache.clear() {
                tracing::warn!("failed to clear usage cache on sign-out: {e}");
            }
            status.has_subscription = true;
            status.current = None;
            status.last_error = Some(FetchError::auth_required());
        }
        self.publish(&ChangeEvent::signed_out());
    }

    /// Store and publish a fresh snapshot. Returns `false`, touching nothing,
    /// when the session ended since `epoch`.
    fn apply_success(&self, epoch: u64, snapshot: UsageSnapshot) -> bool {
        {
            let mut status = self.status();
            if self.epoch() != epoch {
                return false;
            }
            if let Err(e) = self.cache.store(&snapshot) {
                tracing::warn!("failed to cache usage snapshot: {e}");
            }
            status.current = Some(snapshot.clone());
            status.last_error = None;
            status.has_subscription = true;
        }
        self.needs_reauth.store(false, Ordering::SeqCst);
        self.publish_outcome(epoch, &ChangeEvent::fresh(snapshot));
        true
    }

    /// Record and publish a failure with the cached fallback. Returns `false`
    /// when the session ended since `epoch`.
    fn apply_failure(&self, epoch: u64, err: FetchError) -> bool {
        let cached = {
            let mut status = self.status();
            if self.epoch() != epoch {
                return false;
            }
            match err.kind {
                FetchErrorKind::Auth => {
                    tracing::info!("token rejected, next manual refresh will ask to sign in again");
                    self.needs_reauth.store(true, Ordering::SeqCst);
                }
                FetchErrorKind::NotFound => status.has_subscription = false,
                _ => {}
            }
            let cached = self.cache.entry();
            if status.current.is_none() {
                status.current = cached.as_ref().map(|c| c.data.clone());
            }
            status.last_error = Some(err.clone());
            cached
        };
        self.publish_outcome(epoch, &ChangeEvent::fallback(err, cached, Utc::now()));
        true
    }
}

#[async_trait]
impl RefreshHandler for CoordinatorCore {
    async fn refresh(&self, trigger: RefreshTrigger) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let epoch = self.epoch();
            let signed_in = self.auth.is_authenticated();
            let reauth = self.needs_reauth.load(Ordering::SeqCst);
            let prompt = trigger == RefreshTrigger::Manual && (!signed_in || reauth);

            if !signed_in && !prompt {
                tracing::debug!(%trigger, "not signed in, skipping fetch");
                self.publish_signed_out();
                return;
            }
            if signed_in && prompt {
                tracing::info!(%trigger, "dropping rejected token before sign-in");
                self.auth.invalidate_session();
            }

            let Some(token) = self.auth.get_token(prompt).await else {
                tracing::debug!(%trigger, prompted = prompt, "no token available");
                self.publish_signed_out();
                return;
            };

            let result = self
                .fetcher
                .fetch(&token, &self.cancel)
                .await
                .and_then(|snapshot| {
                    if snapshot.unlimited {
                        Ok(snapshot)
                    } else {
                        state::validate(&snapshot).map(|()| snapshot)
                    }
                });

            if self.cancel.is_cancelled() {
                tracing::debug!(%trigger, "disposed during fetch, dropping result");
                return;
            }

            let applied = match result {
                Ok(snapshot) => self.apply_success(epoch, snapshot),
                Err(err) if err.kind == FetchErrorKind::Cancelled => return,
                Err(err) => self.apply_failure(epoch, err),
            };
            if applied {
                return;
            }
            if !self.auth.is_authenticated() {
                tracing::debug!(%trigger, "session ended during fetch, dropping result");
                self.publish_signed_out();
                return;
            }
            tracing::debug!(%trigger, "session replaced during fetch, fetching again");
        }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Owns the refresh pipeline for one process.
///
/// Construct it once at the entry point and pass collaborators in; nothing
/// here is global.
pub struct Coordinator {
    core: Arc<CoordinatorCore>,
    scheduler: RefreshScheduler,
    session: Mutex<Option<Subscription>>,
    disposed: AtomicBool,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        auth: Arc<dyn AuthTokenProvider>,
        fetcher: Arc<dyn UsageFetcher>,
        cache: UsageCache,
        config: RefreshConfig,
    ) -> Self {
        let core = Arc::new(CoordinatorCore {
            auth: Arc::clone(&auth),
            fetcher,
            cache,
            events: EventEmitter::new(),
            status: Mutex::new(Status {
                current: None,
                last_error: None,
                has_subscription: true,
            }),
            needs_reauth: AtomicBool::new(false),
            session_epoch: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        });

        let weak: Weak<CoordinatorCore> = Arc::downgrade(&core);
        let session = auth.on_session_change(Box::new(move || {
            if let Some(core) = weak.upgrade() {
                core.handle_session_change();
            }
        }));

        let handler: Arc<dyn RefreshHandler> = Arc::clone(&core) as Arc<dyn RefreshHandler>;
        Self {
            scheduler: RefreshScheduler::new(handler, config),
            core,
            session: Mutex::new(Some(session)),
            disposed: AtomicBool::new(false),
        }
    }

    /// Initial refresh followed by starting the timer.
    ///
    /// The timer starts whatever the outcome, so a later sign-in is picked
    /// up on the next tick.
    pub async fn activate(&self) {
        if self.is_disposed() {
            return;
        }
        self.scheduler.trigger(RefreshTrigger::Activation).await;
        if !self.is_disposed() {
            self.scheduler.start();
        }
    }

    /// One refresh without starting the timer. Used by one-shot commands.
    pub async fn activate_once(&self) {
        if !self.is_disposed() {
            self.scheduler.trigger(RefreshTrigger::Activation).await;
        }
    }

    /// Manual refresh. Waits for a running refresh, then performs a new one.
    pub async fn refresh(&self) {
        if !self.is_disposed() {
            self.scheduler.trigger(RefreshTrigger::Manual).await;
        }
    }

    /// Refresh because the consumer's surface became visible.
    pub async fn refresh_on_visible(&self) {
        if !self.is_disposed() {
            self.scheduler.trigger(RefreshTrigger::Visibility).await;
        }
    }

    /// Last in-memory snapshot. Never touches the network.
    #[must_use]
    pub fn current_data(&self) -> Option<UsageSnapshot> {
        self.core.status().current.clone()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<FetchError> {
        self.core.status().last_error.clone()
    }

    /// False once the endpoint reported the account has no quota entry.
    #[must_use]
    pub fn has_subscription(&self) -> bool {
        self.core.status().has_subscription
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.core.auth.is_authenticated()
    }

    /// True after the server rejected the token, until a new session starts.
    #[must_use]
    pub fn needs_reauth(&self) -> bool {
        self.core.needs_reauth.load(Ordering::SeqCst)
    }

    /// Subscribe to change events. Delivered synchronously, in refresh order.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn on_data_change(
        &self,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.core.events.subscribe(callback)
    }

    /// Resolve the display state from current conditions.
    #[must_use]
    pub fn display_state(&self, warning_threshold: f64) -> DisplayState {
        let status = self.core.status();
        state::determine_state(
            status.current.as_ref(),
            self.core.auth.is_authenticated(),
            status.has_subscription,
            status.last_error.as_ref(),
            warning_threshold,
        )
    }

    #[must_use]
    pub fn refresh_config(&self) -> RefreshConfig {
        self.scheduler.config()
    }

    pub fn update_config(&self, config: RefreshConfig) {
        if !self.is_disposed() {
            self.scheduler.update_config(config);
        }
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.scheduler.is_refreshing()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stop the timer, abort any in-flight fetch and detach from the auth
    /// provider. No events are emitted afterwards. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("disposing coordinator");
        self.core.cancel.cancel();
        self.scheduler.stop();
        if let Some(session) = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            session.unsubscribe();
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}
