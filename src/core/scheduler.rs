//! Periodic and on-demand refresh, serialized through one lock.
//!
//! Every refresh, whatever triggered it, runs the same [`RefreshHandler`]
//! while holding the scheduler's async mutex, so at most one refresh executes
//! at a time. Waiters are served in FIFO order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Lowest accepted refresh interval.
pub const MIN_INTERVAL_SECS: u64 = 30;
/// Default refresh interval.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

// =============================================================================
// Config
// =============================================================================

/// Timer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
    interval_secs: u64,
    pub enabled: bool,
}

impl RefreshConfig {
    /// Build a config, clamping the interval to [`MIN_INTERVAL_SECS`].
    #[must_use]
    pub fn new(interval_secs: u64, enabled: bool) -> Self {
        let clamped = interval_secs.max(MIN_INTERVAL_SECS);
        if clamped != interval_secs {
            tracing::warn!(
                requested = interval_secs,
                applied = clamped,
                "refresh interval below minimum, clamping"
            );
        }
        Self {
            interval_secs: clamped,
            enabled,
        }
    }

    #[must_use]
    pub const fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            enabled: true,
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTrigger {
    Activation,
    Scheduled,
    Manual,
    /// The consumer's surface became visible again.
    Visibility,
}

impl RefreshTrigger {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Visibility => "visibility",
        }
    }
}

impl std::fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The refresh callback run under the scheduler lock.
#[async_trait]
pub trait RefreshHandler: Send + Sync {
    async fn refresh(&self, trigger: RefreshTrigger);
}

// =============================================================================
// Scheduler
// =============================================================================

struct Shared {
    lock: tokio::sync::Mutex<()>,
    handler: Arc<dyn RefreshHandler>,
}

impl Shared {
    async fn run(&self, trigger: RefreshTrigger) {
        let _guard = self.lock.lock().await;
        tracing::debug!(%trigger, "refresh starting");
        self.handler.refresh(trigger).await;
        tracing::debug!(%trigger, "refresh finished");
    }
}

struct Timer {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the refresh timer and the refresh lock.
pub struct RefreshScheduler {
    shared: Arc<Shared>,
    config: Mutex<RefreshConfig>,
    timer: Mutex<Option<Timer>>,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new(handler: Arc<dyn RefreshHandler>, config: RefreshConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                lock: tokio::sync::Mutex::new(()),
                handler,
            }),
            config: Mutex::new(config),
            timer: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> RefreshConfig {
        *lock(&self.config)
    }

    /// Start the recurring timer, replacing any running one.
    ///
    /// No-op when auto refresh is disabled. Must be called inside a tokio
    /// runtime. The first tick fires one interval from now.
    pub fn start(&self) {
        let config = self.config();
        let mut timer = lock(&self.timer);
        if let Some(previous) = timer.take() {
            previous.stop.cancel();
        }
        if !config.enabled {
            tracing::debug!("auto refresh disabled, timer not started");
            return;
        }

        let stop = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let period = config.interval();
        let task_stop = stop.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = task_stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let _guard = shared.lock.lock().await;
                // stop() may have landed while this tick waited for the lock.
                if task_stop.is_cancelled() {
                    break;
                }
                tracing::debug!(trigger = %RefreshTrigger::Scheduled, "refresh starting");
                shared.handler.refresh(RefreshTrigger::Scheduled).await;
            }
            tracing::debug!("refresh timer stopped");
        });

        tracing::debug!(interval_secs = config.interval_secs(), "refresh timer started");
        *timer = Some(Timer { stop, handle });
    }

    /// Cancel the timer. A refresh already running is left to finish.
    pub fn stop(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.stop.cancel();
            drop(timer.handle);
        }
    }

    /// Whether the timer is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.timer)
            .as_ref()
            .is_some_and(|t| !t.stop.is_cancelled() && !t.handle.is_finished())
    }

    /// Run a refresh now.
    ///
    /// If one is in flight, waits for it and then performs a new one; the
    /// caller always gets a refresh that started after the call.
    pub async fn trigger(&self, trigger: RefreshTrigger) {
        self.shared.run(trigger).await;
    }

    /// Apply new timer settings.
    ///
    /// Restarts a running timer with the new interval, starts it when
    /// auto refresh gets enabled, stops it when disabled.
    pub fn update_config(&self, new_config: RefreshConfig) {
        let new_config = RefreshConfig::new(new_config.interval_secs, new_config.enabled);
        let was_running = self.is_running();
        let previous = std::mem::replace(&mut *lock(&self.config), new_config);

        if !new_config.enabled {
            self.stop();
        } else if was_running || !previous.enabled {
            self.start();
        }
    }

    /// Whether a refresh currently holds the lock.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.shared.lock.try_lock().is_err()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
