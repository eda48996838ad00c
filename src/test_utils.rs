//! Test utilities for quotabar.
//!
//! Provides snapshot factories, an isolated temp directory, and fake
//! collaborators for driving the [`Coordinator`](crate::core::coordinator::Coordinator)
//! without a keyring or network.
//!
//! # Usage
//!
//! ```rust,ignore
//! use quotabar::test_utils::*;
//!
//! let auth = Arc::new(FakeAuthProvider::new(true));
//! let fetcher = Arc::new(ScriptedFetcher::new());
//! fetcher.push_ok(make_snapshot(50.0, 300.0));
//! ```

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use crate::core::auth::AuthTokenProvider;
use crate::core::events::{EventEmitter, Subscription};
use crate::core::fetch::UsageFetcher;
use crate::core::models::{CachedSnapshot, UsageSnapshot};
use crate::error::FetchError;

/// Token handed out by [`FakeAuthProvider`] when signed in.
pub const TEST_TOKEN: &str = "test-token";

/// The canonical sample payload: 300 granted, 250 remaining, 5 overage.
pub const SAMPLE_QUOTA_RESPONSE: &str = r#"{
  "login": "octocat",
  "quota_reset_date_utc": "2025-11-01T00:00:00Z",
  "quota_snapshots": {
    "premium_interactions": {
      "entitlement": 300,
      "remaining": 250,
      "overage_count": 5,
      "overage_permitted": true,
      "unlimited": false
    },
    "chat": { "entitlement": -1, "remaining": 0, "unlimited": true }
  }
}"#;

// =============================================================================
// Test Data Factories
// =============================================================================

/// Snapshot with the given included usage, captured now.
#[must_use]
pub fn make_snapshot(included_used: f64, included_total: f64) -> UsageSnapshot {
    UsageSnapshot::new(included_used, included_total)
        .with_period_end(Utc::now() + TimeDelta::days(12))
}

/// Cache entry written `age` ago.
#[must_use]
pub fn make_cached(snapshot: UsageSnapshot, age: TimeDelta) -> CachedSnapshot {
    CachedSnapshot {
        data: snapshot,
        cached_at: Utc::now() - age,
    }
}

// =============================================================================
// Temporary Directory Helper
// =============================================================================

/// A temporary directory removed on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Write a file, creating parent directories as needed.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&path, content).expect("Failed to write test file");
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Fake auth provider
// =============================================================================

/// In-memory session with a scriptable sign-in prompt.
pub struct FakeAuthProvider {
    token: Mutex<Option<String>>,
    prompt_response: Mutex<Option<String>>,
    prompts: AtomicUsize,
    token_requests: AtomicUsize,
    invalidations: AtomicUsize,
    changed: EventEmitter<()>,
}

impl FakeAuthProvider {
    #[must_use]
    pub fn new(signed_in: bool) -> Self {
        Self {
            token: Mutex::new(signed_in.then(|| TEST_TOKEN.to_string())),
            prompt_response: Mutex::new(None),
            prompts: AtomicUsize::new(0),
            token_requests: AtomicUsize::new(0),
            invalidations: AtomicUsize::new(0),
            changed: EventEmitter::new(),
        }
    }

    /// Sign in or out and notify listeners, like a real session change.
    pub fn set_authenticated(&self, signed_in: bool) {
        *lock(&self.token) = signed_in.then(|| TEST_TOKEN.to_string());
        self.changed.emit(&());
    }

    /// Token the interactive prompt will "enter"; `None` means the user declines.
    pub fn set_prompt_response(&self, token: Option<&str>) {
        *lock(&self.prompt_response) = token.map(str::to_string);
    }

    /// How many times the interactive flow ran.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    /// How many times a rejected session was dropped.
    #[must_use]
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthTokenProvider for FakeAuthProvider {
    async fn get_token(&self, prompt_if_missing: bool) -> Option<String> {
        self.token_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = lock(&self.token).clone() {
            return Some(token);
        }
        if !prompt_if_missing {
            return None;
        }
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let entered = lock(&self.prompt_response).clone()?;
        *lock(&self.token) = Some(entered.clone());
        self.changed.emit(&());
        Some(entered)
    }

    fn is_authenticated(&self) -> bool {
        lock(&self.token).is_some()
    }

    fn on_session_change(&self, callback: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.changed.subscribe(move |()| callback())
    }

    fn invalidate_session(&self) {
        *lock(&self.token) = None;
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Scripted fetcher
// =============================================================================

/// Fetcher that replays queued results.
///
/// Each call sleeps for the configured delay (cancellable), then pops the
/// next queued result. With an empty queue it returns the default snapshot.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<UsageSnapshot, FetchError>>>,
    default: Mutex<UsageSnapshot>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    tokens: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(make_snapshot(50.0, 300.0)),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.delay) = delay;
        self
    }

    pub fn push_ok(&self, snapshot: UsageSnapshot) {
        lock(&self.script).push_back(Ok(snapshot));
    }

    pub fn push_err(&self, err: FetchError) {
        lock(&self.script).push_back(Err(err));
    }

    /// Calls started.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that ran to completion (not cancelled).
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Highest number of calls ever running at once.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        lock(&self.tokens).clone()
    }
}

impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<UsageSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.tokens).push(token.to_string());
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);

        let delay = *lock(&self.delay);
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FetchError::cancelled()),
            () = tokio::time::sleep(delay) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                lock(&self.script)
                    .pop_front()
                    .unwrap_or_else(|| Ok(lock(&self.default).clone()))
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Test Helpers
// =============================================================================

/// Check if a string contains ANSI escape sequences.
#[must_use]
pub fn has_ansi_codes(text: &str) -> bool {
    text.contains('\x1b')
}

/// Sample config TOML exercising every section.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[refresh]
interval_seconds = 120
enabled = false

[display]
warning_threshold_percent = 75

[api]
quota_key = "chat"
overage_budget = 50
timeout_seconds = 10
max_attempts = 2
"#
    .to_string()
}
