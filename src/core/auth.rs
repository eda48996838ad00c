//! Bearer token acquisition.
//!
//! The [`AuthTokenProvider`] trait is the boundary to whatever identity
//! provider owns the user's session. Two implementations ship here:
//!
//! - [`KeyringTokenProvider`]: token stored in the OS keyring, with
//!   sign-in/sign-out and an optional interactive prompt.
//! - [`EnvTokenProvider`]: token from `QUOTABAR_TOKEN` or `GITHUB_TOKEN`.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::core::events::{EventEmitter, Subscription};
use crate::error::{QuotaError, Result};

/// Keyring service name.
pub const KEYRING_SERVICE: &str = "quotabar";
/// Keyring user/account name.
pub const KEYRING_USER: &str = "github-token";

/// Environment variables checked by [`EnvTokenProvider`], in order.
pub const TOKEN_ENV_VARS: &[&str] = &["QUOTABAR_TOKEN", "GITHUB_TOKEN"];

/// Source of bearer tokens for the quota endpoint.
#[async_trait]
pub trait AuthTokenProvider: Send + Sync {
    /// Current token, if any. Never fails.
    ///
    /// With `prompt_if_missing` and no session, runs the interactive sign-in
    /// flow and returns its token, or `None` if the user declines.
    async fn get_token(&self, prompt_if_missing: bool) -> Option<String>;

    /// Whether a session exists. Must not trigger any UI.
    fn is_authenticated(&self) -> bool;

    /// Notify on sign-in, sign-out and silent token refresh.
    ///
    /// The callback gets no payload; it should re-check [`Self::is_authenticated`].
    fn on_session_change(&self, callback: Box<dyn Fn() + Send + Sync>) -> Subscription;

    /// Drop the in-memory session after the server rejected its token, so the
    /// next `get_token(true)` runs the sign-in flow instead of handing the
    /// same token back. Listeners are not notified.
    fn invalidate_session(&self) {}
}

// =============================================================================
// Keyring provider
// =============================================================================

/// Interactive sign-in: returns a token, or `None` if the user declines.
pub type SignInPrompt = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Backing store for the keyring provider.
///
/// The OS keyring in production; an in-memory map in tests.
pub trait TokenStore: Send + Sync {
    /// # Errors
    /// Returns error if the store cannot be read.
    fn load(&self) -> Result<Option<String>>;
    /// # Errors
    /// Returns error if the store cannot be written.
    fn save(&self, token: &str) -> Result<()>;
    /// # Errors
    /// Returns error if the entry cannot be removed.
    fn delete(&self) -> Result<()>;
}

/// Token store backed by the `keyring` crate.
pub struct OsKeyring {
    service: String,
    user: String,
}

impl OsKeyring {
    #[must_use]
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            user: KEYRING_USER.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.user).map_err(|e| QuotaError::Keyring(e.to_string()))
    }
}

impl Default for OsKeyring {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for OsKeyring {
    fn load(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(QuotaError::Keyring(e.to_string())),
        }
    }

    fn save(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .map_err(|e| QuotaError::Keyring(format!("failed to store token: {e}")))
    }

    fn delete(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(QuotaError::Keyring(format!("failed to delete token: {e}"))),
        }
    }
}

/// Keyring-backed session with in-memory token cache.
///
/// A token the server rejected is remembered and ignored by [`Self::reload`]
/// until a different token is signed in.
pub struct KeyringTokenProvider {
    store: Box<dyn TokenStore>,
    token: RwLock<Option<String>>,
    rejected: RwLock<Option<String>>,
    prompt: Option<SignInPrompt>,
    session_changed: EventEmitter<()>,
}

impl KeyringTokenProvider {
    /// Provider over the OS keyring. Reads the stored token once.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Box::new(OsKeyring::new()))
    }

    /// Provider over a custom store.
    #[must_use]
    pub fn with_store(store: Box<dyn TokenStore>) -> Self {
        let token = store.load().unwrap_or_else(|e| {
            tracing::warn!("could not read stored token: {e}");
            None
        });
        Self {
            store,
            token: RwLock::new(token),
            rejected: RwLock::new(None),
            prompt: None,
            session_changed: EventEmitter::new(),
        }
    }

    /// Install the interactive sign-in flow used by `get_token(true)`.
    #[must_use]
    pub fn with_prompt(mut self, prompt: SignInPrompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Store `token` and start a session.
    ///
    /// # Errors
    ///
    /// Returns error if the token cannot be persisted.
    pub fn sign_in(&self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(QuotaError::ConfigInvalid {
                key: "token".to_string(),
                value: String::new(),
                message: "token must not be empty".to_string(),
            });
        }
        self.store.save(token)?;
        *write(&self.rejected) = None;
        self.replace(Some(token.to_string()));
        Ok(())
    }

    /// Forget the stored token and end the session.
    ///
    /// # Errors
    ///
    /// Returns error if the keyring entry cannot be removed.
    pub fn sign_out(&self) -> Result<()> {
        self.store.delete()?;
        *write(&self.rejected) = None;
        self.replace(None);
        Ok(())
    }

    /// Re-read the store, notifying if the token changed elsewhere.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    pub fn reload(&self) -> Result<()> {
        let stored = self.store.load()?;
        let token = {
            let rejected = read(&self.rejected);
            stored.filter(|t| rejected.as_ref() != Some(t))
        };
        self.replace(token);
        Ok(())
    }

    fn replace(&self, token: Option<String>) {
        let changed = {
            let mut guard = write(&self.token);
            let changed = *guard != token;
            *guard = token;
            changed
        };
        if changed {
            tracing::info!(authenticated = self.is_authenticated(), "session changed");
            self.session_changed.emit(&());
        }
    }

    fn current(&self) -> Option<String> {
        read(&self.token).clone()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Default for KeyringTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthTokenProvider for KeyringTokenProvider {
    async fn get_token(&self, prompt_if_missing: bool) -> Option<String> {
        if let Some(token) = self.current() {
            return Some(token);
        }
        if !prompt_if_missing {
            return None;
        }
        let prompt = Arc::clone(self.prompt.as_ref()?);
        tracing::debug!("no session, starting interactive sign-in");
        let entered = tokio::task::spawn_blocking(move || prompt())
            .await
            .ok()
            .flatten()?;
        match self.sign_in(&entered) {
            Ok(()) => self.current(),
            Err(e) => {
                tracing::warn!("sign-in failed: {e}");
                None
            }
        }
    }

    fn is_authenticated(&self) -> bool {
        read(&self.token).is_some()
    }

    fn on_session_change(&self, callback: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.session_changed.subscribe(move |()| callback())
    }

    fn invalidate_session(&self) {
        let Some(stale) = write(&self.token).take() else {
            return;
        };
        tracing::debug!("dropping rejected token from session");
        *write(&self.rejected) = Some(stale);
    }
}

// =============================================================================
// Environment provider
// =============================================================================

/// Token taken from the environment at construction. Never prompts.
pub struct EnvTokenProvider {
    token: Option<String>,
}

impl EnvTokenProvider {
    /// Read the first non-empty variable from [`TOKEN_ENV_VARS`].
    #[must_use]
    pub fn from_env() -> Self {
        let token = TOKEN_ENV_VARS.iter().find_map(|name| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        });
        Self { token }
    }

    #[must_use]
    pub const fn with_token(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl AuthTokenProvider for EnvTokenProvider {
    async fn get_token(&self, _prompt_if_missing: bool) -> Option<String> {
        self.token.clone()
    }

    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn on_session_change(&self, _callback: Box<dyn Fn() + Send + Sync>) -> Subscription {
        Subscription::detached()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore(Mutex<Option<String>>);

    impl TokenStore for MemoryStore {
        fn load(&self) -> Result<Option<String>> {
            Ok(self.0.lock().unwrap().clone())
        }
        fn save(&self, token: &str) -> Result<()> {
            *self.0.lock().unwrap() = Some(token.to_string());
            Ok(())
        }
        fn delete(&self) -> Result<()> {
            *self.0.lock().unwrap() = None;
            Ok(())
        }
    }

    impl TokenStore for Arc<MemoryStore> {
        fn load(&self) -> Result<Option<String>> {
            self.as_ref().load()
        }
        fn save(&self, token: &str) -> Result<()> {
            self.as_ref().save(token)
        }
        fn delete(&self) -> Result<()> {
            self.as_ref().delete()
        }
    }

    fn counting(provider: &KeyringTokenProvider) -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sub = provider.on_session_change(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        (count, sub)
    }

    #[tokio::test]
    async fn sign_in_and_out_notify() {
        let provider = KeyringTokenProvider::with_store(Box::<MemoryStore>::default());
        let (count, _sub) = counting(&provider);

        assert!(!provider.is_authenticated());
        provider.sign_in("abc").unwrap();
        assert!(provider.is_authenticated());
        assert_eq!(provider.get_token(false).await.as_deref(), Some("abc"));

        provider.sign_out().unwrap();
        assert!(!provider.is_authenticated());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reload_without_change_is_silent() {
        let provider = KeyringTokenProvider::with_store(Box::<MemoryStore>::default());
        provider.sign_in("abc").unwrap();
        let (count, _sub) = counting(&provider);

        provider.reload().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn prompt_only_when_asked() {
        let prompts = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&prompts);
        let provider = KeyringTokenProvider::with_store(Box::<MemoryStore>::default())
            .with_prompt(Arc::new(move || {
                p.fetch_add(1, Ordering::SeqCst);
                Some("prompted".to_string())
            }));

        assert_eq!(provider.get_token(false).await, None);
        assert_eq!(prompts.load(Ordering::SeqCst), 0);

        assert_eq!(provider.get_token(true).await.as_deref(), Some("prompted"));
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
        assert!(provider.is_authenticated());
    }

    #[tokio::test]
    async fn invalidated_session_prompts_for_new_token() {
        let prompts = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&prompts);
        let provider = KeyringTokenProvider::with_store(Box::new(MemoryStore(Mutex::new(Some(
            "stale".to_string(),
        )))))
        .with_prompt(Arc::new(move || {
            p.fetch_add(1, Ordering::SeqCst);
            Some("fresh".to_string())
        }));

        assert_eq!(provider.get_token(true).await.as_deref(), Some("stale"));
        assert_eq!(prompts.load(Ordering::SeqCst), 0);

        provider.invalidate_session();
        assert!(!provider.is_authenticated());
        assert_eq!(provider.get_token(true).await.as_deref(), Some("fresh"));
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reload_ignores_rejected_token() {
        let provider = KeyringTokenProvider::with_store(Box::new(MemoryStore(Mutex::new(Some(
            "stale".to_string(),
        )))));
        provider.invalidate_session();
        let (count, _sub) = counting(&provider);

        provider.reload().unwrap();
        assert!(!provider.is_authenticated());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        provider.sign_in("fresh").unwrap();
        provider.reload().unwrap();
        assert_eq!(provider.get_token(false).await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn reload_notices_external_sign_out() {
        let store = Arc::new(MemoryStore(Mutex::new(Some("abc".to_string()))));
        let provider = KeyringTokenProvider::with_store(Box::new(Arc::clone(&store)));
        let (count, _sub) = counting(&provider);

        store.delete().unwrap();
        provider.reload().unwrap();
        assert!(!provider.is_authenticated());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn declined_prompt_returns_none() {
        let provider = KeyringTokenProvider::with_store(Box::<MemoryStore>::default())
            .with_prompt(Arc::new(|| None));
        assert_eq!(provider.get_token(true).await, None);
        assert!(!provider.is_authenticated());
    }

    #[test]
    fn empty_token_rejected() {
        let provider = KeyringTokenProvider::with_store(Box::<MemoryStore>::default());
        assert!(provider.sign_in("   ").is_err());
    }

    #[tokio::test]
    async fn env_provider_is_static() {
        let provider = EnvTokenProvider::with_token(Some("t".into()));
        assert!(provider.is_authenticated());
        assert_eq!(provider.get_token(true).await.as_deref(), Some("t"));
        assert!(!EnvTokenProvider::with_token(None).is_authenticated());
    }
}
