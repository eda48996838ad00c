//! Quota acquisition core: auth, fetching, scheduling and coordination.

pub mod auth;
pub mod coordinator;
pub mod events;
pub mod fetch;
pub mod http;
pub mod logging;
pub mod models;
pub mod scheduler;
pub mod state;

pub use auth::{AuthTokenProvider, EnvTokenProvider, KeyringTokenProvider, SignInPrompt};
pub use coordinator::Coordinator;
pub use events::{EventEmitter, Subscription};
pub use fetch::{FetchClient, FetchOptions, UsageFetcher};
pub use models::{CachedSnapshot, ChangeEvent, DisplayState, UsageSnapshot};
pub use scheduler::{RefreshConfig, RefreshScheduler, RefreshTrigger};
pub use state::{determine_state, is_warning_threshold_exceeded};
