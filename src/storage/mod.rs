//! Storage for configuration and the snapshot cache.

pub mod cache;
pub mod config;
pub mod paths;

pub use cache::{Freshness, UsageCache};
pub use config::{Config, ConfigOverrides, ConfigSource, ConfigSources, ResolvedConfig};
pub use paths::AppPaths;
