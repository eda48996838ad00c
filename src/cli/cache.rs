//! `quotabar cache`: inspect or clear the cached snapshot.

use std::time::Duration;

use crate::cli::args::{CacheCommand, OutputFormat};
use crate::cli::color_enabled;
use crate::error::Result;
use crate::render::{CacheReport, render_cache};
use crate::storage::cache::{Freshness, UsageCache};
use crate::storage::config::ResolvedConfig;

/// Execute a `cache` subcommand.
///
/// # Errors
///
/// Returns error if the cache file cannot be removed or output fails.
pub fn execute(cmd: &CacheCommand, config: &ResolvedConfig) -> Result<()> {
    let cache = UsageCache::new();
    match cmd {
        CacheCommand::Show => {
            let report = report(&cache);
            println!(
                "{}",
                render_cache(&report, config.format, config.pretty, color_enabled(config))?
            );
        }
        CacheCommand::Clear => {
            cache.clear()?;
            if config.format == OutputFormat::Human {
                println!("Cache cleared: {}", cache.path().display());
            }
        }
    }
    Ok(())
}

/// Snapshot of the cache for display.
#[must_use]
pub fn report(cache: &UsageCache) -> CacheReport {
    let entry = cache.entry();
    let age_ms = entry.as_ref().map(|e| e.age_ms(chrono::Utc::now()));
    CacheReport {
        path: cache.path().display().to_string(),
        freshness: age_ms.map(|ms| Freshness::from_age(Duration::from_millis(ms))),
        age_ms,
        entry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestDir, make_snapshot};

    #[test]
    fn report_for_empty_cache() {
        let dir = TestDir::new();
        let report = report(&UsageCache::at(dir.file_path("usage-cache.json")));
        assert!(report.entry.is_none());
        assert!(report.age_ms.is_none());
        assert!(report.freshness.is_none());
    }

    #[test]
    fn report_for_fresh_entry() {
        let dir = TestDir::new();
        let cache = UsageCache::at(dir.file_path("usage-cache.json"));
        cache.store(&make_snapshot(10.0, 300.0)).unwrap();

        let report = report(&cache);
        assert_eq!(report.freshness, Some(Freshness::Fresh));
        assert!(report.age_ms.is_some_and(|ms| ms < 60_000));
    }
}
