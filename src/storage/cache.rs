//! Durable cache for the last good usage snapshot.
//!
//! The cache file is a JSON object keyed by namespaced keys:
//!
//! ```json
//! { "quotabar.usageSnapshot": { "data": { ... }, "cachedAt": 1730000000000 } }
//! ```
//!
//! # Features
//! - Atomic writes using temp file + rename (prevents corruption)
//! - Last write wins; unrelated keys in the file are preserved
//! - Freshness tiers computed from `cachedAt`
//! - Graceful degradation on missing/corrupt cache

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::core::models::{CachedSnapshot, UsageSnapshot};
use crate::error::Result;
use crate::storage::paths::AppPaths;

/// Key of the snapshot record inside the cache file.
pub const CACHE_KEY: &str = "quotabar.usageSnapshot";

/// Freshness thresholds.
pub const FRESH_SECS: u64 = 5 * 60;
pub const VALID_SECS: u64 = 60 * 60;
pub const STALE_SECS: u64 = 24 * 60 * 60;

/// How old a cached snapshot is, in coarse tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Freshness {
    /// Under 5 minutes.
    Fresh,
    /// Under 60 minutes.
    Valid,
    /// Under 24 hours.
    Stale,
    /// 24 hours or older.
    VeryStale,
}

impl Freshness {
    #[must_use]
    pub const fn from_age(age: Duration) -> Self {
        let secs = age.as_secs();
        if secs < FRESH_SECS {
            Self::Fresh
        } else if secs < VALID_SECS {
            Self::Valid
        } else if secs < STALE_SECS {
            Self::Stale
        } else {
            Self::VeryStale
        }
    }

    /// Display prefix for values shown from this tier.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Fresh | Self::Valid => "",
            Self::Stale => "~",
            Self::VeryStale => "?",
        }
    }
}

/// File-backed snapshot cache.
///
/// Only the coordinator writes to it.
#[derive(Debug, Clone)]
pub struct UsageCache {
    path: PathBuf,
}

impl UsageCache {
    /// Cache at the default location under the app cache directory.
    #[must_use]
    pub fn new() -> Self {
        Self::at(AppPaths::new().usage_cache_file())
    }

    /// Cache at a specific file (useful for tests).
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the entry, stamping it with the current time.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn store(&self, snapshot: &UsageSnapshot) -> Result<CachedSnapshot> {
        let entry = CachedSnapshot {
            data: snapshot.clone(),
            cached_at: Utc::now(),
        };
        self.write_entry(&entry)?;
        Ok(entry)
    }

    /// Write a pre-built entry.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn write_entry(&self, entry: &CachedSnapshot) -> Result<()> {
        let mut record = self.read_record().unwrap_or_default();
        record.insert(CACHE_KEY.to_string(), serde_json::to_value(entry)?);
        write(&self.path, &Value::Object(record))?;
        tracing::debug!(path = %self.path.display(), "cached usage snapshot");
        Ok(())
    }

    /// The cached entry, or `None` if missing or unreadable.
    #[must_use]
    pub fn entry(&self) -> Option<CachedSnapshot> {
        let mut record = self.read_record()?;
        let value = record.remove(CACHE_KEY)?;
        match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("ignoring corrupt cache entry: {e}");
                None
            }
        }
    }

    #[must_use]
    pub fn retrieve(&self) -> Option<UsageSnapshot> {
        self.entry().map(|e| e.data)
    }

    #[must_use]
    pub fn age_ms(&self) -> Option<u64> {
        self.entry().map(|e| e.age_ms(Utc::now()))
    }

    #[must_use]
    pub fn freshness(&self) -> Option<Freshness> {
        self.freshness_at(Utc::now())
    }

    /// Freshness relative to `now`.
    #[must_use]
    pub fn freshness_at(&self, now: DateTime<Utc>) -> Option<Freshness> {
        self.entry()
            .map(|e| Freshness::from_age(Duration::from_millis(e.age_ms(now))))
    }

    /// Remove the entry. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be rewritten or removed.
    pub fn clear(&self) -> Result<()> {
        let Some(mut record) = self.read_record() else {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        };
        if record.remove(CACHE_KEY).is_none() {
            return Ok(());
        }
        if record.is_empty() {
            std::fs::remove_file(&self.path)?;
        } else {
            write(&self.path, &Value::Object(record))?;
        }
        tracing::debug!(path = %self.path.display(), "cleared usage cache");
        Ok(())
    }

    fn read_record(&self) -> Option<Map<String, Value>> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) | Err(_) => {
                tracing::warn!(path = %self.path.display(), "cache file is not a JSON object");
                None
            }
        }
    }
}

impl Default for UsageCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize `data` and write it atomically.
fn write(path: &Path, data: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string(data)?;
    write_atomic(path, content.as_bytes())?;
    Ok(())
}

/// Write bytes atomically using temp file + rename.
fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Temp file must live in the same directory for rename to be atomic.
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("cache"),
        std::process::id()
    ));

    {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    std::fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    fn cache_in(tmp: &TempDir) -> UsageCache {
        UsageCache::at(tmp.path().join("usage-cache.json"))
    }

    fn entry_aged(age: TimeDelta, now: DateTime<Utc>) -> CachedSnapshot {
        CachedSnapshot {
            data: UsageSnapshot::new(10.0, 100.0),
            cached_at: now - age,
        }
    }

    #[test]
    fn freshness_boundaries() {
        let secs = Duration::from_secs;
        assert_eq!(Freshness::from_age(secs(5 * 60 - 1)), Freshness::Fresh);
        assert_eq!(Freshness::from_age(secs(5 * 60)), Freshness::Valid);
        assert_eq!(Freshness::from_age(secs(60 * 60 - 1)), Freshness::Valid);
        assert_eq!(Freshness::from_age(secs(60 * 60)), Freshness::Stale);
        assert_eq!(Freshness::from_age(secs(24 * 60 * 60 - 1)), Freshness::Stale);
        assert_eq!(Freshness::from_age(secs(24 * 60 * 60)), Freshness::VeryStale);
    }

    #[test]
    fn freshness_from_stored_entries() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        let now = Utc::now();

        for (age, expected) in [
            (TimeDelta::seconds(299), Freshness::Fresh),
            (TimeDelta::minutes(5), Freshness::Valid),
            (TimeDelta::minutes(60), Freshness::Stale),
            (TimeDelta::hours(24), Freshness::VeryStale),
        ] {
            cache.write_entry(&entry_aged(age, now)).unwrap();
            assert_eq!(cache.freshness_at(now), Some(expected), "age {age}");
        }
    }

    #[test]
    fn store_then_retrieve() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        assert!(cache.retrieve().is_none());
        assert!(cache.age_ms().is_none());
        assert!(cache.freshness().is_none());

        let snapshot = UsageSnapshot::new(50.0, 300.0).with_budget(5.0, 0.0);
        cache.store(&snapshot).unwrap();

        assert_eq!(cache.retrieve(), Some(snapshot));
        assert_eq!(cache.freshness(), Some(Freshness::Fresh));
        assert!(cache.age_ms().unwrap() < 5_000);
    }

    #[test]
    fn store_overwrites_previous_entry() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        cache.store(&UsageSnapshot::new(1.0, 10.0)).unwrap();
        cache.store(&UsageSnapshot::new(2.0, 10.0)).unwrap();
        assert!((cache.retrieve().unwrap().included_used - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn record_layout_is_namespaced() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        cache.store(&UsageSnapshot::new(1.0, 10.0)).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(cache.path()).unwrap()).unwrap();
        assert!(raw[CACHE_KEY]["cachedAt"].is_i64());
        assert_eq!(raw[CACHE_KEY]["data"]["includedTotal"], 10.0);
    }

    #[test]
    fn clear_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        cache.store(&UsageSnapshot::new(1.0, 10.0)).unwrap();

        cache.clear().unwrap();
        assert!(cache.retrieve().is_none());
        assert!(!cache.path().exists());

        cache.clear().unwrap();
        assert!(cache.retrieve().is_none());
    }

    #[test]
    fn clear_preserves_foreign_keys() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        std::fs::write(cache.path(), r#"{"other.key": 1}"#).unwrap();
        cache.store(&UsageSnapshot::new(1.0, 10.0)).unwrap();

        cache.clear().unwrap();
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(cache.path()).unwrap()).unwrap();
        assert_eq!(raw["other.key"], 1);
        assert!(raw.get(CACHE_KEY).is_none());
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        std::fs::write(cache.path(), "not json").unwrap();
        assert!(cache.retrieve().is_none());

        cache.store(&UsageSnapshot::new(3.0, 10.0)).unwrap();
        assert!(cache.retrieve().is_some());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("atomic.json");
        write_atomic(&path, b"{}").unwrap();

        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
