//! Application paths for config and cache.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Relocates every application directory under one root.
pub const ENV_HOME: &str = "QUOTABAR_HOME";

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Cache directory.
    pub cache: PathBuf,
}

impl AppPaths {
    /// Platform paths, or `$QUOTABAR_HOME/{config,cache}` when that is set.
    #[must_use]
    pub fn new() -> Self {
        if let Some(root) = std::env::var_os(ENV_HOME).filter(|v| !v.is_empty()) {
            return Self::under(Path::new(&root));
        }
        if let Some(proj_dirs) = ProjectDirs::from("dev", "quotabar", "quotabar") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                cache: proj_dirs.cache_dir().to_path_buf(),
            }
        } else {
            // Fallback to home directory
            let home = directories::BaseDirs::new()
                .map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
            Self {
                config: home.join(".config/quotabar"),
                cache: home.join(".cache/quotabar"),
            }
        }
    }

    /// All directories under `root`.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        Self {
            config: root.join("config"),
            cache: root.join("cache"),
        }
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Path to the usage snapshot cache.
    #[must_use]
    pub fn usage_cache_file(&self) -> PathBuf {
        self.cache.join("usage-cache.json")
    }

    /// Ensure all directories exist.
    ///
    /// # Errors
    ///
    /// Returns error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config)?;
        std::fs::create_dir_all(&self.cache)?;
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_root_layout() {
        let paths = AppPaths::under(Path::new("/tmp/qb"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/qb/config/config.toml"));
        assert_eq!(
            paths.usage_cache_file(),
            PathBuf::from("/tmp/qb/cache/usage-cache.json")
        );
    }

    #[test]
    fn ensure_dirs_creates_tree() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = AppPaths::under(tmp.path());
        paths.ensure_dirs().unwrap();
        assert!(paths.config.is_dir());
        assert!(paths.cache.is_dir());
    }
}
