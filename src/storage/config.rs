//! Store configuration
//!
//! Tunables live in `larder.toml` at the storage root. Every field has a
//! default, so a missing file or a partial one is fine.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lock tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Seconds to wait for a contended lock before giving up
    pub timeout_secs: u64,

    /// Age in seconds after which a lock record is considered abandoned
    pub stale_secs: u64,

    /// Milliseconds to sleep between acquisition retries
    pub retry_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            stale_secs: 300,
            retry_ms: 100,
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }
}

/// Cache tunables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default ttl in seconds for entries stored without an explicit one.
    /// Unset means such entries never expire.
    pub default_ttl_secs: Option<u64>,
}

/// Combined configuration for a storage root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub lock: LockConfig,
    pub cache: CacheConfig,
}

impl StoreConfig {
    /// Config file name inside the storage root
    pub const FILE_NAME: &'static str = "larder.toml";

    /// Loads the configuration from a storage root, falling back to
    /// defaults when no file exists
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(Self::FILE_NAME);
        if !path.is_file() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Writes the configuration to a storage root
    pub fn save(&self, root: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(root)?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(root.join(Self::FILE_NAME), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();

        assert_eq!(config.lock.timeout_secs, 10);
        assert_eq!(config.lock.stale_secs, 300);
        assert_eq!(config.lock.retry_ms, 100);
        assert_eq!(config.cache.default_ttl_secs, None);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[lock]
timeout_secs = 5

[cache]
default_ttl_secs = 3600
"#;

        let config: StoreConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.lock.timeout_secs, 5);
        // Unspecified fields keep their defaults
        assert_eq!(config.lock.stale_secs, 300);
        assert_eq!(config.cache.default_ttl_secs, Some(3600));
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::load(dir.path()).unwrap();

        assert_eq!(config.lock.timeout_secs, 10);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();

        let mut config = StoreConfig::default();
        config.lock.timeout_secs = 2;
        config.cache.default_ttl_secs = Some(60);
        config.save(dir.path()).unwrap();

        let loaded = StoreConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.lock.timeout_secs, 2);
        assert_eq!(loaded.cache.default_ttl_secs, Some(60));
    }

    #[test]
    fn duration_helpers() {
        let lock = LockConfig::default();

        assert_eq!(lock.timeout(), Duration::from_secs(10));
        assert_eq!(lock.stale_after(), Duration::from_secs(300));
        assert_eq!(lock.retry_interval(), Duration::from_millis(100));
    }
}
