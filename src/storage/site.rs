//! Site storage root
//!
//! [`Site`] is the entry point for everything else: it resolves the storage
//! root, lays out the on-disk structure on `init` and hands out stores
//! configured from `larder.toml`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use thiserror::Error;

use super::{DocumentStore, FeedCache, StoreConfig};

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("No storage root at {0}. Run 'larder init' first.")]
    NotInitialized(PathBuf),

    #[error("Could not determine a default storage root")]
    NoDefaultRoot,
}

/// A site's storage root
pub struct Site {
    root: PathBuf,
    config: StoreConfig,
}

impl Site {
    /// Subdirectory holding cache entries and statistics
    pub const CACHE_DIR: &'static str = "cache";

    /// Opens an initialized storage root
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.join(StoreConfig::FILE_NAME).is_file() {
            return Err(SiteError::NotInitialized(root).into());
        }

        let config = StoreConfig::load(&root)
            .with_context(|| format!("Failed to load config from {}", root.display()))?;

        Ok(Self { root, config })
    }

    /// Initializes the storage layout at the given root and opens it
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        let feeds_dir = root.join(Self::CACHE_DIR).join("feeds");
        fs::create_dir_all(&feeds_dir)
            .with_context(|| format!("Failed to create cache directory: {}", feeds_dir.display()))?;

        if !root.join(StoreConfig::FILE_NAME).is_file() {
            StoreConfig::default()
                .save(&root)
                .with_context(|| format!("Failed to write config to {}", root.display()))?;
        }

        Self::open(root)
    }

    /// Resolves a storage root: explicit path, then `LARDER_ROOT`, then the
    /// platform data directory
    pub fn resolve_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path);
        }
        if let Ok(path) = env::var("LARDER_ROOT") {
            return Ok(PathBuf::from(path));
        }

        ProjectDirs::from("dev", "larder", "larder")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| SiteError::NoDefaultRoot.into())
    }

    /// Returns the storage root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the loaded configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the cache directory path
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(Self::CACHE_DIR)
    }

    /// Returns the document store for site documents
    pub fn documents(&self) -> DocumentStore {
        self.store_at(&self.root)
    }

    /// Returns the feed cache
    pub fn cache(&self) -> FeedCache {
        FeedCache::new(self.store_at(&self.cache_dir()))
            .with_default_ttl(self.config.cache.default_ttl_secs)
    }

    /// Lists site document names, excluding cache internals
    pub fn document_names(&self) -> Result<Vec<String>> {
        let prefix = format!("{}/", Self::CACHE_DIR);
        let names = self
            .documents()
            .list()
            .context("Failed to list documents")?
            .into_iter()
            .filter(|name| !name.starts_with(&prefix))
            .collect();
        Ok(names)
    }

    fn store_at(&self, root: &Path) -> DocumentStore {
        DocumentStore::new(root).with_lock_settings(
            self.config.lock.timeout(),
            self.config.lock.stale_after(),
            self.config.lock.retry_interval(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn init_creates_structure() {
        let dir = TempDir::new().unwrap();
        let site = Site::init(dir.path()).unwrap();

        assert!(site.cache_dir().join("feeds").is_dir());
        assert!(site.root().join(StoreConfig::FILE_NAME).is_file());
    }

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();

        Site::init(dir.path()).unwrap();
        Site::init(dir.path()).unwrap();

        assert!(dir.path().join(StoreConfig::FILE_NAME).is_file());
    }

    #[test]
    fn init_preserves_existing_config() {
        let dir = TempDir::new().unwrap();

        let mut config = StoreConfig::default();
        config.lock.timeout_secs = 3;
        config.save(dir.path()).unwrap();

        let site = Site::init(dir.path()).unwrap();
        assert_eq!(site.config().lock.timeout_secs, 3);
    }

    #[test]
    fn open_uninitialized_fails() {
        let dir = TempDir::new().unwrap();
        let result = Site::open(dir.path());

        assert!(result.is_err());
    }

    #[test]
    fn resolve_root_prefers_explicit_path() {
        let root = Site::resolve_root(Some(PathBuf::from("/tmp/custom"))).unwrap();
        assert_eq!(root, PathBuf::from("/tmp/custom"));
    }

    #[test]
    fn document_names_exclude_cache_internals() {
        let dir = TempDir::new().unwrap();
        let site = Site::init(dir.path()).unwrap();

        site.documents()
            .atomic_write("feeds.json", &json!({"feeds": []}))
            .unwrap();
        site.cache().store("some-feed", json!({}), None).unwrap();

        let names = site.document_names().unwrap();
        assert_eq!(names, vec!["feeds.json".to_string()]);
    }

    #[test]
    fn cache_uses_configured_default_ttl() {
        let dir = TempDir::new().unwrap();

        let mut config = StoreConfig::default();
        config.cache.default_ttl_secs = Some(120);
        config.save(dir.path()).unwrap();

        let site = Site::init(dir.path()).unwrap();
        let entry = site.cache().store("feed", json!({}), None).unwrap();
        assert_eq!(entry.ttl, Some(120));
    }
}
