//! # Storage Layer
//!
//! File-backed persistence shared by independent, short-lived processes.
//! There is no database and no long-lived server: JSON files on disk are
//! the only state, and the filesystem is the only coordination channel.
//!
//! ## Components
//!
//! | Component | Role | Location |
//! |-----------|------|----------|
//! | [`FileLock`] | Cross-process mutual exclusion | `<target>.lock` sentinel |
//! | [`DocumentStore`] | JSON documents, atomic + transactional writes | `<root>/*.json` |
//! | [`FeedCache`] | TTL cache with persisted statistics | `<root>/cache/` |
//! | [`StoreConfig`] | Tunables | `<root>/larder.toml` |
//! | [`Site`] | Root resolution and wiring | `<root>/` |
//!
//! ## Concurrency Safety
//!
//! - Writes that must never be observed half-done go through
//!   [`DocumentStore::atomic_write`] (temp file + rename)
//! - Read-modify-write goes through [`DocumentStore::transactional_update`],
//!   serialized per document by [`FileLock`]
//! - Locks abandoned by crashed processes are reclaimed via staleness
//!   detection (age threshold, or dead pid on the same host)

mod cache;
mod config;
mod document;
mod lock;
mod site;

pub use cache::{CacheEntry, CacheError, CacheStats, FeedCache, STATS_DOC};
pub use config::{CacheConfig, ConfigError, LockConfig, StoreConfig};
pub use document::{Document, DocumentStore, StoreError};
pub use lock::{FileLock, LockError, LockRecord};
pub use site::{Site, SiteError};
