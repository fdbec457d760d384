//! Larder - file-backed JSON storage for content sites
//!
//! All persistent state (configuration, feed definitions, cached remote
//! content) lives as JSON documents on disk, accessed concurrently by
//! short-lived request processes. Larder provides the storage core: a
//! sentinel-file lock, a transactional document store and a TTL feed cache
//! with persisted statistics.

pub mod cli;
pub mod storage;

pub use storage::{
    CacheEntry, CacheStats, Document, DocumentStore, FeedCache, FileLock, LockError, Site,
    StoreConfig, StoreError,
};
