//! TTL cache for fetched feed content
//!
//! Remote feeds are fetched by whichever request process notices they are
//! missing or stale, so the cache itself has to live on disk: one JSON file
//! per feed key under the cache root, written atomically through the
//! [`DocumentStore`]. Keys are opaque strings (usually URLs) and are mapped
//! to filenames by hashing, so any key is filename-safe.
//!
//! Hit/miss statistics persist across processes too. Each increment is a
//! full [`DocumentStore::transactional_update`] on the stats document:
//! strict counters that serialize all counted lookups through one lock,
//! chosen over approximate best-effort counters.

use std::fs;

use chrono::{DateTime, Duration as TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::document::{Document, DocumentStore, StoreError};

/// Name of the statistics document under the cache root
pub const STATS_DOC: &str = "stats.json";

/// Subdirectory holding one file per cached feed
const FEED_DIR: &str = "feeds";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A cached payload with its freshness metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Original feed key; the filename only carries its hash
    pub key: String,

    /// The wrapped payload
    pub data: Document,

    /// When the payload was stored
    pub cached_at: DateTime<Utc>,

    /// Time-to-live in seconds; absent means the entry never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,

    /// Absolute expiry, derived from `cached_at + ttl`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Returns true once `now` is past the expiry time. Entries without a
    /// ttl never expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() > at,
            None => false,
        }
    }
}

/// Cumulative usage counters, persisted because every lookup may run in a
/// fresh process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_items: u64,
    pub last_cleanup: Option<DateTime<Utc>>,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or 0 when there have been no lookups
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Keyed, TTL-based cache persisted through a [`DocumentStore`]
pub struct FeedCache {
    store: DocumentStore,
    default_ttl: Option<u64>,
}

impl FeedCache {
    /// Creates a cache over the given store (rooted at the cache directory)
    pub fn new(store: DocumentStore) -> Self {
        Self {
            store,
            default_ttl: None,
        }
    }

    /// Sets the ttl applied when `store` is called without one
    pub fn with_default_ttl(mut self, ttl: Option<u64>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Document name for a key: `feeds/<blake3-prefix>.json`
    fn entry_name(key: &str) -> String {
        let hex = blake3::hash(key.as_bytes()).to_hex();
        format!("{}/{}.json", FEED_DIR, &hex[..16])
    }

    /// Wraps and persists a payload, unconditionally replacing any prior
    /// entry for the key
    pub fn store(
        &self,
        key: &str,
        data: Document,
        ttl: Option<u64>,
    ) -> Result<CacheEntry, CacheError> {
        let ttl = ttl.or(self.default_ttl);
        let cached_at = Utc::now();
        let expires_at = ttl.map(|secs| cached_at + TimeDelta::seconds(secs as i64));

        let entry = CacheEntry {
            key: key.to_string(),
            data,
            cached_at,
            ttl,
            expires_at,
        };

        self.store.atomic_write(&Self::entry_name(key), &entry)?;
        self.sync_total_items()?;
        Ok(entry)
    }

    /// Returns the entry for a key regardless of expiry, or `None` when
    /// absent. Counts a hit or a miss.
    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        match self.store.read::<CacheEntry>(&Self::entry_name(key)) {
            Ok(entry) => {
                self.record_lookup(true)?;
                Ok(Some(entry))
            }
            Err(StoreError::NotFound(_)) => {
                self.record_lookup(false)?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Existence probe without any statistics side effect
    pub fn has(&self, key: &str) -> bool {
        self.store.exists(&Self::entry_name(key))
    }

    /// Returns whether the stored entry is past its ttl. Absent entries
    /// report true, since there is nothing fresh to serve.
    pub fn is_expired(&self, key: &str) -> Result<bool, CacheError> {
        match self.store.read::<CacheEntry>(&Self::entry_name(key)) {
            Ok(entry) => Ok(entry.is_expired()),
            Err(StoreError::NotFound(_)) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the payload only while the entry is unexpired; a stale entry
    /// reads as "not present" here even though [`get`](Self::get) and
    /// [`has`](Self::has) still report it
    pub fn get_fresh(&self, key: &str) -> Result<Option<Document>, CacheError> {
        match self.get(key)? {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.data)),
            _ => Ok(None),
        }
    }

    /// Removes one entry. Returns false if it did not exist.
    pub fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self.store.delete(&Self::entry_name(key))?;
        if removed {
            self.sync_total_items()?;
        }
        Ok(removed)
    }

    /// Removes all entries and resets statistics. Returns the number of
    /// entries removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for name in self.entry_names()? {
            if self.store.delete(&name)? {
                removed += 1;
            }
        }

        self.store
            .transactional_update(STATS_DOC, CacheStats::default(), |_| CacheStats::default())?;
        Ok(removed)
    }

    /// Removes exactly the expired entries, records the cleanup timestamp
    /// and returns the count removed. Entries without a ttl are never
    /// removed here.
    pub fn cleanup(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for name in self.entry_names()? {
            let entry: CacheEntry = match self.store.read(&name) {
                Ok(entry) => entry,
                // Deleted by a concurrent cleanup; nothing to do
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            if entry.is_expired() && self.store.delete(&name)? {
                removed += 1;
            }
        }

        let total = self.entry_count()? as u64;
        self.store
            .transactional_update(STATS_DOC, CacheStats::default(), |mut stats: CacheStats| {
                stats.total_items = total;
                stats.last_cleanup = Some(Utc::now());
                stats
            })?;
        Ok(removed)
    }

    /// Returns the persisted statistics; defaults when none recorded yet
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        match self.store.read(STATS_DOC) {
            Ok(stats) => Ok(stats),
            Err(StoreError::NotFound(_)) => Ok(CacheStats::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads all entries, skipping any that vanish mid-scan
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut entries = Vec::new();
        for name in self.entry_names()? {
            match self.store.read(&name) {
                Ok(entry) => entries.push(entry),
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(entries)
    }

    /// Returns the store backing this cache
    pub fn document_store(&self) -> &DocumentStore {
        &self.store
    }

    fn record_lookup(&self, hit: bool) -> Result<(), CacheError> {
        self.store
            .transactional_update(STATS_DOC, CacheStats::default(), |mut stats: CacheStats| {
                if hit {
                    stats.hits += 1;
                } else {
                    stats.misses += 1;
                }
                stats
            })?;
        Ok(())
    }

    fn sync_total_items(&self) -> Result<(), CacheError> {
        let total = self.entry_count()? as u64;
        self.store
            .transactional_update(STATS_DOC, CacheStats::default(), |mut stats: CacheStats| {
                stats.total_items = total;
                stats
            })?;
        Ok(())
    }

    fn entry_count(&self) -> Result<usize, CacheError> {
        Ok(self.entry_names()?.len())
    }

    fn entry_names(&self) -> Result<Vec<String>, CacheError> {
        let dir = self.store.root().join(FEED_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(format!("{}/{}", FEED_DIR, file_name));
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> FeedCache {
        FeedCache::new(DocumentStore::new(dir.path()))
    }

    fn feed_payload(id: u32) -> Document {
        json!({"id": id, "items": [{"title": format!("post {}", id)}]})
    }

    #[test]
    fn store_and_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        cache
            .store("https://example.org/feed", feed_payload(1), Some(3600))
            .unwrap();

        let entry = cache.get("https://example.org/feed").unwrap().unwrap();
        assert_eq!(entry.key, "https://example.org/feed");
        assert_eq!(entry.data, feed_payload(1));
        assert_eq!(entry.ttl, Some(3600));
        assert!(entry.expires_at.is_some());
    }

    #[test]
    fn store_overwrites_prior_entry() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        cache.store("feed", feed_payload(1), Some(60)).unwrap();
        cache.store("feed", feed_payload(2), None).unwrap();

        let entry = cache.get("feed").unwrap().unwrap();
        assert_eq!(entry.data, feed_payload(2));
        assert_eq!(entry.ttl, None);
    }

    #[test]
    fn expiry_follows_ttl() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        cache.store("feed", feed_payload(1), Some(1)).unwrap();
        assert!(!cache.is_expired("feed").unwrap());
        assert!(cache.get_fresh("feed").unwrap().is_some());

        thread::sleep(Duration::from_millis(1500));

        assert!(cache.is_expired("feed").unwrap());
        assert!(cache.get_fresh("feed").unwrap().is_none());
        // Stale entries stay visible to get/has until cleanup
        assert!(cache.has("feed"));
        assert!(cache.get("feed").unwrap().is_some());
    }

    #[test]
    fn entry_without_ttl_never_expires() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        cache.store("feed", feed_payload(1), None).unwrap();

        assert!(!cache.is_expired("feed").unwrap());
        assert!(cache.get_fresh("feed").unwrap().is_some());
        assert_eq!(cache.cleanup().unwrap(), 0);
        assert!(cache.has("feed"));
    }

    #[test]
    fn missing_key_reads_as_expired() {
        let dir = TempDir::new().unwrap();
        assert!(cache(&dir).is_expired("absent").unwrap());
    }

    #[test]
    fn cleanup_removes_only_expired_entries() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        cache.store("fresh", feed_payload(1), Some(3600)).unwrap();
        cache.store("doomed", feed_payload(2), Some(1)).unwrap();

        thread::sleep(Duration::from_millis(1500));

        assert_eq!(cache.cleanup().unwrap(), 1);
        assert!(cache.has("fresh"));
        assert!(!cache.has("doomed"));

        let stats = cache.stats().unwrap();
        assert!(stats.last_cleanup.is_some());
        assert_eq!(stats.total_items, 1);
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        cache.store("a", feed_payload(1), None).unwrap();
        cache.store("b", feed_payload(2), None).unwrap();

        // 3 hits
        cache.get("a").unwrap();
        cache.get("a").unwrap();
        cache.get("b").unwrap();
        // 2 misses
        cache.get("absent-1").unwrap();
        cache.get("absent-2").unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_ratio() - 0.6).abs() < f64::EPSILON);
        assert_eq!(stats.total_items, 2);
    }

    #[test]
    fn has_does_not_touch_stats() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        cache.store("a", feed_payload(1), None).unwrap();
        cache.has("a");
        cache.has("absent");

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert!(stats.hit_ratio().abs() < f64::EPSILON);
    }

    #[test]
    fn delete_removes_one_entry() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        cache.store("a", feed_payload(1), None).unwrap();
        cache.store("b", feed_payload(2), None).unwrap();

        assert!(cache.delete("a").unwrap());
        assert!(!cache.delete("a").unwrap());
        assert!(cache.has("b"));
        assert_eq!(cache.stats().unwrap().total_items, 1);
    }

    #[test]
    fn clear_removes_entries_and_resets_stats() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        cache.store("a", feed_payload(1), None).unwrap();
        cache.store("b", feed_payload(2), None).unwrap();
        cache.get("a").unwrap();
        cache.get("absent").unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(!cache.has("a"));

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.total_items, 0);
    }

    #[test]
    fn default_ttl_applies_when_none_given() {
        let dir = TempDir::new().unwrap();
        let cache = FeedCache::new(DocumentStore::new(dir.path())).with_default_ttl(Some(60));

        let entry = cache.store("feed", feed_payload(1), None).unwrap();
        assert_eq!(entry.ttl, Some(60));

        // An explicit ttl still wins
        let entry = cache.store("feed", feed_payload(1), Some(5)).unwrap();
        assert_eq!(entry.ttl, Some(5));
    }

    #[test]
    fn keys_with_awkward_characters_are_stored() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        let key = "https://example.org/feed?page=1&tag=a/b";
        cache.store(key, feed_payload(1), None).unwrap();

        let entry = cache.get(key).unwrap().unwrap();
        assert_eq!(entry.key, key);
    }

    #[test]
    fn entries_lists_everything() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        cache.store("a", feed_payload(1), None).unwrap();
        cache.store("b", feed_payload(2), Some(60)).unwrap();

        let mut keys: Vec<_> = cache
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
