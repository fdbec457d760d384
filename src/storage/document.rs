//! JSON document storage
//!
//! Documents are UTF-8 JSON files addressed by a path relative to the
//! storage root. Three write disciplines are available, in increasing
//! order of guarantee:
//!
//! - [`DocumentStore::write`] / [`DocumentStore::read`] - direct I/O, no
//!   locking, for low-contention paths
//! - [`DocumentStore::atomic_write`] - temp file + rename, so readers see
//!   either the old or the new document, never a partial write
//! - [`DocumentStore::transactional_update`] - locked read-modify-write,
//!   the only sanctioned way to mutate a document based on its current
//!   contents; all updates to one name are totally ordered
//!
//! Code built on the store must never hold locks for two different names
//! inside one logical operation. There is no deadlock detection, and
//! without a global acquisition order, nesting invites deadlock.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::lock::{FileLock, LockError};

/// Dynamic JSON document. Key order is preserved on round-trips.
pub type Document = serde_json::Value;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Store for JSON documents under a root directory
pub struct DocumentStore {
    root: PathBuf,
    lock_timeout: Duration,
    lock_stale_after: Duration,
    lock_retry_interval: Duration,
}

impl DocumentStore {
    /// Default wait for a contended document lock
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout: Self::DEFAULT_LOCK_TIMEOUT,
            lock_stale_after: FileLock::DEFAULT_STALE_AFTER,
            lock_retry_interval: FileLock::DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Overrides the lock tunables (timeout, staleness, retry interval)
    pub fn with_lock_settings(
        mut self,
        timeout: Duration,
        stale_after: Duration,
        retry_interval: Duration,
    ) -> Self {
        self.lock_timeout = timeout;
        self.lock_stale_after = stale_after;
        self.lock_retry_interval = retry_interval;
        self
    }

    /// Returns the storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a document name to its absolute path
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Builds the lock guarding a document
    pub fn lock_for(&self, name: &str) -> FileLock {
        FileLock::with_params(
            self.path_for(name),
            self.lock_stale_after,
            self.lock_retry_interval,
        )
    }

    /// Returns true if the document exists on disk
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    /// Reads and deserializes a document, without locking
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<T, StoreError> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(StoreError::NotFound(path));
        }

        let body = fs::read_to_string(&path)?;
        serde_json::from_str(&body).map_err(|source| StoreError::Parse { path, source })
    }

    /// Serializes and writes a document directly, without locking.
    ///
    /// A crash mid-write can leave a partial file; use
    /// [`atomic_write`](Self::atomic_write) where that matters.
    pub fn write<T: Serialize>(&self, name: &str, doc: &T) -> Result<(), StoreError> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, to_json(doc)?)?;
        Ok(())
    }

    /// Reads a document under its lock, so the read never observes a
    /// concurrent writer's partial output
    pub fn safe_read<T: DeserializeOwned>(&self, name: &str) -> Result<T, StoreError> {
        let mut lock = self.lock_for(name);
        lock.acquire(self.lock_timeout)?;

        let result = self.read(name);
        let released = lock.release();

        let doc = result?;
        released?;
        Ok(doc)
    }

    /// Writes a document atomically: serialize to a temp file in the same
    /// directory, flush it to storage, then rename over the target.
    ///
    /// The rename is the atomicity boundary. Readers see either the previous
    /// or the new document regardless of crash timing, and a failed write
    /// never leaves the target partially written.
    pub fn atomic_write<T: Serialize>(&self, name: &str, doc: &T) -> Result<(), StoreError> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Unique per process so concurrent writers never share a temp file
        let temp_path = {
            let mut os = path.as_os_str().to_os_string();
            os.push(format!(".{}.tmp", std::process::id()));
            PathBuf::from(os)
        };

        let body = to_json(doc)?;
        let written = write_and_sync(&temp_path, &body).and_then(|_| fs::rename(&temp_path, &path));

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Locked read-modify-write on one document.
    ///
    /// Acquires the document lock, reads the current contents (or `default`
    /// when the file does not exist yet), applies `updater`, atomically
    /// writes the result and releases the lock on every exit path. Parse
    /// failures still propagate; only absence falls back to the default.
    ///
    /// Returns the updated document. If lock acquisition times out, the
    /// operation fails without touching the file.
    pub fn transactional_update<T, F>(
        &self,
        name: &str,
        default: T,
        updater: F,
    ) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let mut lock = self.lock_for(name);
        lock.acquire(self.lock_timeout)?;

        let outcome: Result<T, StoreError> = (|| {
            let current = match self.read(name) {
                Ok(doc) => doc,
                Err(StoreError::NotFound(_)) => default,
                Err(e) => return Err(e),
            };
            let updated = updater(current);
            self.atomic_write(name, &updated)?;
            Ok(updated)
        })();

        let released = lock.release();
        let updated = outcome?;
        released?;
        Ok(updated)
    }

    /// Removes a document. Returns false if it did not exist.
    pub fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists document names (relative paths of `.json` files) under the root
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        if self.root.is_dir() {
            collect_documents(&self.root, &self.root, &mut names)?;
        }
        names.sort();
        Ok(names)
    }
}

fn to_json<T: Serialize>(doc: &T) -> Result<String, StoreError> {
    let mut body = serde_json::to_string_pretty(doc).map_err(io::Error::from)?;
    body.push('\n');
    Ok(body)
}

fn write_and_sync(path: &Path, body: &str) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(body.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn collect_documents(root: &Path, dir: &Path, names: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_documents(root, &path, names)?;
        } else if path.extension().is_some_and(|e| e == "json") {
            if let Ok(relative) = path.strip_prefix(root) {
                names.push(relative.to_string_lossy().into_owned());
            }
        }
    }
    Ok(())
}
