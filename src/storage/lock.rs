//! Sentinel-file locking for cross-process mutual exclusion
//!
//! Every request to the site runs in its own short-lived process, so the
//! only coordination channel between writers is the filesystem itself. A
//! lock on a document is a sentinel file at `<target>.lock` whose JSON body
//! records the owner's pid, acquisition time and hostname. Claiming the
//! sentinel uses `create_new` (`O_CREAT | O_EXCL`), never a check-then-create
//! pair, so two racing acquirers can never both succeed.
//!
//! A lock left behind by a crashed process is recovered through staleness
//! detection only: a record is considered abandoned once it is older than
//! the stale threshold, or when it belongs to this host and its pid is no
//! longer running. Pid liveness cannot be checked across hosts, so only the
//! age test applies when hostnames differ.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Timed out after {timeout:?} waiting for lock on {path}")]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("Lock on {0} is not held by this process")]
    NotHeld(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// On-disk body of a sentinel file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub timestamp: u64,
    pub hostname: String,
}

impl LockRecord {
    /// Builds a record identifying the calling process
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            timestamp: unix_now(),
            hostname: local_hostname(),
        }
    }

    /// Returns true if this record was written by the calling process
    fn is_ours(&self) -> bool {
        self.pid == std::process::id() && self.hostname == local_hostname()
    }

    /// Age of the record in seconds
    pub fn age_secs(&self) -> u64 {
        unix_now().saturating_sub(self.timestamp)
    }

    /// Returns true if the record is eligible for reclamation
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        if self.age_secs() > stale_after.as_secs() {
            return true;
        }
        self.hostname == local_hostname() && !pid_alive(self.pid)
    }
}

/// Outcome of a single claim attempt
enum Claim {
    Acquired,
    Busy,
    Reclaimed,
}

/// Mutual exclusion over a target path, mediated by a `.lock` sentinel
pub struct FileLock {
    target: PathBuf,
    lock_path: PathBuf,
    stale_after: Duration,
    retry_interval: Duration,
    held: bool,
}

impl FileLock {
    /// Age after which a lock record is considered abandoned
    pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

    /// Sleep between acquisition retries under contention
    pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

    /// Creates a lock for the given target path with default tunables
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self::with_params(
            target,
            Self::DEFAULT_STALE_AFTER,
            Self::DEFAULT_RETRY_INTERVAL,
        )
    }

    /// Creates a lock with explicit staleness and retry tunables
    pub fn with_params(
        target: impl Into<PathBuf>,
        stale_after: Duration,
        retry_interval: Duration,
    ) -> Self {
        let target = target.into();
        let lock_path = Self::lock_path_for(&target);
        Self {
            target,
            lock_path,
            stale_after,
            retry_interval,
            held: false,
        }
    }

    /// Returns the sentinel path for a target (`<target>.lock`)
    pub fn lock_path_for(target: &Path) -> PathBuf {
        let mut os = target.as_os_str().to_os_string();
        os.push(".lock");
        PathBuf::from(os)
    }

    /// Returns the sentinel file path
    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Returns the locked target path
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Acquires the lock, retrying until `timeout` elapses.
    ///
    /// Contention is an expected condition: exceeding the timeout returns
    /// [`LockError::Timeout`] and callers decide whether to retry.
    pub fn acquire(&mut self, timeout: Duration) -> Result<(), LockError> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.try_claim()? {
                Claim::Acquired => {
                    self.held = true;
                    return Ok(());
                }
                // A stale record was removed; contend again immediately
                Claim::Reclaimed => continue,
                Claim::Busy => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    path: self.target.clone(),
                    timeout,
                });
            }
            thread::sleep(self.retry_interval.min(deadline - now));
        }
    }

    /// One claim attempt via exclusive create
    fn try_claim(&self) -> Result<Claim, LockError> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
        {
            Ok(mut file) => {
                let body = serde_json::to_string(&LockRecord::current())
                    .map_err(io::Error::from)?;
                file.write_all(body.as_bytes())?;
                file.sync_all()?;
                Ok(Claim::Acquired)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                match self.read_record() {
                    Some(record) if !record.is_stale(self.stale_after) => Ok(Claim::Busy),
                    // Stale or unreadable record. Remove it and go back
                    // through create_new, so a competitor reclaiming at the
                    // same moment still ends up with exactly one winner.
                    _ => {
                        match fs::remove_file(&self.lock_path) {
                            Ok(()) => {}
                            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                            Err(e) => return Err(e.into()),
                        }
                        Ok(Claim::Reclaimed)
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Releases the lock if this process still owns it.
    ///
    /// Releasing a lock that was never acquired, or that a competitor has
    /// already reclaimed, is a reported [`LockError::NotHeld`] failure and
    /// does not touch the sentinel.
    pub fn release(&mut self) -> Result<(), LockError> {
        match self.read_record() {
            Some(record) if record.is_ours() => {
                fs::remove_file(&self.lock_path)?;
                self.held = false;
                Ok(())
            }
            _ => {
                self.held = false;
                Err(LockError::NotHeld(self.target.clone()))
            }
        }
    }

    /// Reports whether a live lock exists for the target.
    ///
    /// A stale record discovered here is deleted opportunistically and
    /// reported as unlocked.
    pub fn is_locked(&self) -> bool {
        if !self.lock_path.exists() {
            return false;
        }
        match self.read_record() {
            Some(record) if !record.is_stale(self.stale_after) => true,
            _ => {
                let _ = fs::remove_file(&self.lock_path);
                false
            }
        }
    }

    /// Returns the current holder's record, if the sentinel exists and parses
    pub fn holder(&self) -> Option<LockRecord> {
        self.read_record()
    }

    /// Unconditionally removes the sentinel. Administrative escape hatch;
    /// normal recovery goes through staleness detection in `acquire`.
    pub fn break_lock(&self) -> Result<bool, LockError> {
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read_record(&self) -> Option<LockRecord> {
        let body = fs::read_to_string(&self.lock_path).ok()?;
        serde_json::from_str(&body).ok()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if self.held {
            let _ = self.release();
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// Signal 0 performs error checking only, without delivering a signal
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// No portable liveness probe; the age threshold alone applies
#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target(dir: &TempDir) -> PathBuf {
        dir.path().join("doc.json")
    }

    #[test]
    fn acquire_creates_sentinel() {
        let dir = TempDir::new().unwrap();
        let mut lock = FileLock::new(target(&dir));

        lock.acquire(Duration::from_secs(1)).unwrap();

        assert!(lock.path().exists());
        let record = lock.holder().unwrap();
        assert_eq!(record.pid, std::process::id());

        lock.release().unwrap();
        assert!(!lock.path().exists());
    }

    #[test]
    fn second_acquire_times_out() {
        let dir = TempDir::new().unwrap();
        let mut first = FileLock::new(target(&dir));
        let mut second = FileLock::new(target(&dir));

        first.acquire(Duration::from_secs(1)).unwrap();

        let started = Instant::now();
        let err = second.acquire(Duration::from_secs(1)).unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, LockError::Timeout { .. }));
        assert!(elapsed < Duration::from_secs(2));

        first.release().unwrap();
    }

    #[test]
    fn acquire_succeeds_after_release() {
        let dir = TempDir::new().unwrap();
        let mut first = FileLock::new(target(&dir));
        let mut second = FileLock::new(target(&dir));

        first.acquire(Duration::from_secs(1)).unwrap();
        first.release().unwrap();

        second.acquire(Duration::from_secs(1)).unwrap();
        second.release().unwrap();
    }

    #[test]
    fn old_record_is_stale_and_removed() {
        let dir = TempDir::new().unwrap();
        let lock = FileLock::new(target(&dir));

        // 400 seconds old, well past the 300s threshold
        let record = LockRecord {
            pid: std::process::id(),
            timestamp: unix_now() - 400,
            hostname: local_hostname(),
        };
        fs::write(lock.path(), serde_json::to_string(&record).unwrap()).unwrap();

        assert!(!lock.is_locked());
        assert!(!lock.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn dead_pid_on_this_host_is_stale() {
        let dir = TempDir::new().unwrap();
        let mut lock = FileLock::new(target(&dir));

        // A just-reaped child pid is as good as a crashed lock holder
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();

        let record = LockRecord {
            pid: dead_pid,
            timestamp: unix_now(),
            hostname: local_hostname(),
        };
        fs::write(lock.path(), serde_json::to_string(&record).unwrap()).unwrap();

        // Reclaimed without waiting for the age threshold
        lock.acquire(Duration::from_secs(1)).unwrap();
        assert_eq!(lock.holder().unwrap().pid, std::process::id());
        lock.release().unwrap();
    }

    #[test]
    fn fresh_foreign_record_is_honored_by_age_across_hosts() {
        let dir = TempDir::new().unwrap();
        let lock = FileLock::new(target(&dir));

        // Different hostname: pid liveness is unknowable, only age counts
        let record = LockRecord {
            pid: 1,
            timestamp: unix_now(),
            hostname: "some-other-host".to_string(),
        };
        fs::write(lock.path(), serde_json::to_string(&record).unwrap()).unwrap();

        assert!(lock.is_locked());
        assert!(lock.path().exists());
    }

    #[test]
    fn release_without_hold_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut lock = FileLock::new(target(&dir));

        let err = lock.release().unwrap_err();
        assert!(matches!(err, LockError::NotHeld(_)));
    }

    #[test]
    fn release_after_reclaim_does_not_delete_foreign_record() {
        let dir = TempDir::new().unwrap();
        let mut lock = FileLock::new(target(&dir));
        lock.acquire(Duration::from_secs(1)).unwrap();

        // A competitor reclaimed the lock and wrote its own record
        let foreign = LockRecord {
            pid: std::process::id().wrapping_add(1),
            timestamp: unix_now(),
            hostname: local_hostname(),
        };
        fs::write(lock.path(), serde_json::to_string(&foreign).unwrap()).unwrap();

        let err = lock.release().unwrap_err();
        assert!(matches!(err, LockError::NotHeld(_)));
        assert!(lock.path().exists());

        fs::remove_file(lock.path()).unwrap();
    }

    #[test]
    fn unreadable_record_is_treated_as_stale() {
        let dir = TempDir::new().unwrap();
        let lock = FileLock::new(target(&dir));

        fs::write(lock.path(), "not json at all").unwrap();

        assert!(!lock.is_locked());
        assert!(!lock.path().exists());
    }

    #[test]
    fn break_lock_removes_any_sentinel() {
        let dir = TempDir::new().unwrap();
        let mut other = FileLock::new(target(&dir));
        other.acquire(Duration::from_secs(1)).unwrap();
        // Forget the hold so Drop does not release it
        other.held = false;

        let lock = FileLock::new(target(&dir));
        assert!(lock.break_lock().unwrap());
        assert!(!lock.path().exists());
        assert!(!lock.break_lock().unwrap());
    }
}
