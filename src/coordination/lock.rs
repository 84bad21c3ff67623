use crate::config::LockConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for lock {path} (held by {holder})")]
    Timeout {
        path: PathBuf,
        waited: Duration,
        holder: String,
    },

    #[error("gave up on lock {path} after {attempts} attempts (held by {holder})")]
    RetriesExhausted {
        path: PathBuf,
        attempts: u32,
        holder: String,
    },

    #[error("lock {path} is now held by {holder}, not by this process")]
    NotOwner { path: PathBuf, holder: String },

    #[error("lock I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LockError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        LockError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Contents of the lock marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub agent: String,
    pub acquired_at: DateTime<Utc>,
    pub token: String,
}

impl LockRecord {
    fn describe(record: Option<&LockRecord>) -> String {
        match record {
            Some(r) => format!("{} (pid {})", r.agent, r.pid),
            None => "unknown holder".to_string(),
        }
    }
}

/// Timing knobs for acquisition
#[derive(Debug, Clone)]
pub struct LockPolicy {
    pub stale_after: Duration,
    pub timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl LockPolicy {
    /// Backoff before retry number `attempt` (0-based): base * 2^attempt, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Short-lived policy for state-file transactions
    pub fn for_state_files() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(250),
            max_retries: 200,
        }
    }
}

impl From<&LockConfig> for LockPolicy {
    fn from(config: &LockConfig) -> Self {
        Self {
            stale_after: config.stale_after(),
            timeout: config.timeout(),
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            max_retries: config.max_retries,
        }
    }
}

/// Cross-process mutual exclusion through an exclusively-created marker file
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    policy: LockPolicy,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>, policy: LockPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current holder, if the marker exists and parses
    pub fn holder(&self) -> Option<LockRecord> {
        read_record(&self.path)
    }

    /// Acquire the lock for `agent`.
    ///
    /// Stale markers are evicted and retried at once without spending a
    /// retry; live markers cost one backoff step each.
    pub fn acquire(&self, agent: &str) -> Result<LockGuard, LockError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| LockError::io(parent, e))?;
        }

        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&self.path) {
                Ok(file) => return self.claim(file, agent, started),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(LockError::io(&self.path, e)),
            }

            if self.evict_if_stale()? {
                if started.elapsed() >= self.policy.timeout {
                    return Err(self.timeout_error(started));
                }
                continue;
            }

            if attempt >= self.policy.max_retries {
                return Err(LockError::RetriesExhausted {
                    path: self.path.clone(),
                    attempts: attempt,
                    holder: LockRecord::describe(self.holder().as_ref()),
                });
            }

            let delay = self.policy.backoff(attempt);
            if started.elapsed() + delay > self.policy.timeout {
                return Err(self.timeout_error(started));
            }

            debug!("Lock {} busy, retrying in {:?}", self.path.display(), delay);
            std::thread::sleep(delay);
            attempt += 1;
        }
    }

    /// Run `f` while holding the lock; the lock is released on every exit path
    pub fn with_lock<T>(&self, agent: &str, f: impl FnOnce(&LockGuard) -> T) -> Result<T, LockError> {
        let guard = self.acquire(agent)?;
        let value = f(&guard);
        guard.release()?;
        Ok(value)
    }

    fn claim(&self, mut file: File, agent: &str, started: Instant) -> Result<LockGuard, LockError> {
        let record = LockRecord {
            pid: std::process::id(),
            agent: agent.to_string(),
            acquired_at: Utc::now(),
            token: Uuid::new_v4().to_string(),
        };

        let written = serde_json::to_vec_pretty(&record)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))
            .and_then(|body| file.write_all(&body))
            .and_then(|_| file.sync_all());

        if let Err(e) = written {
            // The marker is ours but unreadable; do not leave it to go stale
            let _ = fs::remove_file(&self.path);
            return Err(LockError::io(&self.path, e));
        }

        debug!("Lock {} acquired by {} after {:?}", self.path.display(), agent, started.elapsed());
        Ok(LockGuard {
            path: self.path.clone(),
            token: record.token,
            agent: agent.to_string(),
            released: false,
        })
    }

    /// Remove the marker if it is older than the staleness threshold.
    ///
    /// The marker is first renamed to a private tombstone so two evicting
    /// processes cannot both delete it; if the tombstone turns out to be fresh
    /// (a new holder won the race), it is linked back into place.
    fn evict_if_stale(&self) -> Result<bool, LockError> {
        match marker_age(&self.path) {
            Some(age) if age > self.policy.stale_after => {}
            _ => return Ok(false),
        }

        let tombstone = self.path.with_file_name(format!(
            "{}.evict-{}-{}",
            self.path.file_name().and_then(|n| n.to_str()).unwrap_or("lock"),
            std::process::id(),
            Uuid::new_v4().simple()
        ));

        match fs::rename(&self.path, &tombstone) {
            Ok(()) => {}
            // Someone else evicted or released it first
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(LockError::io(&self.path, e)),
        }

        let still_stale = marker_age(&tombstone)
            .map(|age| age > self.policy.stale_after)
            .unwrap_or(true);

        if still_stale {
            let previous = read_record(&tombstone);
            info!(
                "Evicted stale lock {} held by {}",
                self.path.display(),
                LockRecord::describe(previous.as_ref())
            );
        } else if fs::hard_link(&tombstone, &self.path).is_err() {
            warn!("Lock {} changed hands during eviction", self.path.display());
        }

        let _ = fs::remove_file(&tombstone);
        Ok(true)
    }

    fn timeout_error(&self, started: Instant) -> LockError {
        LockError::Timeout {
            path: self.path.clone(),
            waited: started.elapsed(),
            holder: LockRecord::describe(self.holder().as_ref()),
        }
    }
}

/// Proof of lock ownership. Release requires the token written at acquisition,
/// so a process can never remove a marker it does not hold.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    token: String,
    agent: String,
    released: bool,
}

impl LockGuard {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// True while the marker on disk still carries this guard's token
    pub fn verify(&self) -> bool {
        read_record(&self.path)
            .map(|r| r.token == self.token)
            .unwrap_or(false)
    }

    /// Bump the marker's mtime so long batches are not mistaken for stale
    pub fn refresh(&self) -> Result<(), LockError> {
        if !self.verify() {
            return Err(self.not_owner());
        }
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| LockError::io(&self.path, e))?;
        file.set_modified(SystemTime::now())
            .map_err(|e| LockError::io(&self.path, e))
    }

    /// Release the lock. A marker that is already gone counts as released;
    /// a marker with another token is left untouched.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.release_inner()
    }

    fn release_inner(&self) -> Result<(), LockError> {
        match fs::read(&self.path) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Lock {} already gone at release", self.path.display());
                return Ok(());
            }
            Err(e) => return Err(LockError::io(&self.path, e)),
            Ok(bytes) => {
                let owned = serde_json::from_slice::<LockRecord>(&bytes)
                    .map(|r| r.token == self.token)
                    .unwrap_or(false);
                if !owned {
                    return Err(self.not_owner());
                }
            }
        }

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::io(&self.path, e)),
        }
    }

    fn not_owner(&self) -> LockError {
        LockError::NotOwner {
            path: self.path.clone(),
            holder: LockRecord::describe(read_record(&self.path).as_ref()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.release_inner() {
                warn!("Failed to release lock {}: {}", self.path.display(), e);
            }
        }
    }
}

fn read_record(path: &Path) -> Option<LockRecord> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Age of the marker by mtime; `None` if it does not exist
fn marker_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO))
}
