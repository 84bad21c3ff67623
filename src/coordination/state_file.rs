use super::lock::{FileLock, LockError, LockPolicy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Write JSON via a temp file in the same directory, fsync, then rename,
/// so readers see either the old or the new document.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StateError> {
    let body = serde_json::to_vec_pretty(value).map_err(|source| StateError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &body).map_err(|source| StateError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn write_atomic(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("state");
    let tmp = parent.join(format!(
        ".{}.tmp-{}-{}",
        name,
        std::process::id(),
        Uuid::new_v4().simple()
    ));

    {
        let mut file = File::create(&tmp)?;
        file.write_all(body)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// A JSON document shared between processes.
///
/// Reads never fail: a missing or unparseable file yields `T::default()`.
/// Mutations go through [`JsonStateFile::transact`], which holds a dedicated
/// lock for the read-modify-write so concurrent writers cannot lose updates.
#[derive(Debug, Clone)]
pub struct JsonStateFile<T> {
    path: PathBuf,
    lock: FileLock,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStateFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("state");
        let lock_path = path.with_file_name(format!("{}.lock", name));
        Self {
            lock: FileLock::new(lock_path, LockPolicy::for_state_files()),
            path,
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> T {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    warn!("{} is corrupt, starting fresh: {}", self.path.display(), e);
                    T::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => T::default(),
            Err(e) => {
                warn!("Cannot read {}, starting fresh: {}", self.path.display(), e);
                T::default()
            }
        }
    }

    /// Overwrite the whole document
    pub fn write(&self, value: &T) -> Result<(), StateError> {
        write_json_atomic(&self.path, value)
    }

    /// Locked read-modify-write
    pub fn transact<R>(&self, owner: &str, f: impl FnOnce(&mut T) -> R) -> Result<R, StateError> {
        let guard = self.lock.acquire(owner)?;
        let mut value = self.read();
        let result = f(&mut value);
        self.write(&value)?;
        guard.release()?;
        Ok(result)
    }

    /// Create the file with default contents if it does not exist yet.
    /// Returns true if it was created.
    pub fn ensure_exists(&self) -> Result<bool, StateError> {
        if self.path.exists() {
            return Ok(false);
        }
        self.transact("init", |_| ())?;
        Ok(true)
    }
}
