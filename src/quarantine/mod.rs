// Quarantine - reversible relocation of dead files

mod mover;
mod record;
mod rollback;

pub use mover::{MoveBatch, QuarantineMover, QuarantineSession};
pub use record::{hash_bytes, QuarantineRecord};
pub use rollback::{RestoreOutcome, RollbackScript, SessionRestorer};

use crate::coordination::StateError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuarantineError {
    #[error("cannot create quarantine directory {path}: {source}")]
    SessionDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid metadata sidecar {path}: {source}")]
    Sidecar {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("content of {path} changed since quarantine (expected {expected}, found {actual})")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("refusing to overwrite existing file {0}")]
    OriginalExists(PathBuf),

    #[error("quarantined file {0} is missing")]
    MissingQuarantined(PathBuf),

    #[error("no rollback session named '{0}'")]
    SessionNotFound(String),

    #[error("cannot write rollback script {path}: {source}")]
    Script {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    State(#[from] StateError),
}

/// Move `from` to `to`, copying then removing when a rename is not possible
/// (different filesystems)
pub(crate) fn move_file(from: &Path, to: &Path) -> Result<(), QuarantineError> {
    let err = |source| QuarantineError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(err)?;
    }

    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }

    std::fs::copy(from, to).map_err(err)?;
    if let Err(e) = std::fs::remove_file(from) {
        let _ = std::fs::remove_file(to);
        return Err(err(e));
    }
    Ok(())
}

/// Project-relative, `/`-separated form of `path`
pub(crate) fn relative_string(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
