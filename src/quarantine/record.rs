use super::{move_file, QuarantineError};
use crate::coordination::write_json_atomic;
use crate::graph::ModuleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lowercase hex SHA-256 of `bytes`
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Where a file went and what it looked like when it left
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub original_path: ModuleId,
    /// Relative to the project root
    pub quarantine_path: String,
    pub content_hash: String,
    pub size_bytes: u64,
    pub moved_at: DateTime<Utc>,
    pub agent: String,
}

impl QuarantineRecord {
    pub const SIDECAR_SUFFIX: &'static str = ".metadata.json";

    pub fn sidecar_for(quarantined: &Path) -> PathBuf {
        let mut name = quarantined.as_os_str().to_owned();
        name.push(Self::SIDECAR_SUFFIX);
        PathBuf::from(name)
    }

    pub fn is_sidecar(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(Self::SIDECAR_SUFFIX))
            .unwrap_or(false)
    }

    pub fn quarantined_location(&self, root: &Path) -> PathBuf {
        root.join(&self.quarantine_path)
    }

    pub fn write_sidecar(&self, root: &Path) -> Result<PathBuf, QuarantineError> {
        let path = Self::sidecar_for(&self.quarantined_location(root));
        write_json_atomic(&path, self)?;
        Ok(path)
    }

    pub fn read_sidecar(path: &Path) -> Result<Self, QuarantineError> {
        let bytes = std::fs::read(path).map_err(|source| QuarantineError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| QuarantineError::Sidecar {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Put the file back where it came from.
    ///
    /// Fails without touching anything if the original location is occupied
    /// or the quarantined bytes no longer match the recorded hash.
    pub fn restore(&self, root: &Path) -> Result<(), QuarantineError> {
        let quarantined = self.quarantined_location(root);
        let original = self.original_path.to_path(root);

        if original.exists() {
            return Err(QuarantineError::OriginalExists(original));
        }

        let bytes = match std::fs::read(&quarantined) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(QuarantineError::MissingQuarantined(quarantined))
            }
            Err(source) => {
                return Err(QuarantineError::Read {
                    path: quarantined,
                    source,
                })
            }
        };

        let actual = hash_bytes(&bytes);
        if actual != self.content_hash {
            return Err(QuarantineError::HashMismatch {
                path: quarantined,
                expected: self.content_hash.clone(),
                actual,
            });
        }

        move_file(&quarantined, &original)?;

        let sidecar = Self::sidecar_for(&quarantined);
        if let Err(e) = std::fs::remove_file(&sidecar) {
            if e.kind() != ErrorKind::NotFound {
                debug!("Could not remove {}: {}", sidecar.display(), e);
            }
        }
        Ok(())
    }
}
