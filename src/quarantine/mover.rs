use super::record::{hash_bytes, QuarantineRecord};
use super::{move_file, relative_string, QuarantineError};
use crate::coordination::{LockGuard, RollbackPair, RollbackRecord, Workspace};
use crate::graph::ModuleId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One timestamped quarantine directory for one agent run
#[derive(Debug, Clone, Serialize)]
pub struct QuarantineSession {
    pub id: String,
    pub agent: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    dir: PathBuf,
}

impl QuarantineSession {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Session directory name for a start time
    pub fn stamp(at: &DateTime<Utc>) -> String {
        at.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
    }
}

/// Result of one locked batch
#[derive(Debug, Default)]
pub struct MoveBatch {
    pub records: Vec<QuarantineRecord>,
    pub warnings: Vec<String>,
    /// Files not attempted because lock ownership was lost
    pub abandoned: Vec<ModuleId>,
}

impl MoveBatch {
    pub fn moved(&self) -> Vec<ModuleId> {
        self.records.iter().map(|r| r.original_path.clone()).collect()
    }

    pub fn rollback_record(&self, session: &QuarantineSession) -> RollbackRecord {
        RollbackRecord {
            session: session.id.clone(),
            agent: session.agent.clone(),
            created_at: session.created_at,
            files: self
                .records
                .iter()
                .map(|r| RollbackPair {
                    from: r.quarantine_path.clone(),
                    to: r.original_path.clone(),
                    size_bytes: r.size_bytes,
                })
                .collect(),
        }
    }
}

/// Moves cleared candidates into the agent's quarantine area
pub struct QuarantineMover<'a> {
    workspace: &'a Workspace,
    agent: &'a str,
}

impl<'a> QuarantineMover<'a> {
    pub fn new(workspace: &'a Workspace, agent: &'a str) -> Self {
        Self { workspace, agent }
    }

    /// Create `<quarantine root>/<agent>/<timestamp>/`
    pub fn begin_session(&self, now: DateTime<Utc>) -> Result<QuarantineSession, QuarantineError> {
        let base = self.workspace.agent_quarantine_dir(self.agent);
        let stamp = QuarantineSession::stamp(&now);

        // Two runs inside the same millisecond get a numeric suffix
        let mut name = stamp.clone();
        let mut n = 1;
        while base.join(&name).exists() {
            name = format!("{}-{}", stamp, n);
            n += 1;
        }

        let dir = base.join(&name);
        std::fs::create_dir_all(&dir).map_err(|source| QuarantineError::SessionDir {
            path: dir.clone(),
            source,
        })?;

        info!("Quarantine session {}", dir.display());
        Ok(QuarantineSession {
            id: format!("{}-{}", self.agent, name),
            agent: self.agent.to_string(),
            created_at: now,
            dir,
        })
    }

    /// Move every file in `files`, holding `guard` for the whole batch
    pub fn move_batch(&self, guard: &LockGuard, session: &QuarantineSession, files: &[ModuleId]) -> MoveBatch {
        let mut batch = MoveBatch::default();

        for (i, file) in files.iter().enumerate() {
            if let Err(e) = guard.refresh() {
                warn!("Lost quarantine lock, abandoning {} files: {}", files.len() - i, e);
                for rest in &files[i..] {
                    batch.warnings.push(format!("{}: not moved, lock ownership lost", rest));
                    batch.abandoned.push(rest.clone());
                }
                break;
            }

            match self.move_one(session, file) {
                Ok(record) => {
                    debug!("Moved {} -> {}", file, record.quarantine_path);
                    batch.records.push(record);
                }
                Err(e) => {
                    warn!("Failed to quarantine {}: {}", file, e);
                    batch.warnings.push(format!("{}: {}", file, e));
                }
            }
        }

        batch
    }

    fn move_one(&self, session: &QuarantineSession, file: &ModuleId) -> Result<QuarantineRecord, QuarantineError> {
        let root = self.workspace.root();
        let original = file.to_path(root);
        let bytes = std::fs::read(&original).map_err(|source| QuarantineError::Read {
            path: original.clone(),
            source,
        })?;

        let destination = session.dir.join(file.as_str());
        let record = QuarantineRecord {
            original_path: file.clone(),
            quarantine_path: relative_string(root, &destination),
            content_hash: hash_bytes(&bytes),
            size_bytes: bytes.len() as u64,
            moved_at: Utc::now(),
            agent: self.agent.to_string(),
        };

        // Sidecar first so a moved file never lacks one
        let sidecar = record.write_sidecar(root)?;
        if let Err(e) = move_file(&original, &destination) {
            let _ = std::fs::remove_file(&sidecar);
            return Err(e);
        }

        Ok(record)
    }
}
