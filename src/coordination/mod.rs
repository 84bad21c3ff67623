//! State shared between agents: the quarantine lock, the usage map and the
//! append-only run logs. Everything lives under one coordination directory
//! inside the project.

mod ledger;
mod lock;
mod state_file;
mod usage_map;

pub use ledger::{
    CleanupLog, CleanupLogEntry, RollbackLog, RollbackPair, RollbackRecord, RunCounts, RunMode,
};
pub use lock::{FileLock, LockError, LockGuard, LockPolicy, LockRecord};
pub use state_file::{write_json_atomic, JsonStateFile, StateError};
pub use usage_map::{
    AgentStatus, FileReference, ReferenceStatus, RunOutcome, UsageMap, UsageMapStore,
    USAGE_MAP_VERSION,
};

use crate::config::Config;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolved locations of every shared file for one project
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    coordination_dir: PathBuf,
    logs_dir: PathBuf,
}

impl Workspace {
    pub fn new(root: &Path, config: &Config) -> Self {
        Self {
            root: root.to_path_buf(),
            coordination_dir: root.join(&config.coordination.dir),
            logs_dir: root.join(&config.coordination.logs_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Quarantine root; also holds the lock and state files
    pub fn coordination_dir(&self) -> &Path {
        &self.coordination_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn lock_path(&self) -> PathBuf {
        self.coordination_dir.join(".lock")
    }

    pub fn agent_quarantine_dir(&self, agent: &str) -> PathBuf {
        self.coordination_dir.join(agent)
    }

    pub fn usage_map(&self) -> UsageMapStore {
        UsageMapStore::in_dir(&self.coordination_dir)
    }

    pub fn cleanup_log(&self) -> CleanupLog {
        CleanupLog::in_dir(&self.coordination_dir)
    }

    pub fn rollback_log(&self) -> RollbackLog {
        RollbackLog::in_dir(&self.coordination_dir)
    }

    /// Per-run agent report, overwritten each run
    pub fn agent_report_path(&self, agent: &str) -> PathBuf {
        self.logs_dir.join(format!("{}_cleanup.json", agent))
    }

    pub fn coordinator_report_path(&self) -> PathBuf {
        self.logs_dir.join("multi_agent_cleanup.json")
    }

    pub fn rollback_script_path(&self, session: &str) -> PathBuf {
        self.logs_dir.join(format!("rollback-{}.sh", session))
    }

    /// Scratch directory for structured agent results
    pub fn results_dir(&self) -> PathBuf {
        self.logs_dir.join(".results")
    }

    /// Create the quarantine root, one subdirectory per agent and default state files
    pub fn ensure_layout(&self, agents: &[String]) -> Result<(), StateError> {
        let mut dirs = vec![self.coordination_dir.clone(), self.logs_dir.clone(), self.results_dir()];
        dirs.extend(agents.iter().map(|a| self.agent_quarantine_dir(a)));

        for dir in dirs {
            std::fs::create_dir_all(&dir).map_err(|source| StateError::Write {
                path: dir.clone(),
                source,
            })?;
        }

        if self.usage_map().ensure_exists()? {
            debug!("Created {}", self.usage_map().path().display());
        }
        self.cleanup_log().ensure_exists()?;
        self.rollback_log().ensure_exists()?;
        Ok(())
    }
}
