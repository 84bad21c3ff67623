use super::state_file::{JsonStateFile, StateError};
use crate::graph::ModuleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whether a run was allowed to move files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    DryRun,
    Live,
}

impl RunMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            RunMode::DryRun
        } else {
            RunMode::Live
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, RunMode::DryRun)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::DryRun => "dry-run",
            RunMode::Live => "live",
        }
    }
}

/// Counters shared by agent and coordinator reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub scanned: usize,
    pub entry_points: usize,
    pub candidates: usize,
    pub moved: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub warnings: usize,
    /// Size of the moved files, or of the files a dry run would move
    #[serde(default)]
    pub bytes_moved: u64,
}

impl RunCounts {
    pub fn add(&mut self, other: &RunCounts) {
        self.scanned += other.scanned;
        self.entry_points += other.entry_points;
        self.candidates += other.candidates;
        self.moved += other.moved;
        self.skipped += other.skipped;
        self.conflicts += other.conflicts;
        self.warnings += other.warnings;
        self.bytes_moved += other.bytes_moved;
    }
}

/// One line of the cleanup log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupLogEntry {
    pub agent: String,
    pub timestamp: DateTime<Utc>,
    pub mode: RunMode,
    #[serde(default)]
    pub force: bool,
    pub counts: RunCounts,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

/// One reversible move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPair {
    /// Quarantine location, relative to the project root
    pub from: String,
    /// Original location
    pub to: ModuleId,
    #[serde(default)]
    pub size_bytes: u64,
}

/// Everything needed to undo one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub session: String,
    pub agent: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<RollbackPair>,
}

/// Append-only log of agent and coordinator runs
#[derive(Debug, Clone)]
pub struct CleanupLog {
    file: JsonStateFile<Vec<CleanupLogEntry>>,
}

impl CleanupLog {
    pub const FILE_NAME: &'static str = "cleanup-log.json";

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            file: JsonStateFile::new(dir.join(Self::FILE_NAME)),
        }
    }

    pub fn append(&self, entry: CleanupLogEntry) -> Result<(), StateError> {
        let owner = entry.agent.clone();
        self.file.transact(&owner, |entries| entries.push(entry))
    }

    pub fn entries(&self) -> Vec<CleanupLogEntry> {
        self.file.read()
    }

    pub fn ensure_exists(&self) -> Result<bool, StateError> {
        self.file.ensure_exists()
    }
}

/// Append-only log of reversible runs
#[derive(Debug, Clone)]
pub struct RollbackLog {
    file: JsonStateFile<Vec<RollbackRecord>>,
}

impl RollbackLog {
    pub const FILE_NAME: &'static str = "rollback-commands.json";

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            file: JsonStateFile::new(dir.join(Self::FILE_NAME)),
        }
    }

    pub fn append(&self, record: RollbackRecord) -> Result<(), StateError> {
        let owner = record.agent.clone();
        self.file.transact(&owner, |records| records.push(record))
    }

    pub fn records(&self) -> Vec<RollbackRecord> {
        self.file.read()
    }

    pub fn find(&self, session: &str) -> Option<RollbackRecord> {
        self.records().into_iter().find(|r| r.session == session)
    }

    pub fn ensure_exists(&self) -> Result<bool, StateError> {
        self.file.ensure_exists()
    }
}
