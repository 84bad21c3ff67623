use super::state_file::{JsonStateFile, StateError};
use crate::graph::ModuleId;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const USAGE_MAP_VERSION: &str = "1.0.0";

/// Outcome of an agent's last run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed,
}

/// What an agent last did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub timestamp: DateTime<Utc>,
    pub outcome: RunOutcome,
    #[serde(default)]
    pub moved_files: Vec<ModuleId>,
    pub pid: u32,
}

/// How an agent relates to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStatus {
    /// The agent's scope imports the file
    Referenced,
    /// The agent moved the file into quarantine
    Moved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReference {
    pub agent: String,
    pub status: ReferenceStatus,
    pub timestamp: DateTime<Utc>,
}

/// Cross-agent coordination state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMap {
    pub version: String,

    /// Incremented on every committed transaction
    #[serde(default)]
    pub revision: u64,

    #[serde(default)]
    pub agents: BTreeMap<String, AgentStatus>,

    #[serde(default)]
    pub file_references: BTreeMap<ModuleId, Vec<FileReference>>,

    pub last_updated: DateTime<Utc>,
}

impl Default for UsageMap {
    fn default() -> Self {
        Self {
            version: USAGE_MAP_VERSION.to_string(),
            revision: 0,
            agents: BTreeMap::new(),
            file_references: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

impl UsageMap {
    pub fn update_agent_status(
        &mut self,
        agent: &str,
        outcome: RunOutcome,
        moved_files: Vec<ModuleId>,
        now: DateTime<Utc>,
    ) {
        self.agents.insert(
            agent.to_string(),
            AgentStatus {
                timestamp: now,
                outcome,
                moved_files,
                pid: std::process::id(),
            },
        );
    }

    /// Record (or refresh) an agent's tag on a file
    pub fn add_file_reference(
        &mut self,
        file: &ModuleId,
        agent: &str,
        status: ReferenceStatus,
        now: DateTime<Utc>,
    ) {
        let refs = self.file_references.entry(file.clone()).or_default();
        refs.retain(|r| !(r.agent == agent && r.status == status));
        refs.push(FileReference {
            agent: agent.to_string(),
            status,
            timestamp: now,
        });
    }

    /// Drop an agent's tags on a file (all tags when `status` is `None`)
    pub fn remove_file_reference(&mut self, file: &ModuleId, agent: &str, status: Option<ReferenceStatus>) {
        if let Some(refs) = self.file_references.get_mut(file) {
            refs.retain(|r| !(r.agent == agent && status.map(|s| s == r.status).unwrap_or(true)));
            if refs.is_empty() {
                self.file_references.remove(file);
            }
        }
    }

    /// Drop every tag of one kind held by an agent
    pub fn clear_agent_references(&mut self, agent: &str, status: ReferenceStatus) {
        for refs in self.file_references.values_mut() {
            refs.retain(|r| !(r.agent == agent && r.status == status));
        }
        self.file_references.retain(|_, refs| !refs.is_empty());
    }

    /// Drop restored files from every moved list and `moved` tag
    pub fn forget_moved(&mut self, files: &[ModuleId]) {
        for status in self.agents.values_mut() {
            status.moved_files.retain(|f| !files.contains(f));
        }
        for file in files {
            if let Some(refs) = self.file_references.get_mut(file) {
                refs.retain(|r| r.status != ReferenceStatus::Moved);
                if refs.is_empty() {
                    self.file_references.remove(file);
                }
            }
        }
    }

    /// True if any agent other than `agent` tagged the file or moved it
    pub fn is_referenced_by_other_agents(&self, file: &ModuleId, agent: &str) -> bool {
        let tagged = self
            .file_references
            .get(file)
            .map(|refs| refs.iter().any(|r| r.agent != agent))
            .unwrap_or(false);

        tagged
            || self
                .agents
                .iter()
                .filter(|(name, _)| name.as_str() != agent)
                .any(|(_, status)| status.moved_files.contains(file))
    }

    /// Drop agent entries and file tags older than `retention`.
    /// Returns the number of removed entries.
    pub fn cleanup(&mut self, retention: ChronoDuration, now: DateTime<Utc>) -> usize {
        let cutoff = now - retention;
        let mut removed = 0;

        let before = self.agents.len();
        self.agents.retain(|_, status| status.timestamp >= cutoff);
        removed += before - self.agents.len();

        for refs in self.file_references.values_mut() {
            let before = refs.len();
            refs.retain(|r| r.timestamp >= cutoff);
            removed += before - refs.len();
        }
        self.file_references.retain(|_, refs| !refs.is_empty());

        removed
    }

    /// Every file any agent currently lists as moved
    pub fn moved_files(&self) -> Vec<&ModuleId> {
        let mut files: Vec<&ModuleId> = self.agents.values().flat_map(|s| s.moved_files.iter()).collect();
        files.sort();
        files.dedup();
        files
    }
}

/// The usage map on disk
#[derive(Debug, Clone)]
pub struct UsageMapStore {
    file: JsonStateFile<UsageMap>,
}

impl UsageMapStore {
    pub const FILE_NAME: &'static str = "usage-map.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonStateFile::new(path),
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Current state, or a fresh map if absent or corrupt
    pub fn read(&self) -> UsageMap {
        self.file.read()
    }

    /// Replace the whole state, stamping the update time
    pub fn write(&self, map: &mut UsageMap) -> Result<(), StateError> {
        map.last_updated = Utc::now();
        self.file.write(map)
    }

    /// Apply `f` under the state lock, bump the revision and persist
    pub fn transact<R>(&self, owner: &str, f: impl FnOnce(&mut UsageMap) -> R) -> Result<R, StateError> {
        self.file.transact(owner, |map| {
            let result = f(map);
            map.revision += 1;
            map.last_updated = Utc::now();
            debug!("Usage map revision {} by {}", map.revision, owner);
            result
        })
    }

    pub fn update_agent_status(
        &self,
        agent: &str,
        outcome: RunOutcome,
        moved_files: Vec<ModuleId>,
    ) -> Result<(), StateError> {
        self.transact(agent, |map| map.update_agent_status(agent, outcome, moved_files, Utc::now()))
    }

    pub fn add_file_reference(&self, file: &ModuleId, agent: &str, status: ReferenceStatus) -> Result<(), StateError> {
        self.transact(agent, |map| map.add_file_reference(file, agent, status, Utc::now()))
    }

    pub fn remove_file_reference(
        &self,
        file: &ModuleId,
        agent: &str,
        status: Option<ReferenceStatus>,
    ) -> Result<(), StateError> {
        self.transact(agent, |map| map.remove_file_reference(file, agent, status))
    }

    pub fn forget_moved(&self, owner: &str, files: &[ModuleId]) -> Result<(), StateError> {
        self.transact(owner, |map| map.forget_moved(files))
    }

    pub fn is_referenced_by_other_agents(&self, file: &ModuleId, agent: &str) -> bool {
        self.read().is_referenced_by_other_agents(file, agent)
    }

    /// Prune entries older than `retention_days`
    pub fn cleanup(&self, retention_days: u64) -> Result<usize, StateError> {
        let retention = ChronoDuration::days(retention_days as i64);
        self.transact("cleanup", |map| map.cleanup(retention, Utc::now()))
    }

    pub fn ensure_exists(&self) -> Result<bool, StateError> {
        self.file.ensure_exists()
    }
}
