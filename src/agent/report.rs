use crate::analysis::SkippedFile;
use crate::coordination::{RunCounts, RunMode};
use crate::graph::ModuleId;
use crate::quarantine::QuarantineRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured result of one agent run, written to the per-agent report and
/// handed to the coordinator through the result file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent: String,
    pub timestamp: DateTime<Utc>,
    pub mode: RunMode,
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub results: AgentResults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResults {
    pub counts: RunCounts,

    /// Unreachable, unprotected files before verification
    pub candidates: Vec<ModuleId>,

    /// Files that passed every check (moved, or would be in a dry run)
    pub cleared: Vec<ModuleId>,

    /// Files actually relocated; always empty in a dry run
    pub moved: Vec<ModuleId>,

    pub skipped: Vec<SkippedFile>,

    pub conflicts: Vec<ModuleId>,

    pub warnings: Vec<String>,

    #[serde(default)]
    pub quarantine: Vec<QuarantineRecord>,

    pub duration_ms: u64,
}

impl AgentReport {
    pub fn is_dry_run(&self) -> bool {
        self.mode.is_dry_run()
    }

    /// Skipped files grouped by reason wording, for summaries
    pub fn skipped_by_reason(&self) -> BTreeMap<&'static str, Vec<&SkippedFile>> {
        let mut groups: BTreeMap<&'static str, Vec<&SkippedFile>> = BTreeMap::new();
        for skipped in &self.results.skipped {
            groups.entry(skipped.reason.as_str()).or_default().push(skipped);
        }
        groups
    }
}
