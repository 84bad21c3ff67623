use crate::agent::AgentReport;
use crate::coordination::{RunCounts, RunMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How one agent fared under the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    pub agent: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<AgentReport>,
}

/// Unified report for a coordinated run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorReport {
    pub timestamp: DateTime<Utc>,
    pub mode: RunMode,
    pub force: bool,
    pub concurrent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub totals: RunCounts,
    pub agents: Vec<AgentRun>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_script: Option<PathBuf>,
    pub duration_ms: u64,
}

impl CoordinatorReport {
    pub fn all_succeeded(&self) -> bool {
        self.agents.iter().all(|a| a.success)
    }

    pub fn failed_agents(&self) -> Vec<&str> {
        self.agents
            .iter()
            .filter(|a| !a.success)
            .map(|a| a.agent.as_str())
            .collect()
    }
}
