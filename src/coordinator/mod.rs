//! Multi-agent coordination.
//!
//! The coordinator prepares the shared quarantine layout, launches each agent
//! through an [`AgentLauncher`] (sequentially or all at once), collects the
//! structured result every agent writes to its `--result-file`, and publishes
//! a unified report, usage-map entry and rollback script.

mod launcher;
mod report;

pub use launcher::{AgentLauncher, LaunchOutcome, LaunchRequest, ProcessLauncher};
pub use report::{AgentRun, CoordinatorReport};

use crate::agent::AgentReport;
use crate::config::Config;
use crate::coordination::{
    write_json_atomic, CleanupLogEntry, RollbackPair, RollbackRecord, RunCounts, RunMode,
    RunOutcome, StateError, Workspace,
};
use crate::graph::ModuleId;
use crate::quarantine::{QuarantineError, QuarantineSession, RollbackScript};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Usage-map entry name for the coordinator itself
pub const COORDINATOR_AGENT: &str = "coordinator";

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("unknown agent '{0}' (no profile configured)")]
    UnknownAgent(String),

    #[error("no agents selected")]
    NoAgents,

    #[error("failed to launch agent {agent}: {source}")]
    Launch {
        agent: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Quarantine(#[from] QuarantineError),
}

#[derive(Debug, Clone, Default)]
pub struct CoordinatorOptions {
    pub agents: Vec<String>,
    pub concurrent: bool,
    pub dry_run: bool,
    pub force: bool,
}

pub struct Coordinator<'a> {
    config: &'a Config,
    workspace: Workspace,
    launcher: &'a dyn AgentLauncher,
    options: CoordinatorOptions,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        root: &Path,
        config: &'a Config,
        launcher: &'a dyn AgentLauncher,
        options: CoordinatorOptions,
    ) -> Result<Self, CoordinatorError> {
        if options.agents.is_empty() {
            return Err(CoordinatorError::NoAgents);
        }
        if let Some(unknown) = options.agents.iter().find(|a| config.agent(a).is_none()) {
            return Err(CoordinatorError::UnknownAgent(unknown.clone()));
        }

        Ok(Self {
            config,
            workspace: Workspace::new(root, config),
            launcher,
            options,
        })
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn run(&self) -> Result<CoordinatorReport, CoordinatorError> {
        let started = Instant::now();
        let now = Utc::now();
        let mode = RunMode::from_dry_run(self.options.dry_run);
        let mut warnings = Vec::new();

        // Step 1: Shared layout and housekeeping
        if mode.is_dry_run() {
            std::fs::create_dir_all(self.workspace.results_dir()).map_err(|source| StateError::Write {
                path: self.workspace.results_dir(),
                source,
            })?;
        } else {
            self.workspace.ensure_layout(&self.options.agents)?;
            match self.workspace.usage_map().cleanup(self.config.usage_map.retention_days) {
                Ok(0) => {}
                Ok(n) => info!("Pruned {} stale usage-map entries", n),
                Err(e) => {
                    warn!("Usage map cleanup failed: {}", e);
                    warnings.push(format!("usage map cleanup: {}", e));
                }
            }
        }

        // Step 2: Launch agents
        let run_id = Uuid::new_v4().simple().to_string();
        let run_id = run_id.as_str();
        let runs: Vec<AgentRun> = if self.options.concurrent {
            info!("Launching {} agents concurrently", self.options.agents.len());
            std::thread::scope(|scope| {
                let handles: Vec<_> = self
                    .options
                    .agents
                    .iter()
                    .map(|agent| (agent, scope.spawn(move || self.run_agent(agent, run_id))))
                    .collect();
                handles
                    .into_iter()
                    .map(|(agent, handle)| handle.join().unwrap_or_else(|_| failed_run(agent, "agent thread panicked", 0)))
                    .collect()
            })
        } else {
            self.options
                .agents
                .iter()
                .map(|agent| self.run_agent(agent, run_id))
                .collect()
        };

        // Step 3: Aggregate
        let mut totals = RunCounts::default();
        let mut moved: Vec<ModuleId> = Vec::new();
        let mut pairs: Vec<RollbackPair> = Vec::new();
        for report in runs.iter().filter(|r| r.success).filter_map(|r| r.report.as_ref()) {
            totals.add(&report.results.counts);
            moved.extend(report.results.moved.iter().cloned());
            pairs.extend(report.results.quarantine.iter().map(|q| RollbackPair {
                from: q.quarantine_path.clone(),
                to: q.original_path.clone(),
                size_bytes: q.size_bytes,
            }));
        }
        moved.sort();
        moved.dedup();

        for run in runs.iter().filter(|r| !r.success) {
            warn!("Agent {} failed: {}", run.agent, run.error.as_deref().unwrap_or("unknown error"));
        }

        // Step 4: Shared state and rollback script
        let mut session = None;
        let mut rollback_script = None;
        if !mode.is_dry_run() {
            let outcome = if runs.iter().all(|r| r.success) {
                RunOutcome::Completed
            } else {
                RunOutcome::Failed
            };
            if let Err(e) = self.workspace.usage_map().update_agent_status(COORDINATOR_AGENT, outcome, moved.clone()) {
                warn!("Could not update usage map: {}", e);
                warnings.push(format!("usage map: {}", e));
            }

            if !pairs.is_empty() {
                let id = format!("{}-{}", COORDINATOR_AGENT, QuarantineSession::stamp(&now));
                match self.write_rollback(&id, now, pairs) {
                    Ok(path) => rollback_script = Some(path),
                    Err(e) => {
                        warn!("Could not record rollback for {}: {}", id, e);
                        warnings.push(format!("rollback: {}", e));
                    }
                }
                session = Some(id);
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        totals.warnings += warnings.len();

        if !mode.is_dry_run() {
            let entry = CleanupLogEntry {
                agent: COORDINATOR_AGENT.to_string(),
                timestamp: now,
                mode,
                force: self.options.force,
                counts: totals,
                duration_ms,
                session: session.clone(),
            };
            if let Err(e) = self.workspace.cleanup_log().append(entry) {
                warn!("Could not append to cleanup log: {}", e);
            }
        }

        let report = CoordinatorReport {
            timestamp: now,
            mode,
            force: self.options.force,
            concurrent: self.options.concurrent,
            session,
            totals,
            agents: runs,
            warnings,
            rollback_script,
            duration_ms,
        };

        // Step 5: Unified report
        let path = self.workspace.coordinator_report_path();
        if let Err(e) = write_json_atomic(&path, &report) {
            warn!("Could not write {}: {}", path.display(), e);
        }

        Ok(report)
    }

    /// Launch one agent and read back its result; never fails the whole run
    fn run_agent(&self, agent: &str, run_id: &str) -> AgentRun {
        let started = Instant::now();
        let result_file = self.workspace.results_dir().join(format!("{}-{}.json", agent, run_id));
        let request = LaunchRequest {
            agent: agent.to_string(),
            result_file: result_file.clone(),
            dry_run: self.options.dry_run,
            force: self.options.force,
        };

        info!("Running agent {}", agent);
        let launched = self.launcher.launch(&request);
        let elapsed = started.elapsed().as_millis() as u64;

        let outcome = match launched {
            Ok(outcome) => outcome,
            Err(e) => return failed_run(agent, &e.to_string(), elapsed),
        };

        let report = read_result(&result_file);
        let _ = std::fs::remove_file(&result_file);

        match (outcome.success, report) {
            (true, Ok(report)) => AgentRun {
                agent: agent.to_string(),
                success: true,
                exit_code: outcome.exit_code,
                error: None,
                duration_ms: elapsed,
                report: Some(report),
            },
            (true, Err(e)) => AgentRun {
                exit_code: outcome.exit_code,
                ..failed_run(agent, &format!("unreadable result: {}", e), elapsed)
            },
            (false, report) => {
                let code = outcome
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                AgentRun {
                    exit_code: outcome.exit_code,
                    report: report.ok(),
                    ..failed_run(agent, &format!("exited with status {}", code), elapsed)
                }
            }
        }
    }

    fn write_rollback(
        &self,
        session: &str,
        now: DateTime<Utc>,
        pairs: Vec<RollbackPair>,
    ) -> Result<std::path::PathBuf, CoordinatorError> {
        let record = RollbackRecord {
            session: session.to_string(),
            agent: COORDINATOR_AGENT.to_string(),
            created_at: now,
            files: pairs,
        };

        let mut script = RollbackScript::new(session, self.workspace.root());
        script.add_record(&record);
        let path = self.workspace.rollback_script_path(session);
        script.write(&path)?;

        self.workspace.rollback_log().append(record)?;
        info!("Rollback script for {} files: {}", script.file_count(), path.display());
        Ok(path)
    }
}

fn failed_run(agent: &str, error: &str, duration_ms: u64) -> AgentRun {
    AgentRun {
        agent: agent.to_string(),
        success: false,
        exit_code: None,
        error: Some(error.to_string()),
        duration_ms,
        report: None,
    }
}

fn read_result(path: &Path) -> Result<AgentReport, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}
