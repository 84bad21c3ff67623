// Agent - one scoped detect-verify-quarantine run

mod pipeline;
mod report;

pub use pipeline::Agent;
pub use report::{AgentReport, AgentResults};

use crate::analysis::SearchError;
use crate::coordination::{LockError, StateError};
use crate::quarantine::QuarantineError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("unknown agent '{0}' (no profile configured)")]
    UnknownAgent(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("could not acquire the quarantine lock: {0}")]
    Lock(#[from] LockError),

    #[error(transparent)]
    Quarantine(#[from] QuarantineError),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Per-invocation settings
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub name: String,

    /// Overrides the profile's scope when non-empty
    pub targets: Vec<String>,

    pub dry_run: bool,

    /// Bypass the grace period (only if the profile allows it)
    pub force: bool,

    /// Scan files on the rayon pool
    pub parallel: bool,

    pub show_progress: bool,

    /// Where to write the structured report for a coordinator
    pub result_file: Option<PathBuf>,
}

impl AgentOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn targets(mut self, targets: Vec<String>) -> Self {
        self.targets = targets;
        self
    }
}
