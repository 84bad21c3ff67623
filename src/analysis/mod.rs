mod entry_points;
mod protection;
mod reachability;
mod safety;
mod verifier;

pub use entry_points::{EntryPointClassifier, EntryPointSet, EntryReason};
pub use protection::{Matcher, ProtectionRule, ProtectionSet};
pub use reachability::{ReachabilityEngine, ReachabilityResult};
pub use safety::{FilterOutcome, SafetyFilter};
pub use verifier::{
    CorpusSearch, CorpusVerifier, RepoCorpus, SearchError, UsageHit, UsageQuery, Verification,
};

use crate::graph::ModuleId;
use serde::{Deserialize, Serialize};

/// Why a candidate was kept in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Matches a permanent protection pattern
    ProtectedPattern,
    /// Some other file mentions the path
    CorpusUsage,
    /// A templated import could expand to this file
    DynamicReference,
    /// The text search itself failed
    SearchFailed,
    /// Another agent recorded a reference to the file
    ReferencedByOtherAgent,
    /// Modified inside the grace window
    ModifiedRecently,
    /// Base name looks load-bearing
    CriticalName,
    /// Modification time could not be read
    StatUnavailable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::ProtectedPattern => "protected file pattern",
            SkipReason::CorpusUsage => "found usage in corpus search",
            SkipReason::DynamicReference => "matches dynamic reference template",
            SkipReason::SearchFailed => "corpus search failed",
            SkipReason::ReferencedByOtherAgent => "referenced by other agent",
            SkipReason::ModifiedRecently => "modified recently",
            SkipReason::CriticalName => "critical file name pattern",
            SkipReason::StatUnavailable => "cannot access file stats",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate that was not quarantined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file: ModuleId,

    pub reason: SkipReason,

    /// Supporting evidence, e.g. the file that mentioned the path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SkippedFile {
    pub fn new(file: ModuleId, reason: SkipReason) -> Self {
        Self {
            file,
            reason,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
