use super::{ProtectionSet, SkipReason, SkippedFile};
use crate::coordination::UsageMap;
use crate::graph::ModuleId;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Candidates split by the safety checks
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub cleared: Vec<ModuleId>,
    pub skipped: Vec<SkippedFile>,
    /// Files another agent has a stake in
    pub conflicts: Vec<ModuleId>,
}

/// Last line of defence before quarantine. Rejects on the first of: another
/// agent's reference, a recent modification, a critical-looking name.
pub struct SafetyFilter<'a> {
    root: &'a Path,
    agent: &'a str,
    usage: &'a UsageMap,
    critical: &'a ProtectionSet,
    grace: Duration,
    force: bool,
    now: SystemTime,
}

impl<'a> SafetyFilter<'a> {
    pub fn new(root: &'a Path, agent: &'a str, usage: &'a UsageMap, critical: &'a ProtectionSet) -> Self {
        Self {
            root,
            agent,
            usage,
            critical,
            grace: Duration::from_secs(7 * 24 * 60 * 60),
            force: false,
            now: SystemTime::now(),
        }
    }

    pub fn with_grace_days(mut self, days: u64) -> Self {
        self.grace = Duration::from_secs(days.saturating_mul(24 * 60 * 60));
        self
    }

    /// Skip the grace-period check
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_now(mut self, now: SystemTime) -> Self {
        self.now = now;
        self
    }

    /// `None` if the file may be quarantined, otherwise the reason it may not
    pub fn check(&self, file: &ModuleId) -> Option<SkippedFile> {
        if self.usage.is_referenced_by_other_agents(file, self.agent) {
            return Some(SkippedFile::new(file.clone(), SkipReason::ReferencedByOtherAgent));
        }

        if !self.force {
            let modified = std::fs::metadata(file.to_path(self.root)).and_then(|m| m.modified());
            match modified {
                Ok(modified) => {
                    // A timestamp in the future counts as recent
                    let recent = self
                        .now
                        .duration_since(modified)
                        .map(|age| age < self.grace)
                        .unwrap_or(true);
                    if recent {
                        return Some(SkippedFile::new(file.clone(), SkipReason::ModifiedRecently));
                    }
                }
                Err(e) => {
                    return Some(
                        SkippedFile::new(file.clone(), SkipReason::StatUnavailable).with_detail(e.to_string()),
                    );
                }
            }
        }

        if let Some(rule) = self.critical.first_match(file) {
            return Some(SkippedFile::new(file.clone(), SkipReason::CriticalName).with_detail(rule.name.as_str()));
        }

        None
    }

    pub fn apply(&self, candidates: Vec<ModuleId>) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();

        for candidate in candidates {
            match self.check(&candidate) {
                Some(skipped) => {
                    debug!("Keeping {}: {}", candidate, skipped.reason);
                    if skipped.reason == SkipReason::ReferencedByOtherAgent {
                        outcome.conflicts.push(candidate);
                    }
                    outcome.skipped.push(skipped);
                }
                None => outcome.cleared.push(candidate),
            }
        }

        outcome
    }
}
