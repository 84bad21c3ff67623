use super::{AgentError, AgentOptions, AgentReport, AgentResults};
use crate::analysis::{
    CorpusVerifier, EntryPointClassifier, ProtectionSet, ReachabilityEngine, RepoCorpus,
    SafetyFilter, SkipReason, SkippedFile,
};
use crate::config::{AgentProfile, Config};
use crate::coordination::{
    write_json_atomic, CleanupLogEntry, FileLock, LockPolicy, ReferenceStatus, RunCounts, RunMode,
    RunOutcome, Workspace,
};
use crate::discovery::{FileFinder, SourceFile};
use crate::graph::{BuiltGraph, GraphBuilder, HeuristicResolver, ModuleId, ParallelGraphBuilder};
use crate::quarantine::{MoveBatch, QuarantineMover, QuarantineSession};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A configured agent ready to run against one project
pub struct Agent<'a> {
    root: &'a Path,
    config: &'a Config,
    profile: &'a AgentProfile,
    options: AgentOptions,
    workspace: Workspace,
}

impl<'a> Agent<'a> {
    pub fn new(root: &'a Path, config: &'a Config, options: AgentOptions) -> Result<Self, AgentError> {
        let profile = config
            .agent(&options.name)
            .ok_or_else(|| AgentError::UnknownAgent(options.name.clone()))?;

        Ok(Self {
            root,
            config,
            profile,
            workspace: Workspace::new(root, config),
            options,
        })
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn scope(&self) -> &[String] {
        if self.options.targets.is_empty() {
            &self.profile.scope
        } else {
            &self.options.targets
        }
    }

    fn effective_force(&self) -> bool {
        if self.options.force && !self.profile.allow_force {
            warn!("--force is not allowed for agent {}, ignoring it", self.name());
            return false;
        }
        self.options.force
    }

    /// Run the whole pipeline and write the per-agent report
    pub fn run(&self) -> Result<AgentReport, AgentError> {
        let started = Instant::now();
        let now = Utc::now();
        let name = self.name();
        let mode = RunMode::from_dry_run(self.options.dry_run);
        let force = self.effective_force();
        let mut warnings: Vec<String> = Vec::new();

        info!("Agent {} starting ({}, scope: {})", name, mode.as_str(), self.scope().join(", "));

        // Step 1: Discover files
        let files = FileFinder::new(self.config).find_files(self.root, self.scope());
        info!("Found {} files to analyze", files.len());

        // Step 2: Parse files and build graph
        let built = self.build_graph(&files);
        warnings.extend(built.warnings.iter().map(|w| format!("{}: {}", w.file, w.message)));
        let graph = built.graph;
        debug!("Graph has {} modules and {} references", graph.module_count(), graph.reference_count());

        // Step 3: Classify entry points
        let entry_points = EntryPointClassifier::new(&self.config.entry_points)?.classify(&graph);
        info!("Found {} entry points", entry_points.len());

        // Step 4: Reachability
        let mut protection = ProtectionSet::permanent();
        protection.extend(ProtectionSet::from_patterns(&self.config.safety.protected_patterns, false)?);
        let reachability = ReachabilityEngine::new(&protection).analyze(&graph, &entry_points);
        info!(
            "{} reachable, {} candidates",
            reachability.reachable.len(),
            reachability.candidates.len()
        );

        let mut skipped: Vec<SkippedFile> = reachability
            .protected
            .iter()
            .map(|(id, rule)| SkippedFile::new(id.clone(), SkipReason::ProtectedPattern).with_detail(rule.as_str()))
            .collect();

        // Step 5: Verify candidates against the whole repository
        let verification = if reachability.candidates.is_empty() {
            Default::default()
        } else {
            let corpus = RepoCorpus::load(self.root, self.config)?;
            debug!("Corpus holds {} files", corpus.file_count());
            CorpusVerifier::new(&corpus, &self.config.resolver.source_roots)
                .verify(&graph, reachability.candidates.clone())
        };
        skipped.extend(verification.withdrawn);

        // Step 6: Safety filter
        let usage = self.workspace.usage_map().read();
        let mut critical = ProtectionSet::critical(self.profile.critical);
        critical.extend(ProtectionSet::from_patterns(&self.config.safety.critical_patterns, true)?);
        let filtered = SafetyFilter::new(self.root, name, &usage, &critical)
            .with_grace_days(self.config.safety.grace_days)
            .with_force(force)
            .apply(verification.retained);
        skipped.extend(filtered.skipped);

        // Step 7: Quarantine under the lock
        let (session, batch) = if mode.is_dry_run() || filtered.cleared.is_empty() {
            (None, MoveBatch::default())
        } else {
            let (session, batch) = self.quarantine(&filtered.cleared)?;
            (Some(session), batch)
        };
        warnings.extend(batch.warnings.iter().cloned());
        let moved = batch.moved();

        // Step 8: Shared bookkeeping (never in a dry run)
        let cross_scope: BTreeSet<ModuleId> =
            graph.cross_scope_references().iter().map(|r| r.to.clone()).collect();
        if !mode.is_dry_run() {
            self.record_usage(&moved, &cross_scope, &mut warnings);
            if let Some(session) = &session {
                if let Err(e) = self.workspace.rollback_log().append(batch.rollback_record(session)) {
                    warn!("Could not append rollback record: {}", e);
                    warnings.push(format!("rollback log: {}", e));
                }
            }
        }

        let counts = RunCounts {
            scanned: files.len(),
            entry_points: entry_points.len(),
            candidates: reachability.candidates.len(),
            moved: if mode.is_dry_run() { filtered.cleared.len() } else { moved.len() },
            skipped: skipped.len(),
            conflicts: filtered.conflicts.len(),
            warnings: warnings.len(),
            bytes_moved: if mode.is_dry_run() {
                size_on_disk(self.root, &filtered.cleared)
            } else {
                batch.records.iter().map(|r| r.size_bytes).sum()
            },
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        if !mode.is_dry_run() {
            let entry = CleanupLogEntry {
                agent: name.to_string(),
                timestamp: now,
                mode,
                force,
                counts,
                duration_ms,
                session: session.as_ref().map(|s| s.id.clone()),
            };
            if let Err(e) = self.workspace.cleanup_log().append(entry) {
                warn!("Could not append to cleanup log: {}", e);
            }
        }

        let report = AgentReport {
            agent: name.to_string(),
            timestamp: now,
            mode,
            force,
            session: session.map(|s| s.id),
            results: AgentResults {
                counts,
                candidates: reachability.candidates,
                cleared: filtered.cleared,
                moved,
                skipped,
                conflicts: filtered.conflicts,
                warnings,
                quarantine: batch.records,
                duration_ms,
            },
        };

        // Step 9: Reports
        let report_path = self.workspace.agent_report_path(name);
        match write_json_atomic(&report_path, &report) {
            Ok(()) => debug!("Report written to {}", report_path.display()),
            Err(e) => warn!("Could not write {}: {}", report_path.display(), e),
        }
        if let Some(result_file) = &self.options.result_file {
            write_json_atomic(result_file, &report)?;
        }

        info!("Agent {} finished in {}ms", name, duration_ms);
        Ok(report)
    }

    fn build_graph(&self, files: &[SourceFile]) -> BuiltGraph {
        let resolver = Box::new(HeuristicResolver::new(self.root, &self.config.resolver));

        if self.options.parallel {
            return ParallelGraphBuilder::new().build_from_files(files, resolver);
        }

        let pb = if self.options.show_progress {
            ProgressBar::new(files.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut builder = GraphBuilder::new(resolver);
        for file in files {
            builder.process_file(file);
            pb.inc(1);
        }
        pb.finish_and_clear();

        builder.build()
    }

    /// Lock, open a session and move `files`. Lock and session-directory
    /// failures abort; per-file failures come back as batch warnings.
    fn quarantine(&self, files: &[ModuleId]) -> Result<(QuarantineSession, MoveBatch), AgentError> {
        let lock = FileLock::new(self.workspace.lock_path(), LockPolicy::from(&self.config.lock));
        let guard = lock.acquire(self.name())?;

        let mover = QuarantineMover::new(&self.workspace, self.name());
        let session = mover.begin_session(Utc::now())?;
        let mut batch = mover.move_batch(&guard, &session, files);

        if let Err(e) = guard.release() {
            warn!("Lock release failed: {}", e);
            batch.warnings.push(format!("lock release: {}", e));
        }

        info!("Moved {} files into {}", batch.records.len(), session.dir().display());
        Ok((session, batch))
    }

    /// Publish this run to the usage map in one transaction
    fn record_usage(&self, moved: &[ModuleId], cross_scope: &BTreeSet<ModuleId>, warnings: &mut Vec<String>) {
        let name = self.name();
        let result = self.workspace.usage_map().transact(name, |map| {
            let now = Utc::now();
            map.update_agent_status(name, RunOutcome::Completed, moved.to_vec(), now);
            map.clear_agent_references(name, ReferenceStatus::Referenced);
            for target in cross_scope {
                map.add_file_reference(target, name, ReferenceStatus::Referenced, now);
            }
            for file in moved {
                map.add_file_reference(file, name, ReferenceStatus::Moved, now);
            }
        });

        if let Err(e) = result {
            warn!("Could not update usage map: {}", e);
            warnings.push(format!("usage map: {}", e));
        }
    }
}

/// Combined size of files still in the tree; unreadable ones count as zero
fn size_on_disk(root: &Path, files: &[ModuleId]) -> u64 {
    files
        .iter()
        .filter_map(|file| std::fs::metadata(file.to_path(root)).ok())
        .map(|meta| meta.len())
        .sum()
}
