use super::record::QuarantineRecord;
use super::QuarantineError;
use crate::coordination::{RollbackPair, RollbackRecord, Workspace};
use crate::graph::ModuleId;
use crate::report::format_bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Generates a shell script that moves quarantined files back
pub struct RollbackScript {
    session: String,
    root: PathBuf,
    pairs: Vec<RollbackPair>,
}

impl RollbackScript {
    pub fn new(session: &str, root: &Path) -> Self {
        Self {
            session: session.to_string(),
            root: root.to_path_buf(),
            pairs: Vec::new(),
        }
    }

    pub fn add_record(&mut self, record: &RollbackRecord) {
        self.pairs.extend(record.files.iter().cloned());
    }

    pub fn file_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.pairs.iter().map(|p| p.size_bytes).sum()
    }

    pub fn render(&self) -> String {
        let mut script = String::new();

        script.push_str("#!/bin/bash\n");
        script.push_str(&format!("# deadsweep rollback for session {}\n", self.session));
        script.push_str("# Moves quarantined files back to their original locations\n");
        script.push_str(&format!(
            "# Files: {}, Total size: {}\n",
            self.pairs.len(),
            format_bytes(self.total_bytes())
        ));
        script.push('\n');
        script.push_str("set -e\n");
        script.push_str(&format!("cd {}\n", quote(&self.root.display().to_string())));
        script.push('\n');

        for pair in &self.pairs {
            let to = quote(pair.to.as_str());
            script.push_str(&format!("mkdir -p \"$(dirname {})\"\n", to));
            script.push_str(&format!("mv {} {}\n", quote(&pair.from), to));
            script.push_str(&format!("rm -f {}\n", quote(&format!("{}{}", pair.from, QuarantineRecord::SIDECAR_SUFFIX))));
        }

        script.push('\n');
        script.push_str(&format!("echo 'Restored {} files.'\n", self.pairs.len()));
        script
    }

    /// Write the script and make it executable
    pub fn write(&self, path: &Path) -> Result<(), QuarantineError> {
        let err = |source| QuarantineError::Script {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(err)?;
        }
        std::fs::write(path, self.render()).map_err(err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path).map_err(err)?.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(path, perms).map_err(err)?;
        }

        Ok(())
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// What a rollback achieved
#[derive(Debug, Default, Serialize)]
pub struct RestoreOutcome {
    pub restored: Vec<ModuleId>,
    pub failed: Vec<(ModuleId, String)>,
}

/// Finds and restores recorded quarantine sessions
pub struct SessionRestorer<'a> {
    workspace: &'a Workspace,
}

impl<'a> SessionRestorer<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self { workspace }
    }

    /// Sessions in the rollback log, oldest first
    pub fn sessions(&self) -> Vec<RollbackRecord> {
        self.workspace.rollback_log().records()
    }

    /// Records for `session`: from the rollback log when present, otherwise
    /// from the sidecars found in the session directory
    pub fn plan(&self, session: &str) -> Result<Vec<QuarantineRecord>, QuarantineError> {
        if let Some(record) = self.workspace.rollback_log().find(session) {
            return Ok(self.records_from_log(&record));
        }

        let dir = self
            .find_session_dir(session)
            .ok_or_else(|| QuarantineError::SessionNotFound(session.to_string()))?;
        debug!("Session {} not in rollback log, scanning {}", session, dir.display());
        Ok(self.records_from_sidecars(&dir))
    }

    pub fn restore(&self, records: &[QuarantineRecord]) -> RestoreOutcome {
        let root = self.workspace.root();
        let mut outcome = RestoreOutcome::default();

        for record in records {
            match record.restore(root) {
                Ok(()) => outcome.restored.push(record.original_path.clone()),
                Err(e) => {
                    warn!("Cannot restore {}: {}", record.original_path, e);
                    outcome.failed.push((record.original_path.clone(), e.to_string()));
                }
            }
        }

        outcome
    }

    /// Remove directories left empty under the quarantine root
    pub fn prune_empty_dirs(&self) {
        let quarantine = self.workspace.coordination_dir();
        for entry in WalkDir::new(quarantine)
            .min_depth(2)
            .contents_first(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
        {
            // Fails harmlessly on non-empty directories
            let _ = std::fs::remove_dir(entry.path());
        }
    }

    fn records_from_log(&self, record: &RollbackRecord) -> Vec<QuarantineRecord> {
        let root = self.workspace.root();
        record
            .files
            .iter()
            .filter_map(|pair| {
                let sidecar = QuarantineRecord::sidecar_for(&root.join(&pair.from));
                match QuarantineRecord::read_sidecar(&sidecar) {
                    Ok(rec) => Some(rec),
                    Err(e) => {
                        warn!("Skipping {}: {}", pair.to, e);
                        None
                    }
                }
            })
            .collect()
    }

    fn records_from_sidecars(&self, dir: &Path) -> Vec<QuarantineRecord> {
        let mut records: Vec<QuarantineRecord> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && QuarantineRecord::is_sidecar(e.path()))
            .filter_map(|e| match QuarantineRecord::read_sidecar(e.path()) {
                Ok(rec) => Some(rec),
                Err(err) => {
                    warn!("{}", err);
                    None
                }
            })
            .collect();
        records.sort_by(|a, b| a.original_path.cmp(&b.original_path));
        records
    }

    /// Session ids are `<agent>-<stamp>`; agent names may contain dashes
    fn find_session_dir(&self, session: &str) -> Option<PathBuf> {
        let entries = std::fs::read_dir(self.workspace.coordination_dir()).ok()?;
        for agent_dir in entries.filter_map(|e| e.ok()).filter(|e| e.path().is_dir()) {
            let agent = agent_dir.file_name().to_string_lossy().to_string();
            if let Some(stamp) = session.strip_prefix(&format!("{}-", agent)) {
                let candidate = agent_dir.path().join(stamp);
                if candidate.is_dir() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}
