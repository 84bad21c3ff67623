//! Tests for quarantine sessions and rollback.
//!
//! Files are moved by a real agent run, then restored through the session
//! restorer or a generated rollback script.

use deadsweep::agent::{Agent, AgentOptions, AgentReport};
use deadsweep::config::Config;
use deadsweep::coordination::{FileLock, LockPolicy, Workspace};
use deadsweep::graph::ModuleId;
use deadsweep::report::format_bytes;
use deadsweep::quarantine::{hash_bytes, QuarantineMover, QuarantineRecord, RollbackScript, SessionRestorer};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn id(path: &str) -> ModuleId {
    ModuleId::new(path).unwrap()
}

fn write_old(root: &Path, path: &str, body: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(&full, body).unwrap();
    let file = OpenOptions::new().write(true).open(&full).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(30 * 24 * 3600))
        .unwrap();
}

/// Two dead files and one live one under `src/lib`
fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/app/page.tsx", "import { used } from '@/lib/used';\n");
    write_old(root, "src/lib/used.ts", "export const used = 1;\n");
    write_old(root, "src/lib/dead.ts", "export const dead = 'dead';\n");
    write_old(root, "src/lib/nested/gone.ts", "export const gone = 'gone';\n");
    dir
}

fn run_backend(root: &Path, config: &Config) -> AgentReport {
    let options = AgentOptions::new("backend").targets(vec!["src/lib".to_string()]);
    Agent::new(root, config, options).unwrap().run().unwrap()
}

// ============================================================================
// Moving
// ============================================================================

#[test]
fn test_quarantined_files_keep_content_and_hash() {
    let dir = project();
    let root = dir.path();
    let original = fs::read(root.join("src/lib/nested/gone.ts")).unwrap();

    let report = run_backend(root, &Config::default());
    assert_eq!(report.results.moved, vec![id("src/lib/dead.ts"), id("src/lib/nested/gone.ts")]);

    let record = report
        .results
        .quarantine
        .iter()
        .find(|r| r.original_path == id("src/lib/nested/gone.ts"))
        .unwrap();
    let moved = fs::read(root.join(&record.quarantine_path)).unwrap();

    assert_eq!(moved, original);
    assert_eq!(record.content_hash, hash_bytes(&original));
    assert_eq!(record.size_bytes, original.len() as u64);
    assert_eq!(record.agent, "backend");
    assert!(record.quarantine_path.ends_with("src/lib/nested/gone.ts"));

    let sidecar = QuarantineRecord::sidecar_for(&root.join(&record.quarantine_path));
    assert_eq!(&QuarantineRecord::read_sidecar(&sidecar).unwrap(), record);
}

#[test]
fn test_missing_file_becomes_warning() {
    let dir = project();
    let root = dir.path();
    let config = Config::default();
    let workspace = Workspace::new(root, &config);

    let lock = FileLock::new(workspace.lock_path(), LockPolicy::from(&config.lock));
    let guard = lock.acquire("backend").unwrap();
    let mover = QuarantineMover::new(&workspace, "backend");
    let session = mover.begin_session(chrono::Utc::now()).unwrap();
    let batch = mover.move_batch(&guard, &session, &[id("src/lib/dead.ts"), id("src/lib/vanished.ts")]);
    guard.release().unwrap();

    assert_eq!(batch.moved(), vec![id("src/lib/dead.ts")]);
    assert_eq!(batch.warnings.len(), 1);
    assert!(batch.warnings[0].contains("src/lib/vanished.ts"));
}

// ============================================================================
// Rollback
// ============================================================================

#[test]
fn test_rollback_restores_session() {
    let dir = project();
    let root = dir.path();
    let config = Config::default();
    let before = fs::read(root.join("src/lib/dead.ts")).unwrap();

    let report = run_backend(root, &config);
    let session = report.session.unwrap();
    assert!(!root.join("src/lib/dead.ts").exists());

    let workspace = Workspace::new(root, &config);
    let restorer = SessionRestorer::new(&workspace);
    assert_eq!(restorer.sessions().len(), 1);

    let records = restorer.plan(&session).unwrap();
    assert_eq!(records.len(), 2);

    let outcome = restorer.restore(&records);
    restorer.prune_empty_dirs();

    assert!(outcome.failed.is_empty());
    assert_eq!(outcome.restored.len(), 2);
    assert_eq!(fs::read(root.join("src/lib/dead.ts")).unwrap(), before);
    assert!(root.join("src/lib/nested/gone.ts").is_file());
    assert!(!workspace.agent_quarantine_dir("backend").join(session.trim_start_matches("backend-")).exists());
}

#[test]
fn test_rollback_refuses_to_overwrite() {
    let dir = project();
    let root = dir.path();
    let config = Config::default();

    let session = run_backend(root, &config).session.unwrap();
    write_old(root, "src/lib/dead.ts", "export const dead = 'rewritten';\n");

    let workspace = Workspace::new(root, &config);
    let restorer = SessionRestorer::new(&workspace);
    let outcome = restorer.restore(&restorer.plan(&session).unwrap());

    assert_eq!(outcome.restored, vec![id("src/lib/nested/gone.ts")]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, id("src/lib/dead.ts"));
    assert_eq!(
        fs::read_to_string(root.join("src/lib/dead.ts")).unwrap(),
        "export const dead = 'rewritten';\n"
    );
}

#[test]
fn test_rollback_detects_tampering() {
    let dir = project();
    let root = dir.path();
    let config = Config::default();

    let report = run_backend(root, &config);
    let record = &report.results.quarantine[0];
    fs::write(root.join(&record.quarantine_path), "tampered").unwrap();

    let workspace = Workspace::new(root, &config);
    let restorer = SessionRestorer::new(&workspace);
    let outcome = restorer.restore(&restorer.plan(report.session.as_deref().unwrap()).unwrap());

    assert!(outcome.failed.iter().any(|(file, _)| *file == record.original_path));
    assert!(!root.join(record.original_path.as_str()).exists());
}

#[test]
fn test_rollback_script_for_session() {
    let dir = project();
    let root = dir.path();
    let config = Config::default();

    let report = run_backend(root, &config);
    let session = report.session.unwrap();
    let workspace = Workspace::new(root, &config);
    let record = workspace.rollback_log().find(&session).unwrap();

    let mut script = RollbackScript::new(&session, root);
    script.add_record(&record);
    let path = workspace.rollback_script_path(&session);
    script.write(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("#!/bin/bash"));
    assert!(text.contains("set -e"));
    assert_eq!(script.file_count(), 2);

    let expected = ("export const dead = 'dead';\n".len() + "export const gone = 'gone';\n".len()) as u64;
    assert_eq!(report.results.counts.bytes_moved, expected);
    assert_eq!(script.total_bytes(), expected);
    assert!(text.contains(&format!("# Files: 2, Total size: {}", format_bytes(expected))));
    for pair in &record.files {
        assert!(text.contains(&format!("mv '{}' '{}'", pair.from, pair.to)));
    }
}
