//! CLI integration tests
//!
//! These tests run the deadsweep binary against throwaway projects and check
//! its output, exit status and effect on the tree.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn write_old(root: &Path, path: &str, body: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(&full, body).unwrap();
    let file = OpenOptions::new().write(true).open(&full).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(30 * 24 * 3600))
        .unwrap();
}

/// A small project with one dead file in each agent's scope
fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/app/page.tsx", "import { Card } from '@/components/card';\nimport { used } from '@/lib/used';\n");
    write_old(root, "src/components/card.tsx", "export const Card = () => null;\n");
    write_old(root, "src/components/old-banner.tsx", "export const Banner = () => null;\n");
    write_old(root, "src/lib/used.ts", "export const used = 1;\n");
    write_old(root, "src/lib/dead.ts", "export const dead = 1;\n");
    dir
}

/// deadsweep with colors off, rooted at `root`
fn deadsweep(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("deadsweep").unwrap();
    cmd.env("NO_COLOR", "1").arg("--root").arg(root);
    cmd
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("deadsweep")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("agent"))
        .stdout(predicate::str::contains("coordinate"))
        .stdout(predicate::str::contains("rollback"));
}

#[test]
fn test_version() {
    Command::cargo_bin("deadsweep")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_root_fails() {
    Command::cargo_bin("deadsweep")
        .unwrap()
        .args(["--root", "/nonexistent/deadsweep/project", "sessions"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Project root not found"));
}

// ============================================================================
// Agent Tests
// ============================================================================

#[test]
fn test_agent_dry_run_summary() {
    let dir = project();

    deadsweep(dir.path())
        .args(["agent", "frontend", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Files that would be moved: 1"))
        .stdout(predicate::str::contains("Size that would be recovered: 34 Bytes"))
        .stdout(predicate::str::contains("src/components/old-banner.tsx"));

    assert!(dir.path().join("src/components/old-banner.tsx").exists());
    assert!(!dir.path().join("src/.shared_quarantine").exists());
}

#[test]
fn test_agent_unknown_name_fails() {
    let dir = project();

    deadsweep(dir.path())
        .args(["agent", "mobile", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mobile"));
}

#[test]
fn test_agent_json_output() {
    let dir = project();

    let output = deadsweep(dir.path())
        .args(["--quiet", "agent", "backend", "--target", "src/lib", "--dry-run", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["agent"], "backend");
    assert_eq!(report["mode"], "dry_run");
    assert_eq!(report["results"]["cleared"][0], "src/lib/dead.ts");
}

#[test]
fn test_agent_live_then_rollback() {
    let dir = project();
    let root = dir.path();

    let output = deadsweep(root)
        .args(["--quiet", "agent", "backend", "--target", "src/lib", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(!root.join("src/lib/dead.ts").exists());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let session = report["session"].as_str().unwrap().to_string();

    deadsweep(root)
        .arg("sessions")
        .assert()
        .success()
        .stdout(predicate::str::contains(session.as_str()));

    deadsweep(root)
        .args(["rollback", session.as_str(), "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("src/lib/dead.ts"));
    assert!(!root.join("src/lib/dead.ts").exists());

    deadsweep(root)
        .args(["rollback", session.as_str(), "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Files restored: 1"));
    assert!(root.join("src/lib/dead.ts").is_file());
}

#[test]
fn test_rollback_unknown_session_fails() {
    let dir = project();

    deadsweep(dir.path())
        .args(["rollback", "backend-2020-01-01T00-00-00-000Z", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("backend-2020-01-01T00-00-00-000Z"));
}

#[test]
fn test_sessions_empty() {
    let dir = project();

    deadsweep(dir.path())
        .arg("sessions")
        .assert()
        .success()
        .stdout(predicate::str::contains("No rollback sessions recorded."));
}

#[test]
fn test_prune() {
    let dir = project();

    deadsweep(dir.path())
        .args(["prune", "--retention-days", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 usage-map entries older than 10 days"));
}

// ============================================================================
// Coordinator Tests
// ============================================================================

#[test]
fn test_coordinate_dry_run() {
    let dir = project();
    let root = dir.path();

    deadsweep(root)
        .args(["coordinate", "--agents", "frontend,backend", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Multi-agent cleanup"))
        .stdout(predicate::str::contains("frontend"))
        .stdout(predicate::str::contains("backend"))
        .stdout(predicate::str::contains("Files that would be moved:"));

    assert!(root.join("src/lib/dead.ts").exists());
    assert!(root.join("src/components/old-banner.tsx").exists());
    assert!(!root.join("src/.shared_quarantine").exists());
    assert!(root.join("logs/multi_agent_cleanup.json").is_file());
}

#[test]
fn test_coordinate_rejects_conflicting_filters() {
    let dir = project();

    deadsweep(dir.path())
        .args(["coordinate", "--frontend-only", "--backend-only"])
        .assert()
        .failure();
}

#[test]
fn test_coordinate_unknown_agent_fails() {
    let dir = project();

    deadsweep(dir.path())
        .args(["coordinate", "--agents", "frontend,mobile", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mobile"));
}
