//! Tests for state shared between agents: the quarantine lock, the usage
//! map and cross-agent safety decisions.

use deadsweep::agent::{Agent, AgentOptions};
use deadsweep::analysis::{ProtectionSet, SafetyFilter, SkipReason};
use deadsweep::config::{Config, CriticalLevel};
use deadsweep::coordination::{
    FileLock, LockError, LockPolicy, ReferenceStatus, RunOutcome, UsageMapStore, Workspace,
};
use deadsweep::graph::ModuleId;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
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

fn fast_policy() -> LockPolicy {
    LockPolicy {
        stale_after: Duration::from_secs(60),
        timeout: Duration::from_secs(20),
        base_delay: Duration::from_millis(2),
        max_delay: Duration::from_millis(20),
        max_retries: 10_000,
    }
}

// ============================================================================
// Quarantine lock
// ============================================================================

#[test]
fn test_lock_mutual_exclusion_across_threads() {
    let dir = TempDir::new().unwrap();
    let lock_path = dir.path().join(".lock");
    let inside = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..6)
        .map(|n| {
            let lock = FileLock::new(&lock_path, fast_policy());
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            thread::spawn(move || {
                for _ in 0..5 {
                    lock.with_lock(&format!("agent-{}", n), |_| {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(1));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert!(!lock_path.exists());
}

#[test]
fn test_stale_lock_is_evicted() {
    let dir = TempDir::new().unwrap();
    let lock_path = dir.path().join(".lock");
    fs::write(&lock_path, r#"{"pid":1,"agent":"crashed","acquired_at":"2020-01-01T00:00:00Z","token":"x"}"#)
        .unwrap();
    let file = OpenOptions::new().write(true).open(&lock_path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(600)).unwrap();

    let lock = FileLock::new(&lock_path, fast_policy());
    let guard = lock.acquire("frontend").unwrap();

    assert!(guard.verify());
    assert_eq!(lock.holder().unwrap().agent, "frontend");
    guard.release().unwrap();
}

#[test]
fn test_live_lock_times_out() {
    let dir = TempDir::new().unwrap();
    let lock_path = dir.path().join(".lock");
    let policy = LockPolicy {
        timeout: Duration::from_millis(100),
        ..fast_policy()
    };

    let holder = FileLock::new(&lock_path, policy.clone()).acquire("backend").unwrap();
    let result = FileLock::new(&lock_path, policy).acquire("frontend");

    match result {
        Err(LockError::Timeout { holder, .. }) | Err(LockError::RetriesExhausted { holder, .. }) => {
            assert!(holder.contains("backend"));
        }
        other => panic!("expected the lock to stay busy, got {:?}", other),
    }
    holder.release().unwrap();
}

#[test]
fn test_release_after_eviction_does_not_remove_new_holder() {
    let dir = TempDir::new().unwrap();
    let lock_path = dir.path().join(".lock");
    let lock = FileLock::new(&lock_path, fast_policy());

    let first = lock.acquire("frontend").unwrap();
    // Another process evicted the marker and took the lock
    fs::remove_file(&lock_path).unwrap();
    let second = lock.acquire("backend").unwrap();

    assert!(!first.verify());
    assert!(first.refresh().is_err());
    assert!(matches!(first.release(), Err(LockError::NotOwner { .. })));
    assert!(second.verify());
    second.release().unwrap();
}

// ============================================================================
// Usage map
// ============================================================================

#[test]
fn test_concurrent_usage_map_updates_are_not_lost() {
    let dir = TempDir::new().unwrap();
    let store_dir = dir.path().to_path_buf();

    let handles: Vec<_> = ["frontend", "backend", "shared", "extra"]
        .into_iter()
        .map(|agent| {
            let store = UsageMapStore::in_dir(&store_dir);
            thread::spawn(move || {
                for n in 0..10 {
                    let file = id(&format!("src/{}/file{}.ts", agent, n));
                    store
                        .add_file_reference(&file, agent, ReferenceStatus::Referenced)
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let map = UsageMapStore::in_dir(&store_dir).read();
    assert_eq!(map.file_references.len(), 40);
    assert_eq!(map.revision, 40);
}

#[test]
fn test_cleanup_drops_old_entries() {
    let dir = TempDir::new().unwrap();
    let store = UsageMapStore::in_dir(dir.path());
    store
        .add_file_reference(&id("src/lib/a.ts"), "frontend", ReferenceStatus::Referenced)
        .unwrap();

    let mut map = store.read();
    for refs in map.file_references.values_mut() {
        for reference in refs.iter_mut() {
            reference.timestamp = reference.timestamp - chrono::Duration::days(45);
        }
    }
    store.write(&mut map).unwrap();

    assert_eq!(store.cleanup(30).unwrap(), 1);
    assert!(store.read().file_references.is_empty());
}

// ============================================================================
// Cross-agent safety
// ============================================================================

#[test]
fn test_reference_by_other_agent_blocks_quarantine() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/shared/types.ts", "export type User = { id: string };\n");
    write_old(root, "src/components/card.tsx", "import type { User } from '../shared/types';\n");
    write_old(root, "src/app/page.tsx", "import Card from '@/components/card';\n");

    let config = Config::default();

    // The frontend agent sees card.tsx import a file outside its scope
    let options = AgentOptions::new("frontend").targets(vec!["src/app".to_string(), "src/components".to_string()]);
    let report = Agent::new(root, &config, options).unwrap().run().unwrap();
    assert!(report.results.moved.is_empty());

    let workspace = Workspace::new(root, &config);
    let usage = workspace.usage_map().read();
    let refs = &usage.file_references[&id("src/shared/types.ts")];
    assert!(refs
        .iter()
        .any(|r| r.agent == "frontend" && r.status == ReferenceStatus::Referenced));
    assert_eq!(usage.agents["frontend"].outcome, RunOutcome::Completed);

    // The shared agent must now leave it alone
    let critical = ProtectionSet::critical(CriticalLevel::Standard);
    let outcome = SafetyFilter::new(root, "shared", &usage, &critical)
        .apply(vec![id("src/shared/types.ts")]);

    assert!(outcome.cleared.is_empty());
    assert_eq!(outcome.conflicts, vec![id("src/shared/types.ts")]);
    assert_eq!(outcome.skipped[0].reason, SkipReason::ReferencedByOtherAgent);
    assert_eq!(outcome.skipped[0].reason.to_string(), "referenced by other agent");

    // The owner of the reference is not blocked by it
    let own = SafetyFilter::new(root, "frontend", &usage, &critical).apply(vec![id("src/shared/types.ts")]);
    assert_eq!(own.cleared, vec![id("src/shared/types.ts")]);
}

#[test]
fn test_rerun_replaces_previous_references() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/shared/types.ts", "export type User = {};\n");
    write_old(root, "src/components/card.tsx", "import type { User } from '../shared/types';\n");
    write_old(root, "src/app/page.tsx", "import Card from '@/components/card';\n");

    let config = Config::default();
    let options = || AgentOptions::new("frontend").targets(vec!["src/app".to_string(), "src/components".to_string()]);
    Agent::new(root, &config, options()).unwrap().run().unwrap();

    // card.tsx stops importing the shared file
    write_old(root, "src/components/card.tsx", "export default function Card() {}\n");
    Agent::new(root, &config, options()).unwrap().run().unwrap();

    let usage = Workspace::new(root, &config).usage_map().read();
    assert!(!usage.is_referenced_by_other_agents(&id("src/shared/types.ts"), "shared"));
}
