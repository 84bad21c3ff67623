//! End-to-end tests for the single-agent pipeline
//!
//! Each test lays out a small Next.js-style project in a temp directory and
//! runs discovery, graph building, entry-point classification, reachability,
//! corpus verification and the safety filter against it.

use deadsweep::agent::{Agent, AgentOptions, AgentReport};
use deadsweep::analysis::{EntryPointClassifier, ProtectionSet, ReachabilityEngine, SkipReason};
use deadsweep::config::Config;
use deadsweep::coordination::Workspace;
use deadsweep::discovery::FileFinder;
use deadsweep::graph::{GraphBuilder, HeuristicResolver, ModuleGraph, ModuleId, ParallelGraphBuilder};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const DAY: u64 = 24 * 3600;

fn id(path: &str) -> ModuleId {
    ModuleId::new(path).unwrap()
}

/// Write a file and backdate it by `age_days`
fn write_aged(root: &Path, path: &str, body: &str, age_days: u64) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(&full, body).unwrap();
    let file = OpenOptions::new().write(true).open(&full).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(age_days * DAY))
        .unwrap();
}

fn write_old(root: &Path, path: &str, body: &str) {
    write_aged(root, path, body, 30);
}

fn build_graph(root: &Path, config: &Config, scope: &[&str]) -> ModuleGraph {
    let scope: Vec<String> = scope.iter().map(|s| s.to_string()).collect();
    let files = FileFinder::new(config).find_files(root, &scope);
    let mut builder = GraphBuilder::new(Box::new(HeuristicResolver::new(root, &config.resolver)));
    for file in &files {
        builder.process_file(file);
    }
    builder.build().graph
}

fn run_agent(root: &Path, config: &Config, options: AgentOptions) -> AgentReport {
    Agent::new(root, config, options).unwrap().run().unwrap()
}

fn backend(targets: &[&str]) -> AgentOptions {
    AgentOptions::new("backend").targets(targets.iter().map(|s| s.to_string()).collect())
}

fn skip_reason(report: &AgentReport, path: &str) -> Option<SkipReason> {
    report
        .results
        .skipped
        .iter()
        .find(|s| s.file.as_str() == path)
        .map(|s| s.reason)
}

// ============================================================================
// Reachability
// ============================================================================

#[test]
fn test_unreferenced_module_is_candidate() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/app/page.tsx", "import Widget from '@/components/widget';\n");
    write_old(root, "src/components/widget.tsx", "export default function Widget() {}\n");
    write_old(root, "src/components/orphan.tsx", "export const Orphan = () => null;\n");

    let config = Config::default();
    let graph = build_graph(root, &config, &["src/app", "src/components"]);
    let entry_points = EntryPointClassifier::new(&config.entry_points).unwrap().classify(&graph);
    let protection = ProtectionSet::permanent();
    let result = ReachabilityEngine::new(&protection).analyze(&graph, &entry_points);

    assert!(entry_points.contains(&id("src/app/page.tsx")));
    assert!(result.reachable.contains(&id("src/app/page.tsx")));
    assert!(result.reachable.contains(&id("src/components/widget.tsx")));
    assert_eq!(result.candidates, vec![id("src/components/orphan.tsx")]);
}

#[test]
fn test_reachable_modules_never_candidates() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/app/layout.tsx", "import { Nav } from '../components/nav';\n");
    write_old(root, "src/components/nav.tsx", "export { Link } from './link';\n");
    write_old(root, "src/components/link.tsx", "const theme = require('./theme');\n");
    write_old(root, "src/components/theme.ts", "module.exports = {};\n");
    write_old(root, "src/components/lazy.tsx", "export default 1;\n");
    write_old(root, "src/components/loader.tsx", "const Lazy = import('./lazy');\n");

    let config = Config::default();
    let graph = build_graph(root, &config, &["src"]);
    let entry_points = EntryPointClassifier::new(&config.entry_points).unwrap().classify(&graph);
    let protection = ProtectionSet::permanent();
    let result = ReachabilityEngine::new(&protection).analyze(&graph, &entry_points);

    for path in [
        "src/components/nav.tsx",
        "src/components/link.tsx",
        "src/components/theme.ts",
    ] {
        assert!(result.reachable.contains(&id(path)), "{} should be reachable", path);
        assert!(!result.candidates.contains(&id(path)));
    }

    // loader is unreached, so the module only it imports is unreached too
    assert!(result.candidates.contains(&id("src/components/loader.tsx")));
    assert!(result.candidates.contains(&id("src/components/lazy.tsx")));
}

#[test]
fn test_protected_files_never_candidates() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/lib/date.ts", "export const d = 1;\n");
    write_old(root, "src/lib/date.test.ts", "import { d } from './date';\n");
    write_old(root, "src/lib/__mocks__/fetch.ts", "export {};\n");
    write_old(root, "src/types/global.d.ts", "declare const x: number;\n");

    let report = run_agent(root, &Config::default(), backend(&["src/lib", "src/types"]).dry_run(true));

    for path in ["src/lib/date.test.ts", "src/lib/__mocks__/fetch.ts", "src/types/global.d.ts"] {
        assert!(!report.results.candidates.contains(&id(path)), "{} must not be a candidate", path);
        assert_eq!(skip_reason(&report, path), Some(SkipReason::ProtectedPattern));
    }
}

#[test]
fn test_parallel_matches_sequential() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/app/page.tsx", "import { a } from '@/lib/a';\n");
    write_old(root, "src/lib/a.ts", "export * from './b';\nexport const a = 1;\n");
    write_old(root, "src/lib/b.ts", "export const b = 2;\n");
    write_old(root, "src/lib/c.ts", "import { b } from './b';\n");
    write_old(root, "src/lib/d/index.ts", "export const d = 4;\n");

    let config = Config::default();
    let scope = vec!["src".to_string()];
    let files = FileFinder::new(&config).find_files(root, &scope);

    let sequential = build_graph(root, &config, &["src"]);
    let parallel = ParallelGraphBuilder::new()
        .build_from_files(&files, Box::new(HeuristicResolver::new(root, &config.resolver)))
        .graph;

    assert_eq!(sequential.module_count(), parallel.module_count());
    assert_eq!(sequential.reference_count(), parallel.reference_count());
    for module in sequential.module_ids() {
        let mut expected = sequential.dependencies(module);
        let mut actual = parallel.dependencies(module);
        expected.sort();
        actual.sort();
        assert_eq!(expected, actual, "dependencies of {}", module);
    }
}

// ============================================================================
// Corpus verification
// ============================================================================

#[test]
fn test_corpus_mention_withdraws_candidate() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/utils/helper.ts", "export function help() {}\n");
    write_old(root, "src/utils/stray.ts", "export function stray() {}\n");
    write_old(root, "src/config/registry.ts", "export const plugins = [\"utils/helper\"];\n");

    let report = run_agent(root, &Config::default(), backend(&["src/utils"]).dry_run(true));

    assert!(report.results.candidates.contains(&id("src/utils/helper.ts")));
    let skipped = report
        .results
        .skipped
        .iter()
        .find(|s| s.file == id("src/utils/helper.ts"))
        .unwrap();
    assert_eq!(skipped.reason, SkipReason::CorpusUsage);
    assert_eq!(skipped.reason.to_string(), "found usage in corpus search");
    assert_eq!(skipped.detail.as_deref(), Some("src/config/registry.ts"));

    assert_eq!(report.results.cleared, vec![id("src/utils/stray.ts")]);
}

#[test]
fn test_mention_in_non_source_file_counts() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/lib/legacy.ts", "export const legacy = true;\n");
    write_old(root, "scripts/build.sh", "node -e \"require('src/lib/legacy')\"\n");

    let report = run_agent(root, &Config::default(), backend(&["src/lib"]).dry_run(true));

    assert_eq!(skip_reason(&report, "src/lib/legacy.ts"), Some(SkipReason::CorpusUsage));
    assert!(report.results.cleared.is_empty());
}

#[test]
fn test_mention_in_non_utf8_file_counts() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/lib/legacy.ts", "export const legacy = true;\n");
    fs::create_dir_all(root.join("scripts")).unwrap();
    fs::write(root.join("scripts/build.sh"), b"# caf\xe9 build\nnode -e \"require('src/lib/legacy')\"\n").unwrap();

    let report = run_agent(root, &Config::default(), backend(&["src/lib"]).dry_run(true));

    assert_eq!(skip_reason(&report, "src/lib/legacy.ts"), Some(SkipReason::CorpusUsage));
    assert!(report.results.cleared.is_empty());
}

#[test]
fn test_unsearchable_file_keeps_candidates() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/lib/dead.ts", "export const dead = 1;\n");
    write_old(root, "src/lib/stale.ts", "export const stale = 2;\n");
    write_old(root, "assets/generated.txt", &"x".repeat(200));

    let mut config = Config::default();
    config.corpus.max_file_bytes = 64;
    let report = run_agent(root, &config, backend(&["src/lib"]).dry_run(true));

    assert!(report.results.cleared.is_empty());
    for path in ["src/lib/dead.ts", "src/lib/stale.ts"] {
        assert_eq!(skip_reason(&report, path), Some(SkipReason::SearchFailed));
    }
    let skipped = report.results.skipped.iter().find(|s| s.file.as_str() == "src/lib/dead.ts").unwrap();
    assert!(skipped.detail.as_deref().unwrap().contains("assets/generated.txt"));
}

// ============================================================================
// Safety filter
// ============================================================================

#[test]
fn test_recently_modified_candidate_skipped() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_aged(root, "src/lib/fresh.ts", "export const fresh = 1;\n", 2);
    write_old(root, "src/lib/stale.ts", "export const stale = 1;\n");

    let report = run_agent(root, &Config::default(), backend(&["src/lib"]).dry_run(true));

    assert_eq!(skip_reason(&report, "src/lib/fresh.ts"), Some(SkipReason::ModifiedRecently));
    assert_eq!(report.results.cleared, vec![id("src/lib/stale.ts")]);
}

#[test]
fn test_force_bypasses_grace_only_when_allowed() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_aged(root, "src/lib/fresh.ts", "export const fresh = 1;\n", 2);
    write_aged(root, "src/hooks/fresh.ts", "export const fresh = 2;\n", 2);

    let config = Config::default();

    let forced = run_agent(root, &config, backend(&["src/lib"]).dry_run(true).force(true));
    assert!(forced.force);
    assert_eq!(forced.results.cleared, vec![id("src/lib/fresh.ts")]);

    // the frontend profile does not allow --force
    let options = AgentOptions::new("frontend")
        .targets(vec!["src/hooks".to_string()])
        .dry_run(true)
        .force(true);
    let refused = run_agent(root, &config, options);
    assert!(!refused.force);
    assert_eq!(skip_reason(&refused, "src/hooks/fresh.ts"), Some(SkipReason::ModifiedRecently));
}

#[test]
fn test_critical_names_skipped() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/lib/AuthProvider.tsx", "export const AuthProvider = 1;\n");
    write_old(root, "src/lib/schemaUtils.ts", "export const s = 1;\n");

    let report = run_agent(root, &Config::default(), backend(&["src/lib"]).dry_run(true));

    assert_eq!(skip_reason(&report, "src/lib/AuthProvider.tsx"), Some(SkipReason::CriticalName));
    assert_eq!(skip_reason(&report, "src/lib/schemaUtils.ts"), Some(SkipReason::CriticalName));
    assert!(report.results.cleared.is_empty());
}

// ============================================================================
// Dry run and live runs
// ============================================================================

#[test]
fn test_dry_run_leaves_quarantine_empty() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    for name in ["one", "two", "three", "four", "five"] {
        write_old(root, &format!("src/lib/{}.ts", name), "export const x = 1;\n");
    }

    let config = Config::default();
    let report = run_agent(root, &config, backend(&["src/lib"]).dry_run(true));

    assert!(report.is_dry_run());
    assert_eq!(report.results.counts.candidates, 5);
    assert_eq!(report.results.counts.moved, 5);
    assert_eq!(report.results.counts.bytes_moved, 5 * "export const x = 1;\n".len() as u64);
    assert!(report.results.moved.is_empty());
    assert!(report.session.is_none());

    let workspace = Workspace::new(root, &config);
    assert!(!workspace.agent_quarantine_dir("backend").exists());
    assert!(workspace.usage_map().read().moved_files().is_empty());
    for name in ["one", "two", "three", "four", "five"] {
        assert!(root.join(format!("src/lib/{}.ts", name)).exists());
    }
}

#[test]
fn test_live_run_quarantines_and_records() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/app/page.tsx", "import { used } from '@/lib/used';\n");
    write_old(root, "src/lib/used.ts", "export const used = 1;\n");
    write_old(root, "src/lib/dead.ts", "export const dead = 1;\n");

    let config = Config::default();
    let report = run_agent(root, &config, backend(&["src/lib"]));

    assert_eq!(report.results.moved, vec![id("src/lib/dead.ts")]);
    assert!(!root.join("src/lib/dead.ts").exists());
    assert!(root.join("src/lib/used.ts").exists());

    let record = &report.results.quarantine[0];
    assert!(root.join(&record.quarantine_path).is_file());
    assert!(record.quarantine_path.starts_with("src/.shared_quarantine/backend/"));
    assert_eq!(report.results.counts.bytes_moved, "export const dead = 1;\n".len() as u64);

    let workspace = Workspace::new(root, &config);
    let usage = workspace.usage_map().read();
    assert_eq!(usage.moved_files(), vec![&id("src/lib/dead.ts")]);

    let entries = workspace.cleanup_log().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].counts.bytes_moved, report.results.counts.bytes_moved);
}

#[test]
fn test_second_run_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/app/page.tsx", "import { used } from '@/lib/used';\n");
    write_old(root, "src/lib/used.ts", "export const used = 1;\n");
    write_old(root, "src/lib/dead.ts", "export const dead = 1;\n");

    let config = Config::default();
    let first = run_agent(root, &config, backend(&["src/lib"]));
    assert_eq!(first.results.counts.moved, 1);

    let second = run_agent(root, &config, backend(&["src/lib"]));
    assert_eq!(second.results.counts.moved, 0);
    assert!(second.results.cleared.is_empty());
    assert!(!second.results.candidates.contains(&id("src/lib/dead.ts")));
    assert!(second.session.is_none());
    assert!(root.join("src/lib/used.ts").exists());
}

#[test]
fn test_agent_report_written_to_logs() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_old(root, "src/lib/dead.ts", "export const dead = 1;\n");

    let config = Config::default();
    let result_file = root.join("result.json");
    let mut options = backend(&["src/lib"]).dry_run(true);
    options.result_file = Some(result_file.clone());
    run_agent(root, &config, options);

    let report_path = Workspace::new(root, &config).agent_report_path("backend");
    let logged: AgentReport = serde_json::from_str(&fs::read_to_string(report_path).unwrap()).unwrap();
    let result: AgentReport = serde_json::from_str(&fs::read_to_string(result_file).unwrap()).unwrap();

    assert_eq!(logged.agent, "backend");
    assert!(logged.is_dry_run());
    assert_eq!(result.results.cleared, vec![id("src/lib/dead.ts")]);
}
