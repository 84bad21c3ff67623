//! deadsweep - dead-file detection and reversible quarantine for
//! TypeScript/JavaScript projects, safe to run as several cooperating agents.
//!
//! # Architecture
//!
//! Each agent run is a pipeline over one scope of the tree:
//! 1. **File Discovery** - Find source files under the agent's scope directories
//! 2. **Graph Building** - Extract import/require references and resolve them to in-tree modules
//! 3. **Entry Point Classification** - Well-known paths, framework conventions, orphan roots
//! 4. **Reachability Analysis** - Modules not reached from any entry point become candidates
//! 5. **Corpus Verification** - Withdraw candidates whose path appears anywhere else in the repository
//! 6. **Safety Filtering** - Cross-agent references, grace period, critical names
//! 7. **Quarantine** - Move survivors under a cross-process lock, with hash sidecars for rollback
//!
//! Agents share state only through the filesystem: the quarantine lock, the
//! usage map and the append-only cleanup and rollback logs. The coordinator
//! launches agents as separate processes and merges their structured results.

pub mod agent;
pub mod analysis;
pub mod config;
pub mod coordination;
pub mod coordinator;
pub mod discovery;
pub mod graph;
pub mod parser;
pub mod quarantine;
pub mod report;

pub use agent::{Agent, AgentError, AgentOptions, AgentReport};
pub use analysis::{ReachabilityEngine, SafetyFilter, SkipReason};
pub use config::Config;
pub use coordination::{FileLock, LockGuard, UsageMapStore, Workspace};
pub use coordinator::{Coordinator, CoordinatorOptions, CoordinatorReport, ProcessLauncher};
pub use discovery::FileFinder;
pub use graph::{ModuleGraph, ModuleId};
pub use quarantine::{QuarantineMover, QuarantineRecord, SessionRestorer};
pub use report::{ReportFormat, Reporter};
