use crate::config::EntryPointConfig;
use crate::graph::{ModuleGraph, ModuleId};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Why a module is treated as always reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryReason {
    /// Listed as a fixed, well-known path
    WellKnownPath,
    /// File name the framework loads by convention
    ConventionName,
    /// Nothing imports it and it sits under a root directory
    OrphanUnderRoot,
}

impl EntryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryReason::WellKnownPath => "well-known path",
            EntryReason::ConventionName => "framework convention",
            EntryReason::OrphanUnderRoot => "no dependents under root directory",
        }
    }
}

/// Modules considered always reachable, with the first reason that applied
#[derive(Debug, Clone, Default)]
pub struct EntryPointSet {
    entries: BTreeMap<ModuleId, EntryReason>,
}

impl EntryPointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry point; an existing reason is kept
    pub fn insert(&mut self, id: ModuleId, reason: EntryReason) {
        self.entries.entry(id).or_insert(reason);
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn reason(&self, id: &ModuleId) -> Option<EntryReason> {
        self.entries.get(id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleId, EntryReason)> {
        self.entries.iter().map(|(id, reason)| (id, *reason))
    }

    pub fn count_by(&self, reason: EntryReason) -> usize {
        self.entries.values().filter(|r| **r == reason).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Classifies graph nodes the hosting framework loads on its own
pub struct EntryPointClassifier<'a> {
    config: &'a EntryPointConfig,
    convention: Option<Regex>,
}

impl<'a> EntryPointClassifier<'a> {
    pub fn new(config: &'a EntryPointConfig) -> Result<Self, regex::Error> {
        let convention = if config.conventions.is_empty() {
            None
        } else {
            let names: Vec<String> = config.conventions.iter().map(|n| regex::escape(n)).collect();
            Some(Regex::new(&format!(r"^(?:{})\.[cm]?[jt]sx?$", names.join("|")))?)
        };

        Ok(Self { config, convention })
    }

    /// Compute the entry point set for a built graph
    pub fn classify(&self, graph: &ModuleGraph) -> EntryPointSet {
        let mut entry_points = EntryPointSet::new();

        // Step 1: Fixed well-known paths
        for path in &self.config.well_known {
            if let Some(id) = ModuleId::new(path) {
                if graph.contains(&id) {
                    entry_points.insert(id, EntryReason::WellKnownPath);
                }
            }
        }

        for id in graph.module_ids() {
            // Step 2: Framework file-name conventions
            if self.is_convention_name(id) {
                entry_points.insert(id.clone(), EntryReason::ConventionName);
                continue;
            }

            // Step 3: Files nothing imports, under a root directory
            if self.config.orphans_under_roots && !graph.has_dependents(id) && self.is_under_root(id) {
                debug!("Orphan root: {}", id);
                entry_points.insert(id.clone(), EntryReason::OrphanUnderRoot);
            }
        }

        debug!(
            "Entry points: {} well-known, {} convention, {} orphan",
            entry_points.count_by(EntryReason::WellKnownPath),
            entry_points.count_by(EntryReason::ConventionName),
            entry_points.count_by(EntryReason::OrphanUnderRoot),
        );

        entry_points
    }

    fn is_convention_name(&self, id: &ModuleId) -> bool {
        self.convention
            .as_ref()
            .map(|re| re.is_match(id.file_name()))
            .unwrap_or(false)
    }

    fn is_under_root(&self, id: &ModuleId) -> bool {
        self.config.root_dirs.iter().any(|dir| id.is_under(dir))
    }
}
