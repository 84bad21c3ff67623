use super::{EntryPointSet, ProtectionSet};
use crate::graph::{ModuleGraph, ModuleId};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashSet, VecDeque};
use tracing::debug;

/// Output of a reachability pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityResult {
    /// Modules visited from the entry points
    pub reachable: BTreeSet<ModuleId>,

    /// Unvisited, unprotected modules, sorted by path
    pub candidates: Vec<ModuleId>,

    /// Unvisited modules kept by a permanent protection rule, with the rule name
    pub protected: Vec<(ModuleId, String)>,
}

/// Breadth-first reachability over the module graph
pub struct ReachabilityEngine<'a> {
    protection: &'a ProtectionSet,
}

impl<'a> ReachabilityEngine<'a> {
    pub fn new(protection: &'a ProtectionSet) -> Self {
        Self { protection }
    }

    pub fn analyze(&self, graph: &ModuleGraph, entry_points: &EntryPointSet) -> ReachabilityResult {
        let reachable = self.find_reachable(graph, entry_points);

        let mut candidates = Vec::new();
        let mut protected = Vec::new();

        // module_ids() is sorted, so both lists come out in path order
        for id in graph.module_ids() {
            if reachable.contains(id) {
                continue;
            }
            match self.protection.first_match(id) {
                Some(rule) => protected.push((id.clone(), rule.name.clone())),
                None => {
                    debug!("Unreachable: {}", id);
                    candidates.push(id.clone());
                }
            }
        }

        ReachabilityResult {
            reachable,
            candidates,
            protected,
        }
    }

    /// BFS from every entry point, never following unresolvable-dynamic edges
    fn find_reachable(&self, graph: &ModuleGraph, entry_points: &EntryPointSet) -> BTreeSet<ModuleId> {
        let inner = graph.inner();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        for id in entry_points.ids() {
            if let Some(idx) = graph.node_index(id) {
                if visited.insert(idx) {
                    queue.push_back(idx);
                }
            }
        }

        while let Some(idx) = queue.pop_front() {
            for edge in inner.edges_directed(idx, Direction::Outgoing) {
                if !edge.weight().kind.is_traversable() {
                    continue;
                }
                if visited.insert(edge.target()) {
                    queue.push_back(edge.target());
                }
            }
        }

        visited
            .into_iter()
            .filter_map(|idx| inner.node_weight(idx).map(|node| node.id.clone()))
            .collect()
    }
}
