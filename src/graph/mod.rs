mod builder;
mod module;
mod parallel_builder;
pub mod reference;
mod resolver;

pub use builder::{BuildWarning, BuiltGraph, GraphBuilder};
pub use module::{normalize, ModuleId, ModuleNode};
pub use parallel_builder::ParallelGraphBuilder;
pub use reference::{CrossScopeReference, Reference, ReferenceKind, UnresolvedReference};
pub use resolver::{HeuristicResolver, ModuleResolver};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

/// The module dependency graph.
///
/// Forward edges point from an importing file to its dependency; the reverse
/// view is read off the same edges, so every node always has a (possibly
/// empty) set of dependents.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    inner: DiGraph<ModuleNode, Reference>,

    node_map: HashMap<ModuleId, NodeIndex>,

    /// In-tree files outside the scanned scope that scoped files depend on
    cross_scope: Vec<CrossScopeReference>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, returning the existing node if it is already present
    pub fn add_module(&mut self, node: ModuleNode) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&node.id) {
            return idx;
        }
        let id = node.id.clone();
        let idx = self.inner.add_node(node);
        self.node_map.insert(id, idx);
        idx
    }

    /// Add an edge between two known modules. Returns false if either end is missing.
    pub fn add_reference(&mut self, from: &ModuleId, to: &ModuleId, reference: Reference) -> bool {
        match (self.node_map.get(from), self.node_map.get(to)) {
            (Some(&from_idx), Some(&to_idx)) => {
                self.inner.add_edge(from_idx, to_idx, reference);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn add_cross_scope(&mut self, reference: CrossScopeReference) {
        self.cross_scope.push(reference);
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn module(&self, id: &ModuleId) -> Option<&ModuleNode> {
        self.node_map.get(id).and_then(|&idx| self.inner.node_weight(idx))
    }

    /// All module ids, sorted
    pub fn module_ids(&self) -> Vec<&ModuleId> {
        let mut ids: Vec<&ModuleId> = self.node_map.keys().collect();
        ids.sort();
        ids
    }

    /// Modules this module depends on through traversable edges
    pub fn dependencies(&self, id: &ModuleId) -> Vec<&ModuleId> {
        self.neighbors(id, Direction::Outgoing, |r| r.kind.is_traversable())
    }

    /// Modules that depend on this module through traversable edges
    pub fn dependents(&self, id: &ModuleId) -> Vec<&ModuleId> {
        self.neighbors(id, Direction::Incoming, |r| r.kind.is_traversable())
    }

    /// Modules whose templated specifiers could expand to this module
    pub fn dynamic_referrers(&self, id: &ModuleId) -> Vec<&ModuleId> {
        self.neighbors(id, Direction::Incoming, |r| !r.kind.is_traversable())
    }

    /// Check if a module has any traversable dependents
    pub fn has_dependents(&self, id: &ModuleId) -> bool {
        let Some(&idx) = self.node_map.get(id) else {
            return false;
        };
        self.inner
            .edges_directed(idx, Direction::Incoming)
            .any(|edge| edge.weight().kind.is_traversable())
    }

    fn neighbors(
        &self,
        id: &ModuleId,
        direction: Direction,
        keep: impl Fn(&Reference) -> bool,
    ) -> Vec<&ModuleId> {
        let Some(&idx) = self.node_map.get(id) else {
            return Vec::new();
        };

        let mut ids: Vec<&ModuleId> = self
            .inner
            .edges_directed(idx, direction)
            .filter(|edge| keep(edge.weight()))
            .filter_map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                self.inner.node_weight(other).map(|n| &n.id)
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn cross_scope_references(&self) -> &[CrossScopeReference] {
        &self.cross_scope
    }

    pub fn module_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn reference_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Get the underlying petgraph for traversal
    pub fn inner(&self) -> &DiGraph<ModuleNode, Reference> {
        &self.inner
    }

    pub fn node_index(&self, id: &ModuleId) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }
}
