use super::{
    CrossScopeReference, ModuleGraph, ModuleId, ModuleNode, ModuleResolver, Reference,
    ReferenceKind, UnresolvedReference,
};
use crate::discovery::SourceFile;
use crate::parser::{ImportParser, Parser as SourceParser};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

/// A file that could not be added to the graph
#[derive(Debug, Clone, Serialize)]
pub struct BuildWarning {
    pub file: ModuleId,
    pub message: String,
}

/// Result of a graph build
#[derive(Debug)]
pub struct BuiltGraph {
    pub graph: ModuleGraph,
    pub warnings: Vec<BuildWarning>,
}

/// Builder for constructing the module graph.
///
/// Files are added first; references are resolved in `build` once every
/// readable file is a node, so edge targets never depend on scan order.
pub struct GraphBuilder {
    graph: ModuleGraph,

    parser: ImportParser,

    resolver: Box<dyn ModuleResolver>,

    /// References waiting for resolution, per importing file
    pending: Vec<(ModuleId, Vec<UnresolvedReference>)>,

    /// Files that failed to load and must not become targets
    unreadable: HashSet<ModuleId>,

    warnings: Vec<BuildWarning>,
}

impl GraphBuilder {
    pub fn new(resolver: Box<dyn ModuleResolver>) -> Self {
        Self {
            graph: ModuleGraph::new(),
            parser: ImportParser::new(),
            resolver,
            pending: Vec::new(),
            unreadable: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Read and scan a source file, adding it to the graph.
    /// Unreadable files are recorded as warnings and left out entirely.
    pub fn process_file(&mut self, file: &SourceFile) {
        match file.read_contents() {
            Ok(contents) => {
                debug!("Scanning {}", file.id);
                let parsed = self.parser.parse(&file.path, &contents);
                self.add_parsed(file.id.clone(), parsed.references);
            }
            Err(e) => self.add_unreadable(file.id.clone(), &e.to_string()),
        }
    }

    /// Add a module whose references have already been extracted
    pub fn add_parsed(&mut self, id: ModuleId, references: Vec<UnresolvedReference>) {
        let mut node = ModuleNode::new(id.clone());
        node.reference_count = references.len();
        self.graph.add_module(node);
        self.pending.push((id, references));
    }

    pub fn add_unreadable(&mut self, id: ModuleId, message: &str) {
        warn!("Skipping unreadable file {}: {}", id, message);
        self.warnings.push(BuildWarning {
            file: id.clone(),
            message: format!("could not read file: {}", message),
        });
        self.unreadable.insert(id);
    }

    /// Build the final graph, resolving all references
    pub fn build(mut self) -> BuiltGraph {
        let pending = std::mem::take(&mut self.pending);
        let mut seen_cross_scope = HashSet::new();

        for (from, references) in pending {
            for reference in references {
                if reference.kind == ReferenceKind::UnresolvableDynamic {
                    self.link_template(&from, &reference);
                    continue;
                }

                let Some(target) = self.resolver.resolve(&reference.specifier, &from) else {
                    debug!("Dropped reference {} in {}", reference.specifier, from);
                    continue;
                };

                if target == from || self.unreadable.contains(&target) {
                    continue;
                }

                if self.graph.contains(&target) {
                    self.graph
                        .add_reference(&from, &target, Reference::new(reference.kind, reference.line));
                } else if seen_cross_scope.insert((from.clone(), target.clone())) {
                    self.graph.add_cross_scope(CrossScopeReference { from: from.clone(), to: target });
                }
            }
        }

        debug!(
            "Graph built: {} modules, {} references",
            self.graph.module_count(),
            self.graph.reference_count()
        );

        BuiltGraph {
            graph: self.graph,
            warnings: self.warnings,
        }
    }

    /// Tag every module under a template's static prefix as a possible target
    fn link_template(&mut self, from: &ModuleId, reference: &UnresolvedReference) {
        let Some(prefix) = self.resolver.resolve_prefix(&reference.specifier, from) else {
            debug!("Template {} in {} has no in-tree prefix", reference.specifier, from);
            return;
        };

        let targets: Vec<ModuleId> = self
            .graph
            .module_ids()
            .into_iter()
            .filter(|id| *id != from && id.as_str().starts_with(&prefix))
            .cloned()
            .collect();

        for target in targets {
            self.graph.add_reference(
                from,
                &target,
                Reference::new(ReferenceKind::UnresolvableDynamic, reference.line),
            );
        }
    }
}
