use super::ModuleId;
use serde::{Deserialize, Serialize};

/// Kind of reference between modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// `import x from '…'` or `export … from '…'`
    Static,

    /// `import '…'` with no bindings
    SideEffect,

    /// `import('…')` with a literal specifier
    Dynamic,

    /// `require('…')` or `require.resolve('…')`
    Require,

    /// Template specifier with `${…}` segments; never followed by traversal
    UnresolvableDynamic,
}

impl ReferenceKind {
    /// Whether reachability may follow an edge of this kind
    pub fn is_traversable(&self) -> bool {
        !matches!(self, ReferenceKind::UnresolvableDynamic)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Static => "static",
            ReferenceKind::SideEffect => "side-effect",
            ReferenceKind::Dynamic => "dynamic",
            ReferenceKind::Require => "require",
            ReferenceKind::UnresolvableDynamic => "unresolvable-dynamic",
        }
    }
}

/// An edge in the module graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,

    /// 1-based line of the reference in the importing file
    pub line: usize,
}

impl Reference {
    pub fn new(kind: ReferenceKind, line: usize) -> Self {
        Self { kind, line }
    }
}

/// A specifier extracted from a file, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    /// Raw specifier text as written, e.g. `@/lib/db` or `./icons/${name}`
    pub specifier: String,

    pub kind: ReferenceKind,

    pub line: usize,
}

impl UnresolvedReference {
    pub fn new(specifier: impl Into<String>, kind: ReferenceKind, line: usize) -> Self {
        Self {
            specifier: specifier.into(),
            kind,
            line,
        }
    }
}

/// Reference from an in-scope module to an in-tree file outside the scope
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrossScopeReference {
    pub from: ModuleId,
    pub to: ModuleId,
}
