use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Identity of a module: its path relative to the project root, `/`-separated,
/// with no `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Build an id from a relative path string, normalizing separators and dot segments.
    /// Returns `None` for paths that escape the root.
    pub fn new(relative: &str) -> Option<Self> {
        normalize(relative).map(Self)
    }

    /// Build an id for an absolute (or root-joined) path under `root`
    pub fn from_path(root: &Path, path: &Path) -> Option<Self> {
        let relative = path.strip_prefix(root).ok()?;
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?.to_string()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(Self(parts.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute location of this module under `root`
    pub fn to_path(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }

    /// Final path segment, e.g. `helper.ts`
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// File name up to the first dot, e.g. `button` for `button.test.tsx`
    pub fn base_stem(&self) -> &str {
        let name = self.file_name();
        name.split('.').next().unwrap_or(name)
    }

    /// Extension of the last segment, without the dot
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        let dot = name.rfind('.')?;
        if dot == 0 {
            return None;
        }
        Some(&name[dot + 1..])
    }

    /// Path with the final extension removed
    pub fn without_extension(&self) -> &str {
        match self.extension() {
            Some(ext) => &self.0[..self.0.len() - ext.len() - 1],
            None => &self.0,
        }
    }

    /// Directory containing this module, empty for root-level files
    pub fn parent_dir(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// True if the module lives at or below `dir` (a relative directory path)
    pub fn is_under(&self, dir: &str) -> bool {
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() {
            return true;
        }
        self.0.len() > dir.len() && self.0.starts_with(dir) && self.0.as_bytes()[dir.len()] == b'/'
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub id: ModuleId,

    /// Whether the module lies inside the scope being analyzed
    pub in_scope: bool,

    /// Number of references extracted from the module's text
    pub reference_count: usize,
}

impl ModuleNode {
    pub fn new(id: ModuleId) -> Self {
        Self {
            id,
            in_scope: true,
            reference_count: 0,
        }
    }
}

/// Lexically normalize a relative path: unify separators, drop `.` and resolve `..`.
/// Returns `None` if the path is empty or climbs above its root.
pub fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
