use crate::config::Config;
use crate::graph::ModuleId;
use ignore::WalkBuilder;
use miette::{IntoDiagnostic, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Type of source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    TypeScript,
    TypeScriptReact,
    TypeDeclaration,
    JavaScript,
    JavaScriptReact,
}

impl FileType {
    /// Determine file type from path
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        let file_name = path.file_name()?.to_str()?;

        match extension {
            "ts" | "mts" | "cts" if file_name.contains(".d.") => Some(FileType::TypeDeclaration),
            "ts" | "mts" | "cts" => Some(FileType::TypeScript),
            "tsx" => Some(FileType::TypeScriptReact),
            "js" | "mjs" | "cjs" => Some(FileType::JavaScript),
            "jsx" => Some(FileType::JavaScriptReact),
            _ => None,
        }
    }

    /// Declaration-only files never hold runtime code
    pub fn is_type_declaration(&self) -> bool {
        matches!(self, FileType::TypeDeclaration)
    }
}

/// Represents a discovered source file
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Absolute path to the file
    pub path: PathBuf,

    /// Path relative to the project root
    pub id: ModuleId,

    /// Type of source file
    pub file_type: FileType,
}

impl SourceFile {
    pub fn new(path: PathBuf, id: ModuleId, file_type: FileType) -> Self {
        Self { path, id, file_type }
    }

    /// Load and return owned contents
    pub fn read_contents(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).into_diagnostic()
    }
}

/// File finder for discovering source files in a project
pub struct FileFinder<'a> {
    config: &'a Config,
}

impl<'a> FileFinder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Find all source files under the scope directories (relative to `root`).
    /// An empty scope scans the whole root. Overlapping scopes are deduplicated
    /// and the result is sorted by path.
    pub fn find_files(&self, root: &Path, scope: &[String]) -> Vec<SourceFile> {
        debug!("Scanning for files in: {}", root.display());

        let targets: Vec<PathBuf> = if scope.is_empty() {
            vec![root.to_path_buf()]
        } else {
            scope.iter().map(|dir| root.join(dir)).collect()
        };

        let found: Vec<SourceFile> = targets
            .par_iter()
            .flat_map(|target| self.scan_directory(root, target))
            .collect();

        let unique: BTreeMap<ModuleId, SourceFile> =
            found.into_iter().map(|f| (f.id.clone(), f)).collect();

        debug!("Found {} files", unique.len());
        unique.into_values().collect()
    }

    /// Scan a single directory for source files
    fn scan_directory(&self, root: &Path, dir: &Path) -> Vec<SourceFile> {
        if !dir.exists() {
            trace!("Directory does not exist: {}", dir.display());
            return Vec::new();
        }

        let coordination_dir = root.join(&self.config.coordination.dir);

        let walker = WalkBuilder::new(dir)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .parents(true)
            .follow_links(false)
            .build();

        walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let path = entry.path();

                if path.starts_with(&coordination_dir) {
                    return None;
                }

                let ext = path.extension()?.to_str()?;
                if !self.config.is_source_extension(ext) {
                    return None;
                }

                let id = ModuleId::from_path(root, path)?;
                if self.config.should_exclude(Path::new(id.as_str())) {
                    trace!("Excluding: {}", id);
                    return None;
                }

                let file_type = FileType::from_path(path)?;
                trace!("Found {:?}: {}", file_type, id);
                Some(SourceFile::new(path.to_path_buf(), id, file_type))
            })
            .collect()
    }
}
