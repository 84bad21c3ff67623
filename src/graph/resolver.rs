use super::module::normalize;
use super::ModuleId;
use crate::config::ResolverConfig;
use crate::parser::SpecifierKind;
use std::path::{Path, PathBuf};

/// Maps a module specifier written in one file to an in-tree module.
///
/// Implementations decide what "in-tree" means; the graph builder only asks
/// for a target and never inspects the specifier itself.
pub trait ModuleResolver: Send + Sync {
    /// Resolve `specifier` as written in `from`. `None` means external or missing.
    fn resolve(&self, specifier: &str, from: &ModuleId) -> Option<ModuleId>;

    /// Resolve the static head of a templated specifier (the part before the
    /// first `${`) to a path prefix that matching modules start with.
    fn resolve_prefix(&self, template: &str, from: &ModuleId) -> Option<String>;
}

/// Resolver that tries a fixed list of suffixes and index files on disk
pub struct HeuristicResolver {
    root: PathBuf,
    suffixes: Vec<String>,
    index_files: Vec<String>,
    aliases: Vec<(String, String)>,
}

impl HeuristicResolver {
    pub fn new(root: &Path, config: &ResolverConfig) -> Self {
        // Longest alias first so `@/lib/` wins over `@/`
        let mut aliases: Vec<(String, String)> = config
            .aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        aliases.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            root: root.to_path_buf(),
            suffixes: config.suffixes.clone(),
            index_files: config.index_files.clone(),
            aliases,
        }
    }

    /// Turn a specifier into a root-relative path, or `None` for externals
    fn base_path(&self, specifier: &str, from: &ModuleId) -> Option<String> {
        let kind = SpecifierKind::classify(specifier, self.aliases.iter().map(|(prefix, _)| prefix.as_str()));

        match kind {
            SpecifierKind::Relative => {
                let dir = from.parent_dir();
                Some(if dir.is_empty() {
                    specifier.to_string()
                } else {
                    format!("{}/{}", dir, specifier)
                })
            }
            SpecifierKind::Absolute => specifier.strip_prefix('/').map(|rest| rest.to_string()),
            SpecifierKind::Aliased => self.aliases.iter().find_map(|(prefix, target)| {
                specifier
                    .strip_prefix(prefix.as_str())
                    .map(|rest| format!("{}{}", target, rest))
            }),
            SpecifierKind::External | SpecifierKind::Templated => None,
        }
    }

    fn is_file(&self, relative: &str) -> bool {
        self.root.join(relative).is_file()
    }
}

impl ModuleResolver for HeuristicResolver {
    fn resolve(&self, specifier: &str, from: &ModuleId) -> Option<ModuleId> {
        let specifier = specifier.split(['?', '#']).next().unwrap_or(specifier);
        let base = normalize(&self.base_path(specifier, from)?)?;

        let candidates = std::iter::once(base.clone())
            .chain(self.suffixes.iter().map(|s| format!("{}{}", base, s)))
            .chain(self.index_files.iter().map(|s| format!("{}{}", base, s)));

        for candidate in candidates {
            if self.is_file(&candidate) {
                return ModuleId::new(&candidate);
            }
        }
        None
    }

    fn resolve_prefix(&self, template: &str, from: &ModuleId) -> Option<String> {
        let head = template.split("${").next()?;
        if head.is_empty() {
            return None;
        }
        let base = self.base_path(head, from)?;
        let mut prefix = normalize(&base)?;
        if head.ends_with('/') {
            prefix.push('/');
        }
        Some(prefix)
    }
}
