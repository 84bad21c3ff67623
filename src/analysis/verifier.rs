use super::{SkipReason, SkippedFile};
use crate::config::Config;
use crate::graph::{ModuleGraph, ModuleId};
use ignore::WalkBuilder;
use rayon::prelude::*;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("corpus root {0} is not a directory")]
    MissingRoot(PathBuf),

    #[error("invalid search pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("corpus search unavailable: {0}")]
    Unavailable(String),

    #[error("corpus incomplete, {count} files could not be searched (first: {first})")]
    Incomplete { count: usize, first: String },
}

/// Text variants that count as a mention of one candidate
#[derive(Debug, Clone)]
pub struct UsageQuery {
    pub candidate: ModuleId,

    /// Matched verbatim
    pub literals: Vec<String>,

    /// Regular expressions
    pub patterns: Vec<String>,
}

impl UsageQuery {
    /// Build the variants for a module: its path with and without the
    /// extension (plus the directory for index files), also with each source
    /// root stripped, each in three quote styles, plus import-like lines
    /// naming the extensionless path.
    pub fn for_module(id: &ModuleId, source_roots: &[String]) -> Self {
        let mut paths = vec![id.as_str().to_string(), id.without_extension().to_string()];
        if id.base_stem() == "index" && !id.parent_dir().is_empty() {
            paths.push(id.parent_dir().to_string());
        }

        let stripped: Vec<String> = paths
            .iter()
            .flat_map(|p| {
                source_roots
                    .iter()
                    .filter_map(move |root| p.strip_prefix(root.as_str()))
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| rest.to_string())
            })
            .collect();
        paths.extend(stripped);
        paths.dedup();

        let mut literals = Vec::new();
        let mut patterns = Vec::new();
        for path in &paths {
            for quote in ['"', '\'', '`'] {
                literals.push(format!("{quote}{path}{quote}"));
            }
            if !path.contains('.') || path.as_str() == id.without_extension() {
                let boundary = if path.ends_with(|c: char| c.is_alphanumeric() || c == '_') {
                    r"\b"
                } else {
                    ""
                };
                patterns.push(format!(
                    r#"\b(?:import|require|from)\b[^\n]*['"`/]{}{}"#,
                    regex::escape(path),
                    boundary
                ));
            }
        }

        Self {
            candidate: id.clone(),
            literals,
            patterns,
        }
    }

    /// Combine all variants into one regex
    pub fn to_regex(&self) -> Result<Regex, SearchError> {
        let alternatives: Vec<String> = self
            .literals
            .iter()
            .map(|l| regex::escape(l))
            .chain(self.patterns.iter().cloned())
            .collect();
        Ok(Regex::new(&alternatives.join("|"))?)
    }
}

/// Where a mention was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageHit {
    pub file: ModuleId,
    pub matched: String,
}

/// Whole-repository text search
pub trait CorpusSearch: Sync {
    /// Look for any variant of the query in files other than the candidate itself
    fn find_usage(&self, query: &UsageQuery) -> Result<Option<UsageHit>, SearchError>;
}

struct CorpusFile {
    id: ModuleId,
    text: String,
}

/// In-memory copy of every searchable text file in the repository
pub struct RepoCorpus {
    files: Vec<CorpusFile>,

    /// Files and directories that could not be loaded
    gaps: Vec<String>,
}

impl RepoCorpus {
    /// Load the corpus once per run. Dependency caches, build output, VCS
    /// metadata, the coordination directory and the logs directory are skipped.
    pub fn load(root: &Path, config: &Config) -> Result<Self, SearchError> {
        if !root.is_dir() {
            return Err(SearchError::MissingRoot(root.to_path_buf()));
        }

        let excluded_dirs = config.corpus.exclude_dirs.clone();
        let excluded_paths = vec![
            root.join(&config.coordination.dir),
            root.join(&config.coordination.logs_dir),
        ];

        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    let name = entry.file_name().to_string_lossy();
                    if excluded_dirs.iter().any(|d| d.as_str() == name.as_ref()) {
                        return false;
                    }
                }
                !excluded_paths.iter().any(|p| entry.path() == p.as_path())
            })
            .build();

        let mut gaps = Vec::new();
        let mut paths = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Corpus walk error: {}", e);
                    gaps.push(e.to_string());
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.into_path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !config.corpus.exclude_extensions.iter().any(|e| e == ext) {
                paths.push(path);
            }
        }

        let max_bytes = config.corpus.max_file_bytes;
        let loaded: Vec<Result<Option<CorpusFile>, String>> = paths
            .par_iter()
            .filter_map(|path| {
                let id = ModuleId::from_path(root, path)?;
                Some(read_corpus_file(id, path, max_bytes))
            })
            .collect();

        let mut files = Vec::with_capacity(loaded.len());
        for result in loaded {
            match result {
                Ok(Some(file)) => files.push(file),
                Ok(None) => {}
                Err(gap) => gaps.push(gap),
            }
        }

        if !gaps.is_empty() {
            warn!("{} corpus files could not be loaded, first: {}", gaps.len(), gaps[0]);
        }
        debug!("Corpus loaded: {} files", files.len());
        Ok(Self { files, gaps })
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Files that were found but could not be searched
    pub fn gaps(&self) -> &[String] {
        &self.gaps
    }
}

/// Decoded lossily so a stray non-UTF-8 byte never hides a path literal.
/// A file that vanished since the walk (moved by a concurrent agent) is skipped.
fn read_corpus_file(id: ModuleId, path: &Path, max_bytes: u64) -> Result<Option<CorpusFile>, String> {
    let gap = |e: std::io::Error| format!("{}: {}", id, e);

    let len = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(gap(e)),
    };
    if len > max_bytes {
        return Err(format!("{}: {} bytes exceeds the {} byte limit", id, len, max_bytes));
    }

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(gap(e)),
    };
    let text = String::from_utf8_lossy(&bytes).into_owned();
    Ok(Some(CorpusFile { id, text }))
}

impl CorpusSearch for RepoCorpus {
    /// A mention anywhere wins; without one, an incomplete corpus is an error
    fn find_usage(&self, query: &UsageQuery) -> Result<Option<UsageHit>, SearchError> {
        let regex = query.to_regex()?;

        let hit = self
            .files
            .par_iter()
            .filter(|file| file.id != query.candidate)
            .find_map_first(|file| {
                regex.find(&file.text).map(|m| UsageHit {
                    file: file.id.clone(),
                    matched: m.as_str().to_string(),
                })
            });

        match (hit, self.gaps.first()) {
            (Some(hit), _) => Ok(Some(hit)),
            (None, Some(first)) => Err(SearchError::Incomplete {
                count: self.gaps.len(),
                first: first.clone(),
            }),
            (None, None) => Ok(None),
        }
    }
}

/// Candidates split by the corpus check
#[derive(Debug, Default)]
pub struct Verification {
    pub retained: Vec<ModuleId>,
    pub withdrawn: Vec<SkippedFile>,
}

/// Re-checks graph candidates against raw text in the whole repository
pub struct CorpusVerifier<'a> {
    search: &'a dyn CorpusSearch,
    source_roots: &'a [String],
}

impl<'a> CorpusVerifier<'a> {
    pub fn new(search: &'a dyn CorpusSearch, source_roots: &'a [String]) -> Self {
        Self { search, source_roots }
    }

    pub fn verify(&self, graph: &ModuleGraph, candidates: Vec<ModuleId>) -> Verification {
        let mut verification = Verification::default();

        for candidate in candidates {
            let referrers = graph.dynamic_referrers(&candidate);
            if let Some(first) = referrers.first() {
                debug!("{} matches a template import in {}", candidate, first);
                let skipped = SkippedFile::new(candidate.clone(), SkipReason::DynamicReference)
                    .with_detail(first.as_str());
                verification.withdrawn.push(skipped);
                continue;
            }

            let query = UsageQuery::for_module(&candidate, self.source_roots);
            match self.search.find_usage(&query) {
                Ok(Some(hit)) => {
                    debug!("{} mentioned in {} ({})", candidate, hit.file, hit.matched);
                    let skipped = SkippedFile::new(candidate, SkipReason::CorpusUsage)
                        .with_detail(hit.file.as_str());
                    verification.withdrawn.push(skipped);
                }
                Ok(None) => verification.retained.push(candidate),
                Err(e) => {
                    warn!("Search failed for {}, keeping it: {}", candidate, e);
                    let skipped = SkippedFile::new(candidate, SkipReason::SearchFailed)
                        .with_detail(e.to_string());
                    verification.withdrawn.push(skipped);
                }
            }
        }

        verification
    }
}
