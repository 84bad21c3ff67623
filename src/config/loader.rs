use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a deadsweep run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source file extensions considered modules (without the dot)
    pub extensions: Vec<String>,

    /// Patterns to exclude from discovery
    pub exclude: Vec<String>,

    /// Where shared state and reports live
    pub coordination: CoordinationConfig,

    /// Cross-process lock tuning
    pub lock: LockConfig,

    /// Safety filter configuration
    pub safety: SafetyConfig,

    /// Usage map housekeeping
    pub usage_map: UsageMapConfig,

    /// Entry point classification
    pub entry_points: EntryPointConfig,

    /// Module specifier resolution
    pub resolver: ResolverConfig,

    /// Whole-repository text search
    pub corpus: CorpusConfig,

    /// Agent profiles keyed by agent name
    pub agents: BTreeMap<String, AgentProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Quarantine root and state files, relative to the project root
    pub dir: PathBuf,

    /// Per-run reports and rollback scripts, relative to the project root
    pub logs_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Age after which a lock marker is presumed abandoned
    pub stale_after_secs: u64,

    /// Give up acquiring after this long
    pub timeout_ms: u64,

    /// First backoff delay, doubled on each attempt
    pub base_delay_ms: u64,

    /// Backoff cap
    pub max_delay_ms: u64,

    /// Maximum number of backoff attempts
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Files modified within this many days are never quarantined
    pub grace_days: u64,

    /// Extra base-name patterns (regex) treated as critical for every agent
    pub critical_patterns: Vec<String>,

    /// Extra path patterns (regex) that are never candidates
    pub protected_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageMapConfig {
    /// Entries older than this are pruned
    pub retention_days: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryPointConfig {
    /// Relative paths that are always entry points
    pub well_known: Vec<String>,

    /// File stems the framework loads by convention
    pub conventions: Vec<String>,

    /// Subtrees whose dependency-free files count as roots
    pub root_dirs: Vec<String>,

    /// Treat files with no dependents under `root_dirs` as entry points
    pub orphans_under_roots: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Suffixes tried, in order, after the bare specifier
    pub suffixes: Vec<String>,

    /// Directory index files tried after the suffixes
    pub index_files: Vec<String>,

    /// Specifier prefix rewrites, e.g. `@/` -> `src/`
    pub aliases: BTreeMap<String, String>,

    /// Source roots stripped when building search variants
    pub source_roots: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory names skipped anywhere in the tree
    pub exclude_dirs: Vec<String>,

    /// File extensions never searched
    pub exclude_extensions: Vec<String>,

    /// Larger files cannot be searched and make the corpus incomplete
    pub max_file_bytes: u64,
}

/// How aggressive the critical-name filter is for an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriticalLevel {
    Standard,
    Extended,
}

/// Per-agent scope and safety settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Directories scanned by this agent, relative to the project root
    pub scope: Vec<String>,

    #[serde(default = "default_critical_level")]
    pub critical: CriticalLevel,

    /// Whether `--force` may bypass the grace period
    #[serde(default)]
    pub allow_force: bool,
}

fn default_critical_level() -> CriticalLevel {
    CriticalLevel::Standard
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensions: strings(&["ts", "tsx", "js", "jsx", "mjs", "cjs"]),
            exclude: strings(&[
                "**/node_modules/**",
                "**/.next/**",
                "**/dist/**",
                "**/build/**",
                "**/coverage/**",
            ]),
            coordination: CoordinationConfig::default(),
            lock: LockConfig::default(),
            safety: SafetyConfig::default(),
            usage_map: UsageMapConfig::default(),
            entry_points: EntryPointConfig::default(),
            resolver: ResolverConfig::default(),
            corpus: CorpusConfig::default(),
            agents: default_agents(),
        }
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("src/.shared_quarantine"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 300,
            timeout_ms: 30_000,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            max_retries: 10,
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            grace_days: 7,
            critical_patterns: vec![],
            protected_patterns: vec![],
        }
    }
}

impl Default for UsageMapConfig {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self {
            well_known: strings(&[
                "next.config.js",
                "next.config.mjs",
                "next.config.ts",
                "tailwind.config.js",
                "tailwind.config.ts",
                "postcss.config.js",
                "postcss.config.mjs",
                "src/middleware.ts",
                "src/middleware.js",
                "src/instrumentation.ts",
                "src/instrumentation.js",
                "src/pages/_app.tsx",
                "src/pages/_document.tsx",
            ]),
            conventions: strings(&[
                "page",
                "layout",
                "template",
                "loading",
                "error",
                "not-found",
                "global-error",
                "default",
                "route",
                "middleware",
                "instrumentation",
            ]),
            root_dirs: strings(&["src/app", "src/pages", "app", "pages"]),
            orphans_under_roots: true,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert("@/".to_string(), "src/".to_string());
        aliases.insert("~/".to_string(), "src/".to_string());

        Self {
            suffixes: strings(&[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"]),
            index_files: strings(&["/index.ts", "/index.tsx", "/index.js", "/index.jsx"]),
            aliases,
            source_roots: strings(&["src/"]),
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: strings(&["node_modules", ".next", ".git", "dist", "build", "coverage"]),
            exclude_extensions: strings(&["log", "map", "png", "jpg", "jpeg", "gif", "ico", "woff", "woff2"]),
            max_file_bytes: 4 * 1024 * 1024,
        }
    }
}

fn default_agents() -> BTreeMap<String, AgentProfile> {
    let mut agents = BTreeMap::new();
    agents.insert(
        "frontend".to_string(),
        AgentProfile {
            scope: strings(&["src/app", "src/components", "src/hooks", "src/styles"]),
            critical: CriticalLevel::Standard,
            allow_force: false,
        },
    );
    agents.insert(
        "backend".to_string(),
        AgentProfile {
            scope: strings(&[
                "src/app/api",
                "src/lib",
                "src/middleware",
                "src/types",
                "src/utils",
                "src/config",
                "src/constants",
                "supabase",
                "migrations",
            ]),
            critical: CriticalLevel::Extended,
            allow_force: true,
        },
    );
    agents.insert(
        "shared".to_string(),
        AgentProfile {
            scope: strings(&[
                "src/types",
                "src/utils",
                "src/constants",
                "src/config",
                "src/lib",
                "src/hooks",
                "src/context",
                "src/core",
            ]),
            critical: CriticalLevel::Extended,
            allow_force: false,
        },
    );
    agents
}

impl LockConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse YAML config"),
            "toml" => toml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse TOML config"),
            _ => {
                if let Ok(config) = serde_yaml::from_str(&contents) {
                    Ok(config)
                } else {
                    toml::from_str(&contents)
                        .into_diagnostic()
                        .wrap_err("Failed to parse config file")
                }
            }
        }
    }

    /// Try to load configuration from default locations
    pub fn from_default_locations(project_root: &Path) -> Result<Self> {
        let default_names = [
            ".deadsweep.yml",
            ".deadsweep.yaml",
            "deadsweep.yml",
            ".deadsweep.toml",
            "deadsweep.toml",
        ];

        for name in &default_names {
            let path = project_root.join(name);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Look up an agent profile by name
    pub fn agent(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.get(name)
    }

    /// Names of all configured agents in a stable order
    pub fn agent_names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// Check if a relative path matches an exclusion pattern
    pub fn should_exclude(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy().replace('\\', "/");
        self.exclude.iter().any(|pattern| glob_match(pattern, &path_str))
    }

    /// Check if a file extension is one of the configured module extensions
    pub fn is_source_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e == ext)
    }
}

/// Simple glob matching for patterns like "*.test.ts" or "**/dist/**"
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern.starts_with('*') && !pattern.contains('/') {
        return text.ends_with(&pattern[1..]);
    }

    if pattern.ends_with('*') && !pattern.contains('/') {
        return text.starts_with(&pattern[..pattern.len() - 1]);
    }

    if pattern.contains("**") {
        if pattern.starts_with("**/") && pattern.ends_with("/**") {
            // Whole directory name anywhere in the path
            let dir_name = pattern.trim_start_matches("**/").trim_end_matches("/**");
            let padded = format!("/{}/", text);
            return padded.contains(&format!("/{}/", dir_name));
        }

        let parts: Vec<&str> = pattern.split("**").collect();
        if parts.len() == 2 {
            let prefix = parts[0].trim_end_matches('/');
            let suffix = parts[1].trim_start_matches('/');

            return match (prefix.is_empty(), suffix.is_empty()) {
                (true, true) => true,
                (true, false) => text.ends_with(suffix),
                (false, true) => text.starts_with(prefix),
                (false, false) => text.starts_with(prefix) && text.ends_with(suffix),
            };
        }
    }

    text == pattern
}
