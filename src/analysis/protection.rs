use crate::config::CriticalLevel;
use crate::graph::ModuleId;
use regex::{Regex, RegexBuilder};

/// What part of a module path a rule looks at
#[derive(Debug, Clone)]
pub enum Matcher {
    /// The whole root-relative path
    Path(Regex),
    /// Only the file name, case-insensitively
    BaseName(Regex),
}

/// A named predicate over module paths
#[derive(Debug, Clone)]
pub struct ProtectionRule {
    pub name: String,
    pub matcher: Matcher,
}

impl ProtectionRule {
    pub fn path(name: &str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            matcher: Matcher::Path(Regex::new(pattern)?),
        })
    }

    pub fn base_name(name: &str, pattern: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            name: name.to_string(),
            matcher: Matcher::BaseName(regex),
        })
    }

    pub fn matches(&self, id: &ModuleId) -> bool {
        match &self.matcher {
            Matcher::Path(regex) => regex.is_match(id.as_str()),
            Matcher::BaseName(regex) => regex.is_match(id.file_name()),
        }
    }
}

/// Ordered list of protection rules. The first matching rule wins, so sets
/// built for one scope can be composed with extra rules from another.
#[derive(Debug, Clone, Default)]
pub struct ProtectionSet {
    rules: Vec<ProtectionRule>,
}

impl ProtectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: ProtectionRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Append every rule of `other` after the existing ones
    pub fn extend(&mut self, other: ProtectionSet) {
        self.rules.extend(other.rules);
    }

    pub fn first_match(&self, id: &ModuleId) -> Option<&ProtectionRule> {
        self.rules.iter().find(|rule| rule.matches(id))
    }

    pub fn is_protected(&self, id: &ModuleId) -> bool {
        self.first_match(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Files that are never candidates, whatever the graph says
    pub fn permanent() -> Self {
        let rules = [
            ("test file", r"\.(test|spec)\.[cm]?[jt]sx?$", false),
            ("test directory", r"(^|/)__tests__/", false),
            ("mock directory", r"(^|/)__mocks__/", false),
            ("type declaration", r"\.d\.[cm]?ts$", false),
            (
                "framework file",
                r"^(page|layout|template|loading|error|not-found|global-error|default|route|middleware|instrumentation)\.[cm]?[jt]sx?$",
                true,
            ),
            ("tool config", r"\.config\.[cm]?[jt]s$", true),
            ("database migration", r"(^|/)(supabase|migrations)/", false),
        ];

        let mut set = Self::new();
        for (name, pattern, base_name) in rules {
            let rule = if base_name {
                ProtectionRule::base_name(name, pattern)
            } else {
                ProtectionRule::path(name, pattern)
            };
            set.rules.push(rule.expect("built-in protection pattern"));
        }
        set
    }

    /// Base-name substrings that mark a file as load-bearing
    pub fn critical(level: CriticalLevel) -> Self {
        let standard = ["middleware", "provider", "context", "config", "setup", "init"];
        let extended = ["schema", "migration", "database", "types", "constants", "core"];

        let names: Vec<&str> = match level {
            CriticalLevel::Standard => standard.to_vec(),
            CriticalLevel::Extended => standard.iter().chain(extended.iter()).copied().collect(),
        };

        let mut set = Self::new();
        for name in names {
            let rule = ProtectionRule::base_name(name, &regex::escape(name));
            set.rules.push(rule.expect("built-in critical pattern"));
        }
        set
    }

    /// Rules from user-supplied patterns
    pub fn from_patterns(patterns: &[String], base_name: bool) -> Result<Self, regex::Error> {
        let mut set = Self::new();
        for pattern in patterns {
            let rule = if base_name {
                ProtectionRule::base_name(pattern, pattern)?
            } else {
                ProtectionRule::path(pattern, pattern)?
            };
            set.rules.push(rule);
        }
        Ok(set)
    }
}
