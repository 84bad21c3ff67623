use crate::graph::UnresolvedReference;
use std::path::Path;

/// Result of scanning a source file
#[derive(Debug, Default)]
pub struct ParseResult {
    /// Module specifiers in source order
    pub references: Vec<UnresolvedReference>,
}

/// Trait for reference extractors
pub trait Parser: Send + Sync {
    /// Extract module references from a file's text
    fn parse(&self, path: &Path, contents: &str) -> ParseResult;
}

/// How a module specifier names its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    /// Bare package name, resolved by the package manager
    External,
    /// `./x` or `../x`, relative to the importing file
    Relative,
    /// `/x`, relative to the project root
    Absolute,
    /// Starts with a configured alias prefix such as `@/`
    Aliased,
    /// Template literal with `${…}` segments
    Templated,
}

impl SpecifierKind {
    pub fn classify<'a>(specifier: &str, alias_prefixes: impl IntoIterator<Item = &'a str>) -> Self {
        if specifier.contains("${") {
            SpecifierKind::Templated
        } else if specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier == "."
            || specifier == ".."
        {
            SpecifierKind::Relative
        } else if specifier.starts_with('/') {
            SpecifierKind::Absolute
        } else if alias_prefixes.into_iter().any(|p| specifier.starts_with(p)) {
            SpecifierKind::Aliased
        } else {
            SpecifierKind::External
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(specifier: &str) -> SpecifierKind {
        SpecifierKind::classify(specifier, ["@/", "~/"])
    }

    #[test]
    fn test_specifier_kinds() {
        assert_eq!(classify("react"), SpecifierKind::External);
        assert_eq!(classify("@tanstack/react-query"), SpecifierKind::External);
        assert_eq!(classify("./button"), SpecifierKind::Relative);
        assert_eq!(classify(".."), SpecifierKind::Relative);
        assert_eq!(classify("/src/lib/db"), SpecifierKind::Absolute);
        assert_eq!(classify("@/lib/db"), SpecifierKind::Aliased);
        assert_eq!(classify("./icons/${name}"), SpecifierKind::Templated);
        assert_eq!(classify("next/link"), SpecifierKind::External);
    }
}
