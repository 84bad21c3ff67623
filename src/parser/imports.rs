use super::common::{ParseResult, Parser};
use crate::graph::{ReferenceKind, UnresolvedReference};
use regex::{Captures, Regex};
use std::path::Path;

/// Extracts module specifiers from JavaScript/TypeScript source text.
///
/// This is a lexical pass, not a parse: it recognizes the common shapes of
/// `import`, `export … from`, `import()` and `require()` and ignores matches
/// that start on a comment line.
pub struct ImportParser {
    // import x from '…', export { y } from '…', import type z from '…'
    from_pattern: Regex,
    // import '…'
    side_effect_pattern: Regex,
    // import('…'), import(`…${x}`)
    dynamic_pattern: Regex,
    // require('…'), require.resolve('…')
    require_pattern: Regex,
}

impl ImportParser {
    pub fn new() -> Self {
        let from_pattern =
            Regex::new(r#"\bfrom\s*(?:'([^'\n]+)'|"([^"\n]+)")"#).expect("valid from pattern");

        let side_effect_pattern = Regex::new(r#"(?m)^\s*import\s*(?:'([^'\n]+)'|"([^"\n]+)")"#)
            .expect("valid side-effect pattern");

        let dynamic_pattern =
            Regex::new(r#"\bimport\s*\(\s*(?:'([^'\n]+)'|"([^"\n]+)"|`([^`]+)`)"#)
                .expect("valid dynamic import pattern");

        let require_pattern = Regex::new(
            r#"\brequire(?:\.resolve)?\s*\(\s*(?:'([^'\n]+)'|"([^"\n]+)"|`([^`]+)`)"#,
        )
        .expect("valid require pattern");

        Self {
            from_pattern,
            side_effect_pattern,
            dynamic_pattern,
            require_pattern,
        }
    }

    fn collect(
        &self,
        pattern: &Regex,
        kind: ReferenceKind,
        contents: &str,
        lines: &LineIndex,
        out: &mut Vec<UnresolvedReference>,
    ) {
        for caps in pattern.captures_iter(contents) {
            let Some(whole) = caps.get(0) else { continue };
            if lines.starts_in_comment(contents, whole.start()) {
                continue;
            }
            let Some((specifier, templated)) = specifier_of(&caps) else {
                continue;
            };
            let kind = if templated {
                ReferenceKind::UnresolvableDynamic
            } else {
                kind
            };
            out.push(UnresolvedReference::new(specifier, kind, lines.line_of(whole.start())));
        }
    }
}

impl Default for ImportParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for ImportParser {
    fn parse(&self, _path: &Path, contents: &str) -> ParseResult {
        let lines = LineIndex::new(contents);
        let mut references = Vec::new();

        self.collect(&self.from_pattern, ReferenceKind::Static, contents, &lines, &mut references);
        self.collect(&self.side_effect_pattern, ReferenceKind::SideEffect, contents, &lines, &mut references);
        self.collect(&self.dynamic_pattern, ReferenceKind::Dynamic, contents, &lines, &mut references);
        self.collect(&self.require_pattern, ReferenceKind::Require, contents, &lines, &mut references);

        references.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.specifier.cmp(&b.specifier)));
        references.dedup();

        ParseResult { references }
    }
}

/// Pull the specifier out of whichever quote alternative matched.
/// The flag is true for backtick specifiers containing `${`.
fn specifier_of(caps: &Captures<'_>) -> Option<(String, bool)> {
    for group in 1..=3 {
        if let Some(m) = caps.get(group) {
            let text = m.as_str().trim();
            if text.is_empty() {
                return None;
            }
            let templated = group == 3 && text.contains("${");
            return Some((text.to_string(), templated));
        }
    }
    None
}

/// Byte offsets of line starts, for turning match offsets into line numbers
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(contents: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(contents.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    fn starts_in_comment(&self, contents: &str, offset: usize) -> bool {
        let line_start = self.starts[self.line_of(offset) - 1];
        let prefix = contents[line_start..offset].trim_start();
        prefix.starts_with("//") || prefix.starts_with("/*") || prefix.starts_with('*')
    }
}
