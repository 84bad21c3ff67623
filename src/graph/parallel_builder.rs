// Parallel graph builder using rayon

use super::{BuiltGraph, GraphBuilder, ModuleId, ModuleResolver, UnresolvedReference};
use crate::discovery::SourceFile;
use crate::parser::{ImportParser, Parser as SourceParser};
use rayon::prelude::*;
use tracing::info;

/// Scan outcome for one file
enum ScannedFile {
    Parsed(ModuleId, Vec<UnresolvedReference>),
    Unreadable(ModuleId, String),
}

/// Parallel graph builder for large trees.
///
/// Reading and reference extraction run on the rayon pool; resolution is
/// handed to a sequential [`GraphBuilder`] so the result matches a serial build.
pub struct ParallelGraphBuilder {
    parser: ImportParser,
}

impl ParallelGraphBuilder {
    pub fn new() -> Self {
        Self {
            parser: ImportParser::new(),
        }
    }

    /// Build graph from source files using parallel processing
    pub fn build_from_files(&self, files: &[SourceFile], resolver: Box<dyn ModuleResolver>) -> BuiltGraph {
        info!("Scanning {} files in parallel...", files.len());

        let scanned: Vec<ScannedFile> = files.par_iter().map(|file| self.scan_file(file)).collect();

        let mut builder = GraphBuilder::new(resolver);
        for entry in scanned {
            match entry {
                ScannedFile::Parsed(id, references) => builder.add_parsed(id, references),
                ScannedFile::Unreadable(id, message) => builder.add_unreadable(id, &message),
            }
        }

        builder.build()
    }

    fn scan_file(&self, file: &SourceFile) -> ScannedFile {
        match file.read_contents() {
            Ok(contents) => {
                let parsed = self.parser.parse(&file.path, &contents);
                ScannedFile::Parsed(file.id.clone(), parsed.references)
            }
            Err(e) => ScannedFile::Unreadable(file.id.clone(), e.to_string()),
        }
    }
}

impl Default for ParallelGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::discovery::FileFinder;
    use crate::graph::HeuristicResolver;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parallel_matches_sequential() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/lib")).unwrap();
        for i in 0..20 {
            let next = (i + 1) % 20;
            fs::write(
                root.join(format!("src/lib/m{}.ts", i)),
                format!("import x from './m{}';\nconst y = require('../lib/m{}');\n", next, (i + 7) % 20),
            )
            .unwrap();
        }

        let config = Config::default();
        let files = FileFinder::new(&config).find_files(root, &["src".to_string()]);

        let parallel = ParallelGraphBuilder::new()
            .build_from_files(&files, Box::new(HeuristicResolver::new(root, &config.resolver)));

        let mut sequential = GraphBuilder::new(Box::new(HeuristicResolver::new(root, &config.resolver)));
        for file in &files {
            sequential.process_file(file);
        }
        let sequential = sequential.build();

        assert_eq!(parallel.graph.module_count(), 20);
        assert_eq!(parallel.graph.reference_count(), sequential.graph.reference_count());
        for id in sequential.graph.module_ids() {
            assert_eq!(parallel.graph.dependencies(id), sequential.graph.dependencies(id));
        }
    }
}
