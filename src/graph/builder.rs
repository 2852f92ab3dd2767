//! Graph builder
//!
//! Turns per-file adapter output into a repository-wide dependency graph.
//! Reference resolution happens here, against in-repository definitions
//! only; a reference with no in-repo target becomes a weighted edge to a
//! synthetic external symbol so the partitioner still sees its pull.
//!
//! Determinism: weight accumulation is commutative integer addition keyed
//! by (source, target, kind), so any permutation of the input files yields
//! an identical graph.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::adapter::{FileAnalysis, LanguageAdapter, SourceFile};
use crate::types::{SourceLocation, Symbol, SymbolId, SymbolKind};

use super::DependencyGraph;

/// One file's contribution to a build: either adapter output or a
/// recorded failure.
#[derive(Debug, Clone)]
pub enum AnalyzedFile {
    Parsed(FileAnalysis),
    Failed { path: String, reason: String },
}

pub struct GraphBuilder;

impl GraphBuilder {
    /// Run an adapter over every source file and build the graph.
    ///
    /// Per-file adapter errors are contained: the file becomes an
    /// isolated symbol and the failure is recorded on the graph.
    pub async fn build_with_adapter(
        adapter: &dyn LanguageAdapter,
        files: &[SourceFile],
    ) -> DependencyGraph {
        let mut analyzed = Vec::with_capacity(files.len());
        for file in files {
            match adapter.analyze(file).await {
                Ok(analysis) => analyzed.push(AnalyzedFile::Parsed(analysis)),
                Err(e) => {
                    warn!(path = %file.path, error = %e, "adapter failed, isolating file");
                    analyzed.push(AnalyzedFile::Failed {
                        path: file.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Self::build(analyzed)
    }

    /// Build a graph from already-analyzed files.
    pub fn build(files: Vec<AnalyzedFile>) -> DependencyGraph {
        let mut graph = DependencyGraph::new();

        // Pass 1: insert all definitions and build the resolution index.
        // The index maps bare names to defining symbol ids; collisions keep
        // every candidate so pass 2 can prefer same-file definitions and
        // fall back to the lexicographically smallest id.
        let mut definitions: BTreeMap<String, Vec<SymbolId>> = BTreeMap::new();

        for file in &files {
            match file {
                AnalyzedFile::Parsed(analysis) => {
                    Self::insert_file_symbols(&mut graph, &mut definitions, analysis);
                }
                AnalyzedFile::Failed { path, reason } => {
                    graph.insert_symbol(
                        Symbol::new(SymbolId::file(path), file_name(path), SymbolKind::File)
                            .with_location(SourceLocation::new(path, 1, 1)),
                    );
                    graph.record_parse_failure(path, reason);
                }
            }
        }

        for ids in definitions.values_mut() {
            ids.sort();
            ids.dedup();
        }

        // Pass 2: resolve references. Accumulation is commutative, so the
        // file order of this loop cannot affect final weights.
        for file in &files {
            let AnalyzedFile::Parsed(analysis) = file else {
                continue;
            };
            Self::resolve_references(&mut graph, &definitions, analysis);
        }

        debug!(
            symbols = graph.symbol_count(),
            edges = graph.edge_count(),
            parse_failures = graph.parse_failures().len(),
            "graph build complete"
        );
        graph
    }

    fn insert_file_symbols(
        graph: &mut DependencyGraph,
        definitions: &mut BTreeMap<String, Vec<SymbolId>>,
        analysis: &FileAnalysis,
    ) {
        let path = &analysis.path;
        let file_id = SymbolId::file(path);

        let mut file_symbol = Symbol::new(file_id.clone(), file_name(path), SymbolKind::File)
            .with_location(SourceLocation::new(path, 1, 1));
        if let Some(lang) = &analysis.language {
            file_symbol = file_symbol.with_language(lang.clone());
        }
        graph.insert_symbol(file_symbol);
        definitions.entry(path.clone()).or_default().push(file_id);

        for raw in &analysis.symbols {
            let id = symbol_id(path, &raw.name, raw.kind);
            let mut symbol = Symbol::new(id.clone(), &raw.name, raw.kind)
                .with_location(SourceLocation::new(path, raw.start_line, raw.end_line))
                .with_weight(raw.weight);
            if let Some(lang) = &analysis.language {
                symbol = symbol.with_language(lang.clone());
            }
            graph.insert_symbol(symbol);
            definitions.entry(raw.name.clone()).or_default().push(id);
        }
    }

    fn resolve_references(
        graph: &mut DependencyGraph,
        definitions: &BTreeMap<String, Vec<SymbolId>>,
        analysis: &FileAnalysis,
    ) {
        let path = &analysis.path;

        for reference in &analysis.references {
            let source = if reference.from.is_empty() {
                SymbolId::file(path)
            } else {
                resolve_local(analysis, &reference.from)
                    .unwrap_or_else(|| SymbolId::file(path))
            };

            let target = match definitions.get(&reference.target) {
                Some(candidates) => {
                    // Prefer a definition from the referencing file.
                    candidates
                        .iter()
                        .find(|id| id.as_str().contains(&format!(":{}:", path)))
                        .or_else(|| candidates.first())
                        .cloned()
                        .unwrap_or_else(|| SymbolId::external(&reference.target))
                }
                None => {
                    let external = Symbol::external(&reference.target);
                    let id = external.id.clone();
                    graph.insert_symbol(external);
                    id
                }
            };

            if source == target {
                continue;
            }
            graph.add_edge(&source, &target, reference.kind, 1);
        }
    }
}

/// Resolve a referencing symbol name against this file's own definitions.
fn resolve_local(analysis: &FileAnalysis, name: &str) -> Option<SymbolId> {
    analysis
        .symbols
        .iter()
        .find(|s| s.name == name)
        .map(|s| symbol_id(&analysis.path, &s.name, s.kind))
}

fn symbol_id(path: &str, name: &str, kind: SymbolKind) -> SymbolId {
    match kind {
        SymbolKind::Function => SymbolId::function(path, name),
        SymbolKind::Class => SymbolId::class(path, name),
        SymbolKind::Interface => SymbolId::interface(path, name),
        SymbolKind::File => SymbolId::file(path),
        SymbolKind::External => SymbolId::external(name),
    }
}

fn file_name(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}
