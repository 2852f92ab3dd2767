//! Repository-wide dependency graph.
//!
//! Directed, cycles legal. Storage is BTreeMap-keyed so iteration order
//! (and therefore everything derived from it) is deterministic for a
//! fixed symbol/edge set.

mod builder;

pub use builder::{AnalyzedFile, GraphBuilder};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Edge, EdgeKind, Symbol, SymbolId};

/// A per-file extraction failure recorded during a graph build.
///
/// Non-fatal: the file still contributes an isolated file symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseFailure {
    pub path: String,
    pub reason: String,
}

/// All symbols and edges for one repository snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    symbols: BTreeMap<SymbolId, Symbol>,
    /// Edge weights keyed by (source, target, kind); deduplication and
    /// commutative accumulation happen on insert
    edges: BTreeMap<(SymbolId, SymbolId, EdgeKind), u32>,
    parse_failures: Vec<ParseFailure>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Insert a symbol. Re-inserting the same id keeps the first
    /// definition (extraction output is immutable).
    pub fn insert_symbol(&mut self, symbol: Symbol) {
        self.symbols.entry(symbol.id.clone()).or_insert(symbol);
    }

    /// Accumulate weight on an edge. Both endpoints must already exist;
    /// unknown endpoints are rejected so the endpoint invariant can never
    /// be violated by a buggy adapter.
    pub fn add_edge(&mut self, source: &SymbolId, target: &SymbolId, kind: EdgeKind, weight: u32) {
        if !self.symbols.contains_key(source) || !self.symbols.contains_key(target) {
            tracing::warn!(%source, %target, "edge endpoint missing, dropping");
            return;
        }
        *self
            .edges
            .entry((source.clone(), target.clone(), kind))
            .or_insert(0) += weight.max(1);
    }

    pub fn record_parse_failure(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.parse_failures.push(ParseFailure {
            path: path.into(),
            reason: reason.into(),
        });
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn symbol(&self, id: &SymbolId) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    pub fn contains(&self, id: &SymbolId) -> bool {
        self.symbols.contains_key(id)
    }

    /// All symbols in deterministic (id) order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    /// Repository symbols only (synthetic external targets excluded).
    /// This is the set the partitioner must cover.
    pub fn repo_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values().filter(|s| !s.is_external())
    }

    pub fn repo_symbol_ids(&self) -> BTreeSet<SymbolId> {
        self.repo_symbols().map(|s| s.id.clone()).collect()
    }

    /// All edges in deterministic key order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges
            .iter()
            .map(|((source, target, kind), weight)| Edge {
                source: source.clone(),
                target: target.clone(),
                kind: *kind,
                weight: *weight,
            })
    }

    /// Edges with both endpoints inside `members`.
    pub fn edges_within<'a>(
        &'a self,
        members: &'a BTreeSet<SymbolId>,
    ) -> impl Iterator<Item = Edge> + 'a {
        self.edges()
            .filter(|e| members.contains(&e.source) && members.contains(&e.target))
    }

    /// Edges crossing the boundary of `members` (exactly one endpoint
    /// inside), the neighborhood an agent sees for a node.
    pub fn boundary_edges<'a>(
        &'a self,
        members: &'a BTreeSet<SymbolId>,
    ) -> impl Iterator<Item = Edge> + 'a {
        self.edges()
            .filter(|e| members.contains(&e.source) != members.contains(&e.target))
    }

    /// Sum of symbol weights over `members`.
    pub fn total_weight(&self, members: &BTreeSet<SymbolId>) -> u64 {
        members
            .iter()
            .filter_map(|id| self.symbols.get(id))
            .map(|s| s.weight)
            .sum()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn parse_failures(&self) -> &[ParseFailure] {
        &self.parse_failures
    }
}
