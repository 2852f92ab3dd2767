//! Budget-constrained hierarchical clustering
//!
//! Greedy partitioning over the dependency graph: at each level, edges
//! below a rising weight threshold are removed and the connected
//! components of what remains become candidate groups. Candidates are
//! scored by retained internal edge weight minus a granularity penalty,
//! and a split is only accepted if no group falls below the minimum-unit
//! floor (indivisible single symbols excepted). Groups still above
//! budget recurse.
//!
//! Everything iterates over BTree-ordered data, so the tree shape is
//! identical on every run for a fixed graph and budget.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::partition as defaults;
use crate::graph::DependencyGraph;
use crate::types::{ModuleId, SymbolId};

use super::ModuleTree;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Weight ceiling per documentation unit (soft: an indivisible
    /// symbol above budget still becomes a leaf)
    pub budget: u64,
    /// Minimum unit size as a fraction of budget
    pub min_unit_fraction: f64,
    /// Score penalty per group away from the ideal group count
    pub granularity_penalty: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            budget: defaults::DEFAULT_BUDGET,
            min_unit_fraction: defaults::MIN_UNIT_FRACTION,
            granularity_penalty: defaults::GRANULARITY_PENALTY,
        }
    }
}

impl PartitionConfig {
    pub fn with_budget(budget: u64) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    fn floor(&self) -> u64 {
        (self.budget as f64 * self.min_unit_fraction).ceil() as u64
    }
}

/// Non-fatal findings recorded during partitioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PartitionWarning {
    /// A node could not be split below budget and stays a leaf
    Overflow {
        path: String,
        weight: u64,
        budget: u64,
    },
}

pub struct Partitioner {
    config: PartitionConfig,
}

impl Partitioner {
    pub fn new(config: PartitionConfig) -> Self {
        Self { config }
    }

    /// Partition all repository symbols into a module tree honoring the
    /// budget. Deterministic for a fixed graph and config.
    pub fn partition(
        &self,
        graph: &DependencyGraph,
        repo_name: &str,
    ) -> (ModuleTree, Vec<PartitionWarning>) {
        let members = graph.repo_symbol_ids();
        let total_weight = graph.total_weight(&members);
        let mut tree = ModuleTree::with_root(repo_name, members, total_weight);
        let mut warnings = Vec::new();

        // Whole repository fits in one call: single-leaf fast path.
        if total_weight <= self.config.budget {
            debug!(total_weight, budget = self.config.budget, "repository fits budget, single leaf");
            return (tree, warnings);
        }

        let mut queue: VecDeque<ModuleId> = VecDeque::new();
        queue.push_back(tree.root());

        while let Some(id) = queue.pop_front() {
            let (members, weight, path) = {
                let node = tree.node(id);
                (node.members.clone(), node.weight, node.path.clone())
            };

            if weight <= self.config.budget {
                continue;
            }
            if members.len() <= 1 {
                warn!(%path, weight, budget = self.config.budget, "indivisible unit above budget");
                warnings.push(PartitionWarning::Overflow {
                    path,
                    weight,
                    budget: self.config.budget,
                });
                continue;
            }

            match self.split(graph, &members) {
                Some(groups) => {
                    let names = group_names(graph, &groups);
                    for (group, name) in groups.into_iter().zip(names) {
                        let group_weight = graph.total_weight(&group);
                        let child = tree.add_child(id, name, group, group_weight);
                        if group_weight > self.config.budget {
                            queue.push_back(child);
                        }
                    }
                }
                None => {
                    warn!(%path, weight, "no feasible split, keeping over-budget leaf");
                    warnings.push(PartitionWarning::Overflow {
                        path,
                        weight,
                        budget: self.config.budget,
                    });
                }
            }
        }

        (tree, warnings)
    }

    /// Find the best split of `members`, or None if every candidate is
    /// infeasible (a clustering that produces a single group is not a
    /// split at all).
    fn split(
        &self,
        graph: &DependencyGraph,
        members: &BTreeSet<SymbolId>,
    ) -> Option<Vec<BTreeSet<SymbolId>>> {
        let pairs = undirected_pair_weights(graph, members);
        let total_weight = graph.total_weight(members);
        let floor = self.config.floor();

        let mut thresholds: Vec<u64> = pairs.values().copied().collect();
        thresholds.sort_unstable();
        thresholds.dedup();

        let mut best: Option<(i64, usize, u64, Vec<BTreeSet<SymbolId>>)> = None;

        for &threshold in &thresholds {
            let groups = components_at(members, &pairs, threshold);
            if groups.len() < 2 {
                continue;
            }
            if !self.feasible(graph, &groups, floor) {
                continue;
            }

            let score = self.score(&pairs, &groups, total_weight);
            let splits = file_splits(graph, &groups);

            // Higher score wins; ties prefer keeping same-file symbols
            // together, then the lower threshold.
            let better = match &best {
                None => true,
                Some((best_score, best_splits, best_threshold, _)) => {
                    score > *best_score
                        || (score == *best_score && splits < *best_splits)
                        || (score == *best_score
                            && splits == *best_splits
                            && threshold < *best_threshold)
                }
            };
            if better {
                best = Some((score, splits, threshold, groups));
            }
        }

        if let Some((_, _, _, groups)) = best {
            return Some(groups);
        }

        // No edge-driven split worked: fall back to grouping by source
        // file, which at least respects locality.
        let by_file = groups_by_file(graph, members);
        if by_file.len() >= 2 && self.feasible(graph, &by_file, floor) {
            return Some(by_file);
        }
        None
    }

    /// A candidate is feasible when no group falls below the minimum
    /// unit floor; a single indivisible symbol is always allowed.
    fn feasible(&self, graph: &DependencyGraph, groups: &[BTreeSet<SymbolId>], floor: u64) -> bool {
        groups
            .iter()
            .all(|g| g.len() == 1 || graph.total_weight(g) >= floor)
    }

    /// Score = retained internal edge weight - granularity penalty for
    /// straying from the ideal group count implied by the budget.
    fn score(
        &self,
        pairs: &BTreeMap<(SymbolId, SymbolId), u64>,
        groups: &[BTreeSet<SymbolId>],
        total_weight: u64,
    ) -> i64 {
        let retained: u64 = pairs
            .iter()
            .filter(|((a, b), _)| groups.iter().any(|g| g.contains(a) && g.contains(b)))
            .map(|(_, w)| *w)
            .sum();

        let ideal = (total_weight.div_ceil(self.config.budget)).max(2) as i64;
        let penalty = self.config.granularity_penalty as i64 * (groups.len() as i64 - ideal).abs();
        retained as i64 - penalty
    }
}

// =============================================================================
// Local subgraph helpers
// =============================================================================

/// Collapse directed, kinded edges into undirected pair weights for
/// clustering. Keyed (min, max) so accumulation is commutative.
fn undirected_pair_weights(
    graph: &DependencyGraph,
    members: &BTreeSet<SymbolId>,
) -> BTreeMap<(SymbolId, SymbolId), u64> {
    let mut pairs: BTreeMap<(SymbolId, SymbolId), u64> = BTreeMap::new();
    for edge in graph.edges_within(members) {
        if edge.source == edge.target {
            continue;
        }
        let key = if edge.source < edge.target {
            (edge.source, edge.target)
        } else {
            (edge.target, edge.source)
        };
        *pairs.entry(key).or_insert(0) += edge.weight as u64;
    }
    pairs
}

/// Connected components after dropping pairs below `threshold`.
/// Components are discovered in sorted symbol-id order, so the result
/// is deterministic and ordered by smallest member.
fn components_at(
    members: &BTreeSet<SymbolId>,
    pairs: &BTreeMap<(SymbolId, SymbolId), u64>,
    threshold: u64,
) -> Vec<BTreeSet<SymbolId>> {
    let mut adjacency: BTreeMap<&SymbolId, Vec<&SymbolId>> = BTreeMap::new();
    for ((a, b), weight) in pairs {
        if *weight >= threshold {
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }
    }

    let mut visited: BTreeSet<&SymbolId> = BTreeSet::new();
    let mut groups = Vec::new();
    for start in members {
        if visited.contains(start) {
            continue;
        }
        let mut group = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            group.insert(current.clone());
            if let Some(neighbors) = adjacency.get(current) {
                for &next in neighbors {
                    if !visited.contains(next) {
                        stack.push(next);
                    }
                }
            }
        }
        groups.push(group);
    }
    groups
}

/// Number of source files whose symbols land in more than one group.
fn file_splits(graph: &DependencyGraph, groups: &[BTreeSet<SymbolId>]) -> usize {
    let mut file_groups: BTreeMap<&str, BTreeSet<usize>> = BTreeMap::new();
    for (index, group) in groups.iter().enumerate() {
        for id in group {
            if let Some(file) = graph.symbol(id).and_then(|s| s.file()) {
                file_groups.entry(file).or_default().insert(index);
            }
        }
    }
    file_groups.values().filter(|g| g.len() > 1).count()
}

fn groups_by_file(
    graph: &DependencyGraph,
    members: &BTreeSet<SymbolId>,
) -> Vec<BTreeSet<SymbolId>> {
    let mut by_file: BTreeMap<String, BTreeSet<SymbolId>> = BTreeMap::new();
    for id in members {
        let file = graph
            .symbol(id)
            .and_then(|s| s.file())
            .unwrap_or("")
            .to_string();
        by_file.entry(file).or_default().insert(id.clone());
    }
    by_file.into_values().collect()
}

/// Derive sibling names from each group's dominant source file,
/// de-duplicated with a numeric suffix.
fn group_names(graph: &DependencyGraph, groups: &[BTreeSet<SymbolId>]) -> Vec<String> {
    let mut used: BTreeMap<String, u32> = BTreeMap::new();
    groups
        .iter()
        .map(|group| {
            let base = dominant_stem(graph, group);
            let count = used.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{}-{}", base, count)
            }
        })
        .collect()
}

fn dominant_stem(graph: &DependencyGraph, group: &BTreeSet<SymbolId>) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for id in group {
        if let Some(file) = graph.symbol(id).and_then(|s| s.file()) {
            *counts.entry(file).or_insert(0) += 1;
        }
    }
    let dominant = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(file, _)| *file)
        .unwrap_or("group");
    std::path::Path::new(dominant)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("group")
        .to_string()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EdgeKind, Symbol, SymbolKind};

    fn graph_abc() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (name, file) in [("A", "a.rs"), ("B", "b.rs"), ("C", "c.rs")] {
            graph.insert_symbol(
                Symbol::new(SymbolId::class(file, name), name, SymbolKind::Class)
                    .with_location(crate::types::SourceLocation::new(file, 1, 10))
                    .with_weight(3),
            );
        }
        let a = SymbolId::class("a.rs", "A");
        let b = SymbolId::class("b.rs", "B");
        let c = SymbolId::class("c.rs", "C");
        graph.add_edge(&a, &b, EdgeKind::Calls, 5);
        graph.add_edge(&b, &c, EdgeKind::Calls, 1);
        graph
    }

    #[test]
    fn test_strong_edge_dominates_grouping() {
        // A-B (weight 5) stays together, C (weight-1 link) is isolated.
        let graph = graph_abc();
        let partitioner = Partitioner::new(PartitionConfig::with_budget(6));
        let (tree, warnings) = partitioner.partition(&graph, "repo");

        assert!(warnings.is_empty());
        let leaves: Vec<_> = tree.leaves().collect();
        assert_eq!(leaves.len(), 2);

        let a = SymbolId::class("a.rs", "A");
        let b = SymbolId::class("b.rs", "B");
        let c = SymbolId::class("c.rs", "C");
        let ab_leaf = leaves
            .iter()
            .find(|l| l.members.contains(&a))
            .expect("leaf holding A");
        assert!(ab_leaf.members.contains(&b));
        assert!(!ab_leaf.members.contains(&c));
    }

    #[test]
    fn test_partition_is_deterministic() {
        let graph = graph_abc();
        let partitioner = Partitioner::new(PartitionConfig::with_budget(6));
        let (first, _) = partitioner.partition(&graph, "repo");
        let (second, _) = partitioner.partition(&graph, "repo");

        assert_eq!(first.len(), second.len());
        for (a, b) in first.nodes().zip(second.nodes()) {
            assert_eq!(a.path, b.path);
            assert_eq!(a.members, b.members);
            assert_eq!(a.children, b.children);
        }
    }

    #[test]
    fn test_single_leaf_when_under_budget() {
        let graph = graph_abc();
        let partitioner = Partitioner::new(PartitionConfig::with_budget(100));
        let (tree, warnings) = partitioner.partition(&graph, "repo");
        assert_eq!(tree.len(), 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_indivisible_symbol_stays_leaf_with_warning() {
        let mut graph = DependencyGraph::new();
        graph.insert_symbol(
            Symbol::new(SymbolId::class("huge.rs", "Huge"), "Huge", SymbolKind::Class)
                .with_location(crate::types::SourceLocation::new("huge.rs", 1, 9999))
                .with_weight(500),
        );
        let partitioner = Partitioner::new(PartitionConfig::with_budget(10));
        let (tree, warnings) = partitioner.partition(&graph, "repo");

        assert_eq!(tree.len(), 1);
        assert_eq!(warnings.len(), 1);
        let PartitionWarning::Overflow { weight, budget, .. } = &warnings[0];
        assert_eq!(*weight, 500);
        assert_eq!(*budget, 10);
    }

    #[test]
    fn test_coverage_and_disjointness_hold() {
        let graph = graph_abc();
        let partitioner = Partitioner::new(PartitionConfig::with_budget(6));
        let (tree, _) = partitioner.partition(&graph, "repo");
        tree.validate(&graph.repo_symbol_ids()).unwrap();
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arbitrary_graph(weights: &[u64], edges: &[(usize, usize, u32)]) -> DependencyGraph {
            let mut graph = DependencyGraph::new();
            for (i, &weight) in weights.iter().enumerate() {
                let file = format!("f{i}.rs");
                let name = format!("s{i}");
                graph.insert_symbol(
                    Symbol::new(
                        SymbolId::function(&file, &name),
                        &name,
                        SymbolKind::Function,
                    )
                    .with_location(crate::types::SourceLocation::new(&file, 1, 10))
                    .with_weight(weight),
                );
            }
            for &(a, b, w) in edges {
                if a < weights.len() && b < weights.len() && a != b {
                    let from = SymbolId::function(&format!("f{a}.rs"), &format!("s{a}"));
                    let to = SymbolId::function(&format!("f{b}.rs"), &format!("s{b}"));
                    graph.add_edge(&from, &to, EdgeKind::Calls, w);
                }
            }
            graph
        }

        proptest! {
            #[test]
            fn prop_partition_preserves_coverage_and_disjointness(
                weights in proptest::collection::vec(1u64..20, 2..8),
                edges in proptest::collection::vec((0usize..8, 0usize..8, 1u32..10), 0..16),
                budget in 5u64..60,
            ) {
                let graph = arbitrary_graph(&weights, &edges);
                let partitioner = Partitioner::new(PartitionConfig::with_budget(budget));
                let (tree, _) = partitioner.partition(&graph, "repo");
                prop_assert!(tree.validate(&graph.repo_symbol_ids()).is_ok());
            }

            #[test]
            fn prop_partition_is_deterministic(
                weights in proptest::collection::vec(1u64..20, 2..8),
                edges in proptest::collection::vec((0usize..8, 0usize..8, 1u32..10), 0..16),
                budget in 5u64..60,
            ) {
                let graph = arbitrary_graph(&weights, &edges);
                let partitioner = Partitioner::new(PartitionConfig::with_budget(budget));
                let (first, _) = partitioner.partition(&graph, "repo");
                let (second, _) = partitioner.partition(&graph, "repo");

                prop_assert_eq!(first.len(), second.len());
                for (a, b) in first.nodes().zip(second.nodes()) {
                    prop_assert_eq!(&a.path, &b.path);
                    prop_assert_eq!(&a.members, &b.members);
                }
            }
        }
    }

    #[test]
    fn test_disconnected_symbols_fall_back_to_file_groups() {
        let mut graph = DependencyGraph::new();
        for (name, file) in [("A", "x.rs"), ("B", "x.rs"), ("C", "y.rs"), ("D", "y.rs")] {
            graph.insert_symbol(
                Symbol::new(SymbolId::function(file, name), name, SymbolKind::Function)
                    .with_location(crate::types::SourceLocation::new(file, 1, 5))
                    .with_weight(4),
            );
        }
        // No edges at all: grouping must still split by file.
        let partitioner = Partitioner::new(PartitionConfig::with_budget(8));
        let (tree, warnings) = partitioner.partition(&graph, "repo");

        assert!(warnings.is_empty());
        tree.validate(&graph.repo_symbol_ids()).unwrap();
        let leaves: Vec<_> = tree.leaves().collect();
        assert_eq!(leaves.len(), 2);
        for leaf in leaves {
            let files: BTreeSet<_> = leaf
                .members
                .iter()
                .filter_map(|id| graph.symbol(id).and_then(|s| s.file()))
                .collect();
            assert_eq!(files.len(), 1);
        }
    }
}
