//! Wiki assembly
//!
//! Pure, deterministic merge of finished documentation units into the
//! final wiki: one page per module node keyed by its path, a navigation
//! tree mirroring the module tree, and summary stats.
//!
//! Symbol ownership is re-derived here from the tree structure rather
//! than trusted from completion-order claims, so assembling the same
//! tree and units always yields byte-identical output. A unit whose
//! claim lost the re-derivation keeps a cross-reference to the winning
//! page instead of a description.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::partition::ModuleTree;
use crate::reference::ReferenceResolver;
use crate::types::{DocumentationUnit, ModuleId, SymbolId};

/// One rendered wiki page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    /// Page address, the node's slash-joined path
    pub path: String,
    pub title: String,
    /// Markdown body; a short notice for placeholder pages
    pub body: String,
    /// Symbols this page canonically documents
    pub described_symbols: Vec<SymbolId>,
    /// Links to symbols documented on other pages
    pub references: Vec<PageReference>,
    pub placeholder: bool,
}

/// A link from one page to the page owning a symbol's description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageReference {
    pub symbol: SymbolId,
    /// Path of the owning page
    pub target: String,
}

/// Navigation node mirroring the module tree shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavigationEntry {
    pub title: String,
    pub path: String,
    pub children: Vec<NavigationEntry>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WikiStats {
    pub page_count: usize,
    pub placeholder_count: usize,
    pub described_symbols: usize,
    pub cross_references: usize,
}

/// The assembled output of a documentation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wiki {
    pub pages: BTreeMap<String, Page>,
    pub navigation: NavigationEntry,
    pub stats: WikiStats,
}

pub struct Assembler;

impl Assembler {
    /// Merge units into a wiki. Every tree node yields a page; nodes
    /// without a usable unit get placeholders so coverage always holds.
    pub fn assemble(tree: &ModuleTree, units: &BTreeMap<ModuleId, DocumentationUnit>) -> Wiki {
        let owners = ReferenceResolver::rederive_ownership(tree, units);
        let mut pages = BTreeMap::new();
        let mut stats = WikiStats::default();

        for node in tree.nodes() {
            let page = match units.get(&node.id) {
                Some(unit) if !unit.placeholder => {
                    Self::page_from_unit(tree, node.id, unit, &owners)
                }
                Some(unit) => Self::placeholder_page(
                    node,
                    unit.meta.failure_reason.as_deref().unwrap_or("generation failed"),
                ),
                None => {
                    debug!(node = %node.path, "no unit for node, emitting placeholder");
                    Self::placeholder_page(node, "no documentation produced")
                }
            };

            stats.page_count += 1;
            if page.placeholder {
                stats.placeholder_count += 1;
            }
            stats.described_symbols += page.described_symbols.len();
            stats.cross_references += page.references.len();
            pages.insert(page.path.clone(), page);
        }

        Wiki {
            pages,
            navigation: Self::navigation(tree, tree.root()),
            stats,
        }
    }

    fn page_from_unit(
        tree: &ModuleTree,
        node: ModuleId,
        unit: &DocumentationUnit,
        owners: &BTreeMap<SymbolId, ModuleId>,
    ) -> Page {
        let mut described = Vec::new();
        let mut references = Vec::new();

        for symbol in &unit.described_symbols {
            match owners.get(symbol) {
                Some(owner) if *owner == node => described.push(symbol.clone()),
                // Lost the ownership re-derivation: demote to a link.
                Some(owner) => references.push(PageReference {
                    symbol: symbol.clone(),
                    target: tree.node(*owner).path.clone(),
                }),
                None => described.push(symbol.clone()),
            }
        }

        for outbound in &unit.references {
            // Prefer the re-derived owner over the completion-order one.
            // A resumed unit may also record an owner id minted by an
            // older, larger tree, so the recorded id is only a hint and
            // must survive a bounds check.
            let owner = owners
                .get(&outbound.symbol)
                .copied()
                .or_else(|| tree.owner_of(&outbound.symbol))
                .or_else(|| tree.get(outbound.owner).map(|n| n.id));
            let Some(owner) = owner else {
                debug!(symbol = %outbound.symbol, "reference target unknown in this tree, dropping");
                continue;
            };
            if owner == node {
                continue;
            }
            references.push(PageReference {
                symbol: outbound.symbol.clone(),
                target: tree.node(owner).path.clone(),
            });
        }

        references.sort();
        references.dedup();

        Page {
            path: unit.node_path.clone(),
            title: tree.node(node).name.clone(),
            body: unit.body.clone(),
            described_symbols: described,
            references,
            placeholder: false,
        }
    }

    fn placeholder_page(node: &crate::partition::ModuleNode, reason: &str) -> Page {
        Page {
            path: node.path.clone(),
            title: node.name.clone(),
            body: format!("Documentation unavailable: {reason}"),
            described_symbols: Vec::new(),
            references: Vec::new(),
            placeholder: true,
        }
    }

    fn navigation(tree: &ModuleTree, id: ModuleId) -> NavigationEntry {
        let node = tree.node(id);
        NavigationEntry {
            title: node.name.clone(),
            path: node.path.clone(),
            children: node
                .children
                .iter()
                .map(|&child| Self::navigation(tree, child))
                .collect(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::NodeStatus;
    use crate::types::{GenerationMeta, OutboundReference};
    use std::collections::BTreeSet;

    fn ids(names: &[&str]) -> BTreeSet<SymbolId> {
        names.iter().map(|n| SymbolId::new(*n)).collect()
    }

    fn unit(node: ModuleId, path: &str, body: &str, described: &[&str]) -> DocumentationUnit {
        DocumentationUnit {
            node,
            node_path: path.into(),
            body: body.into(),
            described_symbols: described.iter().map(|s| SymbolId::new(*s)).collect(),
            references: Vec::new(),
            placeholder: false,
            meta: GenerationMeta::default(),
        }
    }

    /// root(repo) -> left{a,b}, right{c}
    fn two_leaf_tree() -> (ModuleTree, ModuleId, ModuleId) {
        let mut tree = ModuleTree::with_root("repo", ids(&["a", "b", "c"]), 30);
        let left = tree.add_child(ModuleId::ROOT, "left", ids(&["a", "b"]), 20);
        let right = tree.add_child(ModuleId::ROOT, "right", ids(&["c"]), 10);
        for id in [ModuleId::ROOT, left, right] {
            tree.node_mut(id).status = NodeStatus::Documented;
        }
        (tree, left, right)
    }

    #[test]
    fn test_every_node_gets_a_page() {
        let (tree, left, right) = two_leaf_tree();
        let mut units = BTreeMap::new();
        units.insert(ModuleId::ROOT, unit(ModuleId::ROOT, "repo", "overview", &[]));
        units.insert(left, unit(left, "repo/left", "left docs", &["a", "b"]));
        units.insert(right, unit(right, "repo/right", "right docs", &["c"]));

        let wiki = Assembler::assemble(&tree, &units);
        assert_eq!(wiki.pages.len(), 3);
        assert_eq!(wiki.stats.page_count, 3);
        assert_eq!(wiki.stats.placeholder_count, 0);
        assert_eq!(wiki.pages["repo/left"].described_symbols.len(), 2);
    }

    #[test]
    fn test_missing_unit_becomes_placeholder() {
        let (tree, left, _right) = two_leaf_tree();
        let mut units = BTreeMap::new();
        units.insert(ModuleId::ROOT, unit(ModuleId::ROOT, "repo", "overview", &[]));
        units.insert(left, unit(left, "repo/left", "left docs", &[]));

        let wiki = Assembler::assemble(&tree, &units);
        assert_eq!(wiki.pages.len(), 3);
        assert!(wiki.pages["repo/right"].placeholder);
        assert_eq!(wiki.stats.placeholder_count, 1);
    }

    #[test]
    fn test_duplicate_claim_demoted_to_reference() {
        // Both the root and the left leaf claim "a"; the deeper node
        // must keep it and the root page must link instead.
        let (tree, left, right) = two_leaf_tree();
        let mut units = BTreeMap::new();
        units.insert(ModuleId::ROOT, unit(ModuleId::ROOT, "repo", "overview", &["a"]));
        units.insert(left, unit(left, "repo/left", "left docs", &["a", "b"]));
        units.insert(right, unit(right, "repo/right", "right docs", &["c"]));

        let wiki = Assembler::assemble(&tree, &units);

        let root_page = &wiki.pages["repo"];
        assert!(root_page.described_symbols.is_empty());
        assert_eq!(
            root_page.references,
            vec![PageReference {
                symbol: SymbolId::new("a"),
                target: "repo/left".into(),
            }]
        );
        assert!(
            wiki.pages["repo/left"]
                .described_symbols
                .contains(&SymbolId::new("a"))
        );
    }

    #[test]
    fn test_outbound_references_follow_rederived_owner() {
        let (tree, left, right) = two_leaf_tree();
        let mut units = BTreeMap::new();
        units.insert(ModuleId::ROOT, unit(ModuleId::ROOT, "repo", "overview", &[]));
        units.insert(right, unit(right, "repo/right", "right docs", &["c"]));

        // The left unit recorded a stale completion-order owner for "c".
        let mut left_unit = unit(left, "repo/left", "left docs", &["a"]);
        left_unit.references.push(OutboundReference {
            symbol: SymbolId::new("c"),
            owner: ModuleId::ROOT,
        });
        units.insert(left, left_unit);

        let wiki = Assembler::assemble(&tree, &units);
        assert_eq!(
            wiki.pages["repo/left"].references,
            vec![PageReference {
                symbol: SymbolId::new("c"),
                target: "repo/right".into(),
            }]
        );
    }

    #[test]
    fn test_stale_outbound_owner_is_dropped() {
        // A unit resumed from an earlier, larger run can reference a
        // node id this tree never minted. The reference is dropped, not
        // a panic.
        let mut tree = ModuleTree::with_root("repo", ids(&["a"]), 10);
        tree.node_mut(ModuleId::ROOT).status = NodeStatus::Documented;

        let mut root_unit = unit(ModuleId::ROOT, "repo", "docs", &["a"]);
        root_unit.references.push(OutboundReference {
            symbol: SymbolId::new("gone"),
            owner: ModuleId::new(5),
        });
        let mut units = BTreeMap::new();
        units.insert(ModuleId::ROOT, root_unit);

        let wiki = Assembler::assemble(&tree, &units);
        assert!(wiki.pages["repo"].references.is_empty());
        assert_eq!(wiki.stats.cross_references, 0);
    }

    #[test]
    fn test_stale_outbound_owner_reresolved_from_tree() {
        // The recorded owner id is stale but the symbol still lives in
        // this tree, so the link lands on its current owning page.
        let (tree, _left, right) = two_leaf_tree();
        let mut right_unit = unit(right, "repo/right", "right docs", &["c"]);
        right_unit.references.push(OutboundReference {
            symbol: SymbolId::new("a"),
            owner: ModuleId::new(9),
        });
        let mut units = BTreeMap::new();
        units.insert(right, right_unit);

        let wiki = Assembler::assemble(&tree, &units);
        assert_eq!(
            wiki.pages["repo/right"].references,
            vec![PageReference {
                symbol: SymbolId::new("a"),
                target: "repo/left".into(),
            }]
        );
    }

    #[test]
    fn test_navigation_mirrors_tree() {
        let (tree, _, _) = two_leaf_tree();
        let wiki = Assembler::assemble(&tree, &BTreeMap::new());

        assert_eq!(wiki.navigation.path, "repo");
        assert_eq!(wiki.navigation.children.len(), 2);
        assert_eq!(wiki.navigation.children[0].path, "repo/left");
        assert_eq!(wiki.navigation.children[1].path, "repo/right");
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let (tree, left, right) = two_leaf_tree();
        let mut units = BTreeMap::new();
        units.insert(ModuleId::ROOT, unit(ModuleId::ROOT, "repo", "overview", &["a"]));
        units.insert(left, unit(left, "repo/left", "left docs", &["a", "b"]));
        units.insert(right, unit(right, "repo/right", "right docs", &["c"]));

        let first = Assembler::assemble(&tree, &units);
        let second = Assembler::assemble(&tree, &units);
        assert_eq!(first, second);

        let first_json = serde_json::to_string(&first).unwrap();
        let second_json = serde_json::to_string(&second).unwrap();
        assert_eq!(first_json, second_json);
    }
}
