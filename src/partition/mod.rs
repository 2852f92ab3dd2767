//! Hierarchical module tree
//!
//! The partition output: an arena of [`ModuleNode`]s indexed by
//! [`ModuleId`]. The arena form (rather than nested ownership) is what
//! the pipeline's work queue and join counters operate over, and it
//! serializes directly as the persisted module tree interface.
//!
//! Invariants: sibling member sets are disjoint; the union of leaf
//! member sets equals the repository symbol set; nodes are never
//! deleted, only marked `Failed`.

mod cluster;

pub use cluster::{PartitionConfig, PartitionWarning, Partitioner};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{LoomError, ModuleId, Result, SymbolId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    InProgress,
    Documented,
    Delegated,
    Failed,
}

impl NodeStatus {
    /// Documented and Failed are the terminal states a parent's join
    /// barrier waits for.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Documented | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleNode {
    pub id: ModuleId,
    pub name: String,
    /// Stable slash-joined path from the root, the page address
    pub path: String,
    /// All symbols in this subtree. For a leaf this is exactly what its
    /// unit documents; for an internal node it is the union of its
    /// children's members.
    pub members: BTreeSet<SymbolId>,
    pub children: Vec<ModuleId>,
    pub parent: Option<ModuleId>,
    /// Aggregate symbol weight of the subtree
    pub weight: u64,
    pub status: NodeStatus,
}

impl ModuleNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleTree {
    nodes: Vec<ModuleNode>,
    root: ModuleId,
}

impl ModuleTree {
    /// Create a tree with a single root node holding all members.
    pub fn with_root(name: impl Into<String>, members: BTreeSet<SymbolId>, weight: u64) -> Self {
        let name = name.into();
        Self {
            nodes: vec![ModuleNode {
                id: ModuleId::ROOT,
                name: name.clone(),
                path: name,
                members,
                children: Vec::new(),
                parent: None,
                weight,
                status: NodeStatus::Pending,
            }],
            root: ModuleId::ROOT,
        }
    }

    pub fn root(&self) -> ModuleId {
        self.root
    }

    pub fn node(&self, id: ModuleId) -> &ModuleNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: ModuleId) -> &mut ModuleNode {
        &mut self.nodes[id.index()]
    }

    /// Bounds-checked lookup for ids that come from external data
    /// (resumed units may carry ids minted by an older tree).
    pub fn get(&self, id: ModuleId) -> Option<&ModuleNode> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes.iter()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &ModuleNode> {
        self.nodes.iter().filter(|n| n.is_leaf())
    }

    /// Append a child under `parent`, returning its id.
    pub fn add_child(
        &mut self,
        parent: ModuleId,
        name: impl Into<String>,
        members: BTreeSet<SymbolId>,
        weight: u64,
    ) -> ModuleId {
        let name = name.into();
        let id = ModuleId::new(self.nodes.len() as u32);
        let path = format!("{}/{}", self.nodes[parent.index()].path, name);
        self.nodes.push(ModuleNode {
            id,
            name,
            path,
            members,
            children: Vec::new(),
            parent: Some(parent),
            weight,
            status: NodeStatus::Pending,
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Leaf-first processing order: every node appears after all of its
    /// children (post-order walk from the root).
    pub fn bottom_up_order(&self) -> Vec<ModuleId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.node(id).children.iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// The deepest node whose member set contains `symbol`: the most
    /// specific enclosing module, used for deterministic ownership.
    pub fn owner_of(&self, symbol: &SymbolId) -> Option<ModuleId> {
        let mut current = self.root;
        if !self.node(current).members.contains(symbol) {
            return None;
        }
        'descend: loop {
            for &child in &self.node(current).children {
                if self.node(child).members.contains(symbol) {
                    current = child;
                    continue 'descend;
                }
            }
            return Some(current);
        }
    }

    // =========================================================================
    // Invariant checks
    // =========================================================================

    /// Verify full coverage and sibling disjointness against the
    /// expected symbol set.
    pub fn validate(&self, expected: &BTreeSet<SymbolId>) -> Result<()> {
        let mut leaf_union: BTreeSet<SymbolId> = BTreeSet::new();
        let mut leaf_total = 0usize;
        for leaf in self.leaves() {
            leaf_total += leaf.members.len();
            leaf_union.extend(leaf.members.iter().cloned());
        }
        if leaf_total != leaf_union.len() {
            return Err(LoomError::Tree(format!(
                "leaf member sets overlap: {} members across leaves, {} distinct",
                leaf_total,
                leaf_union.len()
            )));
        }
        if &leaf_union != expected {
            return Err(LoomError::Tree(format!(
                "leaf coverage mismatch: {} covered, {} expected",
                leaf_union.len(),
                expected.len()
            )));
        }

        for node in self.nodes() {
            let mut seen: BTreeSet<&SymbolId> = BTreeSet::new();
            for &child in &node.children {
                for member in &self.node(child).members {
                    if !seen.insert(member) {
                        return Err(LoomError::Tree(format!(
                            "symbol {} appears in two siblings under {}",
                            member, node.path
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> BTreeSet<SymbolId> {
        names.iter().map(|n| SymbolId::new(*n)).collect()
    }

    fn sample_tree() -> ModuleTree {
        let mut tree = ModuleTree::with_root("repo", ids(&["a", "b", "c", "d"]), 40);
        let left = tree.add_child(ModuleId::ROOT, "left", ids(&["a", "b"]), 20);
        tree.add_child(ModuleId::ROOT, "right", ids(&["c", "d"]), 20);
        tree.add_child(left, "inner", ids(&["a"]), 10);
        tree.add_child(left, "outer", ids(&["b"]), 10);
        tree
    }

    #[test]
    fn test_bottom_up_order_children_first() {
        let tree = sample_tree();
        let order = tree.bottom_up_order();
        assert_eq!(order.len(), tree.len());
        assert_eq!(*order.last().unwrap(), tree.root());

        let pos = |id: ModuleId| order.iter().position(|&x| x == id).unwrap();
        for node in tree.nodes() {
            for &child in &node.children {
                assert!(pos(child) < pos(node.id));
            }
        }
    }

    #[test]
    fn test_owner_is_deepest_enclosing_node() {
        let tree = sample_tree();
        let owner = tree.owner_of(&SymbolId::new("a")).unwrap();
        assert_eq!(tree.node(owner).path, "repo/left/inner");

        let owner_c = tree.owner_of(&SymbolId::new("c")).unwrap();
        assert_eq!(tree.node(owner_c).path, "repo/right");

        assert!(tree.owner_of(&SymbolId::new("zzz")).is_none());
    }

    #[test]
    fn test_validate_accepts_well_formed_tree() {
        let tree = sample_tree();
        assert!(tree.validate(&ids(&["a", "b", "c", "d"])).is_ok());
    }

    #[test]
    fn test_validate_rejects_lost_symbol() {
        let tree = sample_tree();
        let expected = ids(&["a", "b", "c", "d", "e"]);
        assert!(tree.validate(&expected).is_err());
    }

    #[test]
    fn test_validate_rejects_sibling_overlap() {
        let mut tree = ModuleTree::with_root("repo", ids(&["a", "b"]), 20);
        tree.add_child(ModuleId::ROOT, "x", ids(&["a", "b"]), 20);
        tree.add_child(ModuleId::ROOT, "y", ids(&["b"]), 10);
        assert!(tree.validate(&ids(&["a", "b"])).is_err());
    }

    #[test]
    fn test_get_is_bounds_checked() {
        let tree = sample_tree();
        assert!(tree.get(ModuleId::ROOT).is_some());
        assert!(tree.get(ModuleId::new(99)).is_none());
    }

    #[test]
    fn test_paths_are_slash_joined() {
        let tree = sample_tree();
        let paths: Vec<&str> = tree.nodes().map(|n| n.path.as_str()).collect();
        assert!(paths.contains(&"repo/left/inner"));
        assert!(paths.contains(&"repo/right"));
    }
}
