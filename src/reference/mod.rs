//! Cross-module reference management
//!
//! The [`ReferenceIndex`] maps each symbol to the unit that canonically
//! owns its explanation. It is the only structure mutated by concurrent
//! subtrees, so mutation is serialized through a single-owner actor task:
//! handles send commands over a channel, and insert-if-absent claims are
//! therefore race-free by construction.
//!
//! Completion-order claims are advisory. [`ReferenceResolver`] re-derives
//! ownership from the module tree at assembly time so the final result is
//! independent of scheduling.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::partition::ModuleTree;
use crate::types::{DocumentationUnit, LoomError, ModuleId, Result, SymbolId};

/// Result of attempting to claim a symbol for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The symbol had no owner; the claim stands
    Claimed,
    /// Another unit already owns it; emit a reference instead
    AlreadyOwned(ModuleId),
}

enum Command {
    Claim {
        symbol: SymbolId,
        owner: ModuleId,
        reply: oneshot::Sender<ClaimOutcome>,
    },
    Lookup {
        symbols: Vec<SymbolId>,
        reply: oneshot::Sender<BTreeMap<SymbolId, Option<ModuleId>>>,
    },
    Snapshot {
        reply: oneshot::Sender<BTreeMap<SymbolId, ModuleId>>,
    },
}

/// Cloneable handle to the reference index actor.
///
/// The actor stops when every handle has been dropped. Process-wide,
/// initialized empty per run, discarded at run end.
#[derive(Clone)]
pub struct ReferenceIndex {
    tx: mpsc::Sender<Command>,
}

impl ReferenceIndex {
    /// Spawn the single-owner actor and return a handle.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(64);
        tokio::spawn(async move {
            let mut owners: BTreeMap<SymbolId, ModuleId> = BTreeMap::new();
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Claim {
                        symbol,
                        owner,
                        reply,
                    } => {
                        let outcome = match owners.get(&symbol) {
                            Some(existing) => ClaimOutcome::AlreadyOwned(*existing),
                            None => {
                                owners.insert(symbol, owner);
                                ClaimOutcome::Claimed
                            }
                        };
                        let _ = reply.send(outcome);
                    }
                    Command::Lookup { symbols, reply } => {
                        let result = symbols
                            .into_iter()
                            .map(|s| {
                                let owner = owners.get(&s).copied();
                                (s, owner)
                            })
                            .collect();
                        let _ = reply.send(result);
                    }
                    Command::Snapshot { reply } => {
                        let _ = reply.send(owners.clone());
                    }
                }
            }
            debug!("reference index actor stopped");
        });
        Self { tx }
    }

    /// Claim ownership of a symbol for a unit (insert-if-absent).
    pub async fn claim(&self, symbol: SymbolId, owner: ModuleId) -> Result<ClaimOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Claim {
                symbol,
                owner,
                reply,
            })
            .await
            .map_err(|_| index_closed())?;
        rx.await.map_err(|_| index_closed())
    }

    /// Look up current owners for a set of symbols.
    pub async fn lookup(
        &self,
        symbols: Vec<SymbolId>,
    ) -> Result<BTreeMap<SymbolId, Option<ModuleId>>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Lookup { symbols, reply })
            .await
            .map_err(|_| index_closed())?;
        rx.await.map_err(|_| index_closed())
    }

    /// Full copy of the current ownership map.
    pub async fn snapshot(&self) -> Result<BTreeMap<SymbolId, ModuleId>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| index_closed())?;
        rx.await.map_err(|_| index_closed())
    }
}

fn index_closed() -> LoomError {
    LoomError::Cancelled {
        reason: "reference index actor stopped".into(),
    }
}

// =============================================================================
// Resolver
// =============================================================================

pub struct ReferenceResolver;

impl ReferenceResolver {
    /// For every candidate symbol a unit is about to describe, report
    /// the owning unit if one exists. Owned-elsewhere symbols must be
    /// linked, not re-explained.
    pub async fn resolve(
        index: &ReferenceIndex,
        candidates: BTreeSet<SymbolId>,
    ) -> Result<BTreeMap<SymbolId, Option<ModuleId>>> {
        index.lookup(candidates.into_iter().collect()).await
    }

    /// Deterministic ownership, independent of completion order: among
    /// all units claiming a symbol, the one whose node is deepest in the
    /// module tree (smallest enclosing module) wins; ties break on the
    /// smaller node id.
    pub fn rederive_ownership(
        tree: &ModuleTree,
        units: &BTreeMap<ModuleId, DocumentationUnit>,
    ) -> BTreeMap<SymbolId, ModuleId> {
        let depths = node_depths(tree);
        let mut owners: BTreeMap<SymbolId, ModuleId> = BTreeMap::new();

        for (node, unit) in units {
            for symbol in &unit.described_symbols {
                match owners.get(symbol) {
                    None => {
                        owners.insert(symbol.clone(), *node);
                    }
                    Some(current) => {
                        let (cur_depth, new_depth) = (depths[current.index()], depths[node.index()]);
                        if new_depth > cur_depth || (new_depth == cur_depth && node < current) {
                            owners.insert(symbol.clone(), *node);
                        }
                    }
                }
            }
        }
        owners
    }
}

fn node_depths(tree: &ModuleTree) -> Vec<usize> {
    let mut depths = vec![0usize; tree.len()];
    for id in tree.bottom_up_order().into_iter().rev() {
        let node = tree.node(id);
        if let Some(parent) = node.parent {
            depths[id.index()] = depths[parent.index()] + 1;
        }
    }
    depths
}

// =============================================================================
// Tests
// =============================================================================
