pub mod error;
pub mod symbol;
pub mod unit;

pub use error::{LoomError, ModelError, ModelErrorKind, Result};
pub use symbol::{Edge, EdgeKind, SourceLocation, Symbol, SymbolKind};
pub use unit::{DocumentationUnit, GenerationMeta, OutboundReference};

// =============================================================================
// Domain Newtypes
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe wrapper for symbol identifiers
///
/// Identifiers are structured strings (`kind:path[:name]`) so they stay
/// stable across runs and sort deterministically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct SymbolId(String);

impl SymbolId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn file(path: &str) -> Self {
        Self(format!("file:{}", path))
    }

    pub fn function(path: &str, name: &str) -> Self {
        Self(format!("function:{}:{}", path, name))
    }

    pub fn class(path: &str, name: &str) -> Self {
        Self(format!("class:{}:{}", path, name))
    }

    pub fn interface(path: &str, name: &str) -> Self {
        Self(format!("interface:{}:{}", path, name))
    }

    pub fn external(name: &str) -> Self {
        Self(format!("external:{}", name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_external(&self) -> bool {
        self.0.starts_with("external:")
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SymbolId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SymbolId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SymbolId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Type-safe index of a node in the module tree arena.
///
/// Indices are assigned in creation order by the partitioner, which is
/// deterministic for a fixed graph and budget, so a `ModuleId` is stable
/// across runs over the same snapshot.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(transparent)]
pub struct ModuleId(u32);

impl ModuleId {
    pub const ROOT: Self = Self(0);

    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}
