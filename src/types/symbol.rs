//! Symbol and edge data model for the dependency graph.
//!
//! Symbols are immutable after extraction; edges are deduplicated by
//! (source, target, kind) with commutative weight accumulation so the
//! final graph never depends on file processing order.

use serde::{Deserialize, Serialize};

use super::SymbolId;

/// A named code entity extracted by a language adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SymbolKind,
    /// Source language, absent for synthetic symbols
    pub language: Option<String>,
    pub location: Option<SourceLocation>,
    /// Size/complexity proxy (estimated tokens of the defining source)
    pub weight: u64,
}

impl Symbol {
    pub fn new(id: SymbolId, name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            language: None,
            location: None,
            weight: 1,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight.max(1);
        self
    }

    /// Synthetic target for references with no in-repository definition.
    pub fn external(name: &str) -> Self {
        Self::new(SymbolId::external(name), name, SymbolKind::External)
    }

    pub fn is_external(&self) -> bool {
        self.kind == SymbolKind::External
    }

    /// Path of the file this symbol is defined in, if known.
    pub fn file(&self) -> Option<&str> {
        self.location.as_ref().map(|l| l.file.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    File,
    /// Synthetic node for out-of-repository references
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            file: file.into(),
            start_line,
            end_line,
        }
    }
}

// =============================================================================
// Edges
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    Imports,
    Inherits,
    References,
}

/// A directed relation between two symbols.
///
/// Both endpoints must exist in the owning graph's symbol set; weight
/// starts at 1 and is incremented per repeated occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub source: SymbolId,
    pub target: SymbolId,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    pub weight: u32,
}

impl Edge {
    pub fn new(source: SymbolId, target: SymbolId, kind: EdgeKind) -> Self {
        Self {
            source,
            target,
            kind,
            weight: 1,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight.max(1);
        self
    }
}
