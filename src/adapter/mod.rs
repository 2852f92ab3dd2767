//! Language adapter capability
//!
//! Source-to-AST extraction is an external collaborator: the engine only
//! sees the symbols a file defines and the unresolved references it makes.
//! Adapters may fail per file without aborting a build; the graph builder
//! converts such failures into isolated file symbols plus a recorded
//! [`ParseFailure`](crate::graph::ParseFailure).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{EdgeKind, Result, SymbolKind};

/// A source file handed to an adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// Repository-relative path
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Per-file extraction result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub path: String,
    pub language: Option<String>,
    /// Symbols defined in this file
    pub symbols: Vec<RawSymbol>,
    /// Outgoing references, unresolved (target is a bare name)
    pub references: Vec<RawReference>,
}

impl FileAnalysis {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// A symbol definition as reported by an adapter, before graph insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub start_line: u32,
    pub end_line: u32,
    /// Estimated token weight of the defining source
    pub weight: u64,
}

impl RawSymbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            kind,
            start_line: 0,
            end_line: 0,
            weight: 1,
        }
    }

    pub fn with_lines(mut self, start: u32, end: u32) -> Self {
        self.start_line = start;
        self.end_line = end;
        self
    }

    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight.max(1);
        self
    }
}

/// A reference made by a symbol in this file to a bare target name.
///
/// Resolution against in-repository definitions happens in the graph
/// builder; adapters never resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReference {
    /// Name of the referencing symbol in this file; empty means the file
    /// itself (e.g. a top-level import)
    pub from: String,
    /// Referenced name, unresolved
    pub target: String,
    pub kind: EdgeKind,
}

impl RawReference {
    pub fn new(from: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            from: from.into(),
            target: target.into(),
            kind,
        }
    }
}

/// Pluggable per-language extraction capability.
#[async_trait]
pub trait LanguageAdapter: Send + Sync {
    /// Extract symbols and references from one file.
    ///
    /// A per-file error is non-fatal to the caller's build.
    async fn analyze(&self, file: &SourceFile) -> Result<FileAnalysis>;

    /// Adapter name for logging
    fn name(&self) -> &str;
}
