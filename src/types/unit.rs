//! Documentation unit produced for one module-tree node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ModuleId, SymbolId};

/// The output attached to one module node.
///
/// Created once when a node reaches `Documented` (or `Failed`, as a
/// placeholder) and immutable thereafter; a retry replaces the unit
/// wholesale, never patches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentationUnit {
    /// Owning module node
    pub node: ModuleId,
    /// Stable node path, used as the page address
    pub node_path: String,
    /// Documentation body (markdown)
    pub body: String,
    /// Symbols this unit canonically describes
    pub described_symbols: Vec<SymbolId>,
    /// Cross-references to symbols owned by other units
    pub references: Vec<OutboundReference>,
    /// Whether this is an empty placeholder for a failed node
    pub placeholder: bool,
    pub meta: GenerationMeta,
}

impl DocumentationUnit {
    /// Empty placeholder so assembly coverage holds for failed nodes.
    pub fn placeholder(node: ModuleId, node_path: impl Into<String>, reason: &str) -> Self {
        Self {
            node,
            node_path: node_path.into(),
            body: String::new(),
            described_symbols: Vec::new(),
            references: Vec::new(),
            placeholder: true,
            meta: GenerationMeta {
                failure_reason: Some(reason.to_string()),
                ..GenerationMeta::default()
            },
        }
    }
}

/// A link to a symbol canonically described elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundReference {
    pub symbol: SymbolId,
    /// Node that owns the full explanation
    pub owner: ModuleId,
}

/// Generation metadata recorded per unit for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMeta {
    pub model: String,
    pub provider: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub generated_at: DateTime<Utc>,
    /// Transient failures absorbed before success (0 on first-try success)
    pub retry_count: u32,
    pub failure_reason: Option<String>,
}

impl Default for GenerationMeta {
    fn default() -> Self {
        Self {
            model: String::new(),
            provider: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            generated_at: Utc::now(),
            retry_count: 0,
            failure_reason: None,
        }
    }
}
