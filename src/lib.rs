//! CodeLoom - Recursive LLM Documentation Engine
//!
//! Generates structured documentation for repositories far larger than a
//! model's context window by partitioning the code dependency graph into
//! budget-sized module units, documenting them bottom-up with concurrent
//! model calls, and assembling the results into a cross-linked wiki.
//!
//! ## Core Features
//!
//! - **Dependency Graph**: adapter output becomes a weighted symbol
//!   graph, with external-symbol fallback for unresolved references
//! - **Budget Partitioning**: deterministic hierarchical clustering into
//!   a module tree where every leaf fits one synthesis call
//! - **Bottom-Up Generation**: leaves first, parents merge child
//!   overviews; failures are contained to their subtree
//! - **Canonical Ownership**: each symbol is explained on exactly one
//!   page, everything else links to it
//! - **Resume**: a rerun reuses finished units and retries only gaps
//!
//! ## Quick Start
//!
//! ```ignore
//! use codeloom::{GraphBuilder, Orchestrator};
//! use std::sync::Arc;
//!
//! let graph = GraphBuilder::build_with_adapter(&adapter, &files).await;
//! let orchestrator = Orchestrator::with_defaults(Arc::new(provider));
//! let report = orchestrator.run(graph, "my-repo").await?;
//! for (path, page) in &report.wiki.pages {
//!     println!("{}: {} bytes", path, page.body.len());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`adapter`]: language-analysis seam producing symbols and references
//! - [`graph`]: dependency graph construction and queries
//! - [`partition`]: module tree and budget-constrained clustering
//! - [`model`]: LLM provider abstraction, timeouts, output validation
//! - [`agent`]: per-node generation state machine
//! - [`reference`]: symbol ownership index and resolution
//! - [`pipeline`]: run orchestration and scheduling
//! - [`assemble`]: final wiki assembly
//! - [`config`]: layered configuration

pub mod adapter;
pub mod agent;
pub mod assemble;
pub mod config;
pub mod constants;
pub mod graph;
pub mod model;
pub mod partition;
pub mod pipeline;
pub mod reference;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error types
pub use types::{LoomError, ModelError, ModelErrorKind, Result};

// Data model
pub use types::{DocumentationUnit, ModuleId, OutboundReference, Symbol, SymbolId, SymbolKind};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{Orchestrator, PipelineConfig, RunMetadata, RunReport};

pub use assemble::{Assembler, NavigationEntry, Page, Wiki};

// =============================================================================
// Engine Re-exports
// =============================================================================

pub use adapter::{FileAnalysis, LanguageAdapter, SourceFile};

pub use graph::{DependencyGraph, GraphBuilder};

pub use partition::{ModuleTree, NodeStatus, PartitionConfig, Partitioner};

pub use agent::{AgentConfig, DocumentationAgent};

pub use model::{
    GenerationRequest, ModelProvider, ModelResponse, SharedProvider, TokenUsage, with_timeout,
};

pub use reference::{ClaimOutcome, ReferenceIndex, ReferenceResolver};
