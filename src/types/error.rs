//! Unified Error Type System
//!
//! Centralized error types for the whole crate, with category-based
//! routing for retry decisions on model calls.
//!
//! ## Failure taxonomy
//!
//! - **Parse failures** are per-file, non-fatal: recorded on the graph
//!   and skipped.
//! - **Partition overflow** is a warning, not an error: an indivisible
//!   unit above budget is still emitted as a leaf.
//! - **Model failures** carry a [`ModelErrorKind`] that drives retry,
//!   repair, and give-up decisions in the agent.
//! - **Node failures** are contained: the run as a whole fails only if
//!   the root node fails.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Model Error
// =============================================================================

/// Failure kinds reported by a model provider, used for retry routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// Request exceeded its deadline - retry with backoff
    Timeout,
    /// Provider signalled rate limiting - wait then retry
    RateLimited,
    /// Output failed structural validation - one repair attempt, then retry
    InvalidOutput,
    /// Provider temporarily unavailable - retry with backoff
    Unavailable,
    /// Run-level cancellation observed - never retry
    Cancelled,
    /// Unrecoverable provider failure - never retry
    Fatal,
}

impl std::fmt::Display for ModelErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::RateLimited => write!(f, "RATE_LIMITED"),
            Self::InvalidOutput => write!(f, "INVALID_OUTPUT"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

impl ModelErrorKind {
    /// Whether the agent may retry a call that failed with this kind.
    ///
    /// `InvalidOutput` counts as transient: it gets one in-attempt repair
    /// first, and falls back to a from-scratch retry if the repair also
    /// fails validation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::InvalidOutput | Self::Unavailable
        )
    }

    /// Baseline delay before retrying this kind of failure.
    pub fn recommended_delay(&self) -> Duration {
        match self {
            Self::RateLimited => Duration::from_secs(30),
            Self::Timeout | Self::Unavailable => Duration::from_secs(5),
            Self::InvalidOutput => Duration::from_secs(1),
            _ => Duration::from_millis(500),
        }
    }
}

/// Typed failure from the model-invocation capability.
#[derive(Debug, Clone)]
pub struct ModelError {
    /// Failure kind for routing decisions
    pub kind: ModelErrorKind,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// Provider-suggested wait before retry, if any
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.kind, self.message)
        } else {
            write!(f, "[{}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ModelError {}

impl ModelError {
    pub fn new(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::new(
            ModelErrorKind::Timeout,
            format!("{} timed out after {:?}", operation.into(), duration),
        )
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::InvalidOutput, message)
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::Cancelled, reason)
    }

    /// Add provider context
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Add suggested retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    pub fn recommended_delay(&self) -> Duration {
        self.retry_after
            .unwrap_or_else(|| self.kind.recommended_delay())
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum LoomError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Per-file parse failure. Non-fatal during a graph build, where it is
    /// downgraded to a recorded [`ParseFailure`](crate::graph::ParseFailure).
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    /// Structured model failure with retry routing
    #[error("Model error: {0}")]
    Model(ModelError),

    /// Retry budget exhausted for one node; the run continues with a
    /// placeholder unit for it.
    #[error("Generation failed for {node}: {reason}")]
    GenerationFatal { node: String, reason: String },

    /// Cooperative run-level cancellation
    #[error("Run cancelled: {reason}")]
    Cancelled { reason: String },

    /// Module tree invariant violation (coverage or disjointness)
    #[error("Module tree invariant violated: {0}")]
    Tree(String),
}

impl From<ModelError> for LoomError {
    fn from(err: ModelError) -> Self {
        LoomError::Model(err)
    }
}

impl From<anyhow::Error> for LoomError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return LoomError::Io(std::io::Error::new(io_err.kind(), io_err.to_string()));
        }
        LoomError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LoomError>;

impl LoomError {
    /// Whether this error can be retried at the call site.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Model(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether this error came from cooperative cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
            || matches!(self, Self::Model(e) if e.kind == ModelErrorKind::Cancelled)
    }
}

// =============================================================================
// Tests
// =============================================================================
