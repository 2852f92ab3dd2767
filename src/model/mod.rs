//! Model-invocation capability
//!
//! The LLM transport is an external collaborator. The engine talks to it
//! through [`ModelProvider`]: structured prompt in, structured payload or
//! typed failure out. Token usage comes back with every response so the
//! run metadata can account for cost.

mod timeout;
pub mod validation;

pub use timeout::with_timeout;
pub use validation::{DocPayload, ValidationIssue};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::types::ModelError;

/// A structured generation request for one module node.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    /// JSON schema the response content must satisfy
    pub schema: Value,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, schema: Value) -> Self {
        Self {
            prompt: prompt.into(),
            schema,
        }
    }
}

/// Token usage metrics for cost tracking.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Complete model response including content and usage metrics.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Generated content (structured JSON)
    pub content: Value,
    pub usage: TokenUsage,
    /// Model that produced the response
    pub model: String,
}

impl ModelResponse {
    pub fn content_only(content: Value) -> Self {
        Self {
            content,
            usage: TokenUsage::default(),
            model: String::new(),
        }
    }
}

/// Shared provider handle for concurrent use across subtrees.
pub type SharedProvider = Arc<dyn ModelProvider>;

/// Structured-output generation capability.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Generate structured output for one request.
    ///
    /// Failures must be typed through [`ModelError`] so the agent can
    /// route retries (timeout, rate limit) separately from repair
    /// (invalid output) and give-up (fatal) paths.
    async fn generate(&self, request: &GenerationRequest)
    -> std::result::Result<ModelResponse, ModelError>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model identifier currently in use
    fn model(&self) -> &str;
}
