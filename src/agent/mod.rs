//! Per-node documentation agent
//!
//! Runs the generation state machine for a single module node:
//!
//! - **Complexity check**: an internal node whose weight exceeds the
//!   synthesis threshold is delegated, meaning its page is an overview
//!   merged from its children's finished units instead of a symbol-level
//!   synthesis.
//! - **Retry policy**: transient model failures (timeout, rate limit,
//!   unavailable) are retried with exponential backoff up to the
//!   configured budget. Structurally invalid output gets exactly one
//!   in-attempt repair call with the validation issue fed back; a failed
//!   repair re-enters the retry loop as a transient failure.
//! - **Ownership claims**: described symbols are claimed through the
//!   [`ReferenceIndex`]; symbols another unit already owns are demoted
//!   to outbound references.
//!
//! Node failures are contained. Exhausting the retry budget yields a
//! [`LoomError::GenerationFatal`] that the pipeline converts into a
//! placeholder unit; it never aborts sibling subtrees.

pub mod prompt;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::constants::agent as defaults;
use crate::graph::DependencyGraph;
use crate::model::validation::{self, DocPayload};
use crate::model::{GenerationRequest, SharedProvider, with_timeout};
use crate::partition::ModuleNode;
use crate::reference::{ClaimOutcome, ReferenceIndex};
use crate::types::{
    DocumentationUnit, GenerationMeta, LoomError, ModelError, ModelErrorKind, ModuleId,
    OutboundReference, Result, SymbolId,
};

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for the per-node agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Weight above which an internal node is delegated instead of
    /// synthesized directly
    pub synthesis_threshold: u64,
    /// Transient failures absorbed per node before giving up
    pub max_retries: u32,
    /// Deadline for a single model call
    pub request_timeout: Duration,
    /// First backoff delay
    pub base_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            synthesis_threshold: defaults::DEFAULT_SYNTHESIS_THRESHOLD,
            max_retries: defaults::DEFAULT_MAX_RETRIES,
            request_timeout: Duration::from_secs(crate::constants::model::DEFAULT_TIMEOUT_SECS),
            base_delay: Duration::from_millis(defaults::BASE_DELAY_MS),
            max_delay: Duration::from_secs(defaults::MAX_DELAY_SECS),
        }
    }
}

// =============================================================================
// Agent
// =============================================================================

/// Documents one module node per call; stateless between calls, so a
/// single instance is shared across concurrent subtrees.
pub struct DocumentationAgent {
    provider: SharedProvider,
    index: ReferenceIndex,
    config: AgentConfig,
    cancel: watch::Receiver<bool>,
}

impl DocumentationAgent {
    pub fn new(
        provider: SharedProvider,
        index: ReferenceIndex,
        config: AgentConfig,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            provider,
            index,
            config,
            cancel,
        }
    }

    /// Whether a node's page should be an overview merged from its
    /// children rather than a direct synthesis. Leaves always synthesize
    /// directly, whatever their weight.
    pub fn should_delegate(&self, node: &ModuleNode) -> bool {
        !node.children.is_empty() && node.weight > self.config.synthesis_threshold
    }

    /// Produce the documentation unit for one node.
    ///
    /// `child_docs` carries `(path, body)` for each already-documented
    /// child; it is consulted only when the node is delegated.
    #[instrument(skip_all, fields(node = %node.path))]
    pub async fn document(
        &self,
        node: &ModuleNode,
        graph: &DependencyGraph,
        child_docs: &[(String, String)],
    ) -> Result<DocumentationUnit> {
        if *self.cancel.borrow() {
            return Err(LoomError::Cancelled {
                reason: "run cancelled before generation".into(),
            });
        }

        let delegated = self.should_delegate(node);
        let prompt = if delegated {
            debug!(
                weight = node.weight,
                threshold = self.config.synthesis_threshold,
                children = child_docs.len(),
                "delegating to child overviews"
            );
            prompt::overview_prompt(node, child_docs)
        } else {
            let owned = self.owned_elsewhere(node).await?;
            prompt::synthesis_prompt(node, graph, &owned)
        };

        let attempts = AtomicU32::new(0);
        let input_tokens = AtomicU64::new(0);
        let output_tokens = AtomicU64::new(0);

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.base_delay)
            .with_max_delay(self.config.max_delay)
            .with_max_times(self.config.max_retries as usize);

        let outcome = (|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            if *self.cancel.borrow() {
                return Err(ModelError::cancelled("run cancelled"));
            }
            self.attempt(&prompt, &input_tokens, &output_tokens).await
        })
        .retry(backoff)
        .when(|e: &ModelError| e.is_transient())
        .notify(|err: &ModelError, delay: Duration| {
            warn!(node = %node.path, error = %err, ?delay, "retrying generation");
        })
        .await;

        let retry_count = attempts.load(Ordering::SeqCst).saturating_sub(1);
        let (payload, model) = match outcome {
            Ok(ok) => ok,
            Err(err) if err.kind == ModelErrorKind::Cancelled => {
                return Err(LoomError::Cancelled {
                    reason: err.message,
                });
            }
            Err(err) => {
                return Err(LoomError::GenerationFatal {
                    node: node.path.clone(),
                    reason: err.to_string(),
                });
            }
        };

        let (described, references) = if delegated {
            // An overview describes no symbols of its own.
            (Vec::new(), self.reference_owners(node, &payload).await?)
        } else {
            self.claim_described(node, &payload).await?
        };

        Ok(DocumentationUnit {
            node: node.id,
            node_path: node.path.clone(),
            body: payload.body,
            described_symbols: described,
            references,
            placeholder: false,
            meta: GenerationMeta {
                model,
                provider: self.provider.name().to_string(),
                input_tokens: input_tokens.load(Ordering::SeqCst),
                output_tokens: output_tokens.load(Ordering::SeqCst),
                generated_at: Utc::now(),
                retry_count,
                failure_reason: None,
            },
        })
    }

    /// One attempt: a model call, validation, and at most one repair
    /// call. Token usage accumulates across both calls.
    async fn attempt(
        &self,
        prompt: &str,
        input_tokens: &AtomicU64,
        output_tokens: &AtomicU64,
    ) -> std::result::Result<(DocPayload, String), ModelError> {
        let response = self
            .call(&GenerationRequest::new(prompt, DocPayload::schema()))
            .await?;
        input_tokens.fetch_add(response.usage.input_tokens, Ordering::SeqCst);
        output_tokens.fetch_add(response.usage.output_tokens, Ordering::SeqCst);

        let issue = match validation::validate(&response.content) {
            Ok(payload) => return Ok((payload, response.model)),
            Err(issue) => issue,
        };
        debug!(%issue, "model output failed validation, attempting repair");

        let repair = self
            .call(&GenerationRequest::new(
                validation::repair_prompt(prompt, &issue),
                DocPayload::schema(),
            ))
            .await?;
        input_tokens.fetch_add(repair.usage.input_tokens, Ordering::SeqCst);
        output_tokens.fetch_add(repair.usage.output_tokens, Ordering::SeqCst);

        match validation::validate(&repair.content) {
            Ok(payload) => Ok((payload, repair.model)),
            Err(issue) => Err(ModelError::invalid_output(format!(
                "repair attempt still invalid: {issue}"
            ))),
        }
    }

    async fn call(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<crate::model::ModelResponse, ModelError> {
        with_timeout(
            self.config.request_timeout,
            self.provider.generate(request),
            "generation",
        )
        .await
    }

    /// Owners already registered for this node's members, so the prompt
    /// can instruct the model to link instead of re-explain.
    async fn owned_elsewhere(&self, node: &ModuleNode) -> Result<BTreeMap<SymbolId, ModuleId>> {
        let lookup = self
            .index
            .lookup(node.members.iter().cloned().collect())
            .await?;
        Ok(lookup
            .into_iter()
            .filter_map(|(symbol, owner)| owner.map(|o| (symbol, o)))
            .collect())
    }

    /// Claim described symbols for this node; losers become references.
    async fn claim_described(
        &self,
        node: &ModuleNode,
        payload: &DocPayload,
    ) -> Result<(Vec<SymbolId>, Vec<OutboundReference>)> {
        let mut described = Vec::new();
        let mut references = Vec::new();

        for name in &payload.described_symbols {
            let Some(symbol) = resolve_member(node, name) else {
                debug!(%name, "model described a symbol outside the node, ignoring");
                continue;
            };
            match self.index.claim(symbol.clone(), node.id).await? {
                ClaimOutcome::Claimed => described.push(symbol),
                ClaimOutcome::AlreadyOwned(owner) => {
                    references.push(OutboundReference { symbol, owner });
                }
            }
        }

        for reference in self.reference_owners(node, payload).await? {
            if !references.contains(&reference) {
                references.push(reference);
            }
        }
        Ok((described, references))
    }

    /// Resolve the payload's referenced symbols to their current owners.
    async fn reference_owners(
        &self,
        node: &ModuleNode,
        payload: &DocPayload,
    ) -> Result<Vec<OutboundReference>> {
        let symbols: Vec<SymbolId> = payload
            .referenced_symbols
            .iter()
            .map(|name| resolve_member(node, name).unwrap_or_else(|| SymbolId::new(name)))
            .collect();
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let lookup = self.index.lookup(symbols).await?;
        Ok(lookup
            .into_iter()
            .filter(|(_, owner)| *owner != Some(node.id))
            .filter_map(|(symbol, owner)| owner.map(|o| OutboundReference { symbol, owner: o }))
            .collect())
    }
}

/// Map a model-reported symbol name to one of the node's members.
/// Accepts the full id or a bare trailing name; first match in id order.
fn resolve_member(node: &ModuleNode, name: &str) -> Option<SymbolId> {
    let exact = SymbolId::new(name);
    if node.members.contains(&exact) {
        return Some(exact);
    }
    let suffix = format!(":{name}");
    node.members
        .iter()
        .find(|id| id.as_str().ends_with(&suffix))
        .cloned()
}

// =============================================================================
// Tests
// =============================================================================
