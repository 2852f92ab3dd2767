//! Run orchestration
//!
//! Drives a whole documentation run: partition the dependency graph,
//! document every module node bottom-up, then assemble the wiki.
//!
//! ## Scheduling
//!
//! The module tree is processed as a work queue with per-node join
//! counters. A node becomes ready when all of its children hold a
//! terminal status, so leaves start immediately and every parent waits
//! for its subtree. Ready nodes fan out concurrently; a global
//! [`Semaphore`] caps in-flight model calls independently of tree shape.
//!
//! ## Failure containment
//!
//! A node that exhausts its retry budget is marked `Failed` and gets a
//! placeholder unit; its parent still runs with the children that
//! succeeded. The run itself fails only when the root node fails.
//!
//! ## Cancellation
//!
//! Cooperative, via a watch channel. Once signalled, in-flight and
//! not-yet-started nodes resolve to cancellation placeholders and the
//! run drains quickly instead of aborting mid-write.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, watch};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::agent::{AgentConfig, DocumentationAgent};
use crate::assemble::{Assembler, Wiki};
use crate::constants::pipeline as defaults;
use crate::graph::DependencyGraph;
use crate::model::SharedProvider;
use crate::partition::{NodeStatus, PartitionConfig, PartitionWarning, Partitioner};
use crate::reference::ReferenceIndex;
use crate::types::{DocumentationUnit, LoomError, ModuleId, Result};

// =============================================================================
// Configuration and run records
// =============================================================================

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Global cap on concurrent model calls
    pub max_concurrent_requests: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: defaults::DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }
}

/// A node that ended the run in `Failed` state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedNode {
    pub path: String,
    pub reason: String,
}

/// Per-run accounting, serialized alongside the generated wiki.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub repository: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub node_count: usize,
    /// Repository symbols covered by the run's module tree
    pub symbol_count: usize,
    pub documented: usize,
    pub delegated: usize,
    pub failed: Vec<FailedNode>,
    /// Model retries per generated node, keyed by page path
    pub retry_counts: BTreeMap<String, u32>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Distinct models that contributed units
    pub models: BTreeSet<String>,
    pub pages: Vec<String>,
}

/// Everything a completed run produces.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub wiki: Wiki,
    pub metadata: RunMetadata,
    pub warnings: Vec<PartitionWarning>,
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct Orchestrator {
    provider: SharedProvider,
    partition: PartitionConfig,
    agent: AgentConfig,
    pipeline: PipelineConfig,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        provider: SharedProvider,
        partition: PartitionConfig,
        agent: AgentConfig,
        pipeline: PipelineConfig,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            provider,
            partition,
            agent,
            pipeline,
            cancel_tx,
            cancel_rx,
        }
    }

    pub fn with_defaults(provider: SharedProvider) -> Self {
        Self::new(
            provider,
            PartitionConfig::default(),
            AgentConfig::default(),
            PipelineConfig::default(),
        )
    }

    /// Signal cooperative cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Run a full documentation pass from scratch.
    pub async fn run(&self, graph: DependencyGraph, repo_name: &str) -> Result<RunReport> {
        self.resume(graph, repo_name, BTreeMap::new()).await
    }

    /// Run a pass, reusing units from a previous run keyed by node path.
    /// A node whose path already has a non-placeholder unit is not
    /// regenerated; placeholders from a failed run are retried.
    #[instrument(skip_all, fields(repo = repo_name))]
    pub async fn resume(
        &self,
        graph: DependencyGraph,
        repo_name: &str,
        existing: BTreeMap<String, DocumentationUnit>,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, "starting documentation run");

        let partitioner = Partitioner::new(self.partition.clone());
        let (mut tree, warnings) = partitioner.partition(&graph, repo_name);
        tree.validate(&graph.repo_symbol_ids())?;
        info!(nodes = tree.len(), warnings = warnings.len(), "partitioned");

        let index = ReferenceIndex::spawn();
        let agent = DocumentationAgent::new(
            self.provider.clone(),
            index,
            self.agent.clone(),
            self.cancel_rx.clone(),
        );
        let semaphore = Arc::new(Semaphore::new(self.pipeline.max_concurrent_requests));
        let units: DashMap<ModuleId, DocumentationUnit> = DashMap::new();
        let mut delegated: BTreeSet<ModuleId> = BTreeSet::new();

        // Join counters: a node is ready once all children are terminal.
        let mut pending_children: Vec<usize> =
            tree.nodes().map(|n| n.children.len()).collect();
        let mut ready: VecDeque<ModuleId> = tree
            .nodes()
            .filter(|n| n.is_leaf())
            .map(|n| n.id)
            .collect();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while let Some(id) = ready.pop_front() {
                // Resume fast path: reuse a prior unit without a call.
                let path = tree.node(id).path.clone();
                if let Some(prior) = existing.get(&path).filter(|u| !u.placeholder) {
                    let mut unit = prior.clone();
                    unit.node = id;
                    units.insert(id, unit);
                    tree.node_mut(id).status = NodeStatus::Documented;
                    Self::release_parent(&tree, id, &mut pending_children, &mut ready);
                    continue;
                }

                let node = tree.node(id).clone();
                tree.node_mut(id).status = if agent.should_delegate(&node) {
                    delegated.insert(id);
                    NodeStatus::Delegated
                } else {
                    NodeStatus::InProgress
                };

                let child_docs: Vec<(String, String)> = node
                    .children
                    .iter()
                    .filter_map(|child| {
                        units
                            .get(child)
                            .filter(|u| !u.placeholder)
                            .map(|u| (u.node_path.clone(), u.body.clone()))
                    })
                    .collect();

                let agent = &agent;
                let graph = &graph;
                let semaphore = &semaphore;
                in_flight.push(async move {
                    let permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return (
                                id,
                                Err(LoomError::Cancelled {
                                    reason: "admission semaphore closed".into(),
                                }),
                            );
                        }
                    };
                    let result = agent.document(&node, graph, &child_docs).await;
                    drop(permit);
                    (id, result)
                });
            }

            let Some((id, result)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(unit) => {
                    units.insert(id, unit);
                    tree.node_mut(id).status = NodeStatus::Documented;
                }
                Err(err) => {
                    let path = tree.node(id).path.clone();
                    if err.is_cancellation() {
                        info!(node = %path, "node cancelled");
                    } else {
                        warn!(node = %path, error = %err, "node failed, continuing with placeholder");
                    }
                    units.insert(
                        id,
                        DocumentationUnit::placeholder(id, path, &err.to_string()),
                    );
                    tree.node_mut(id).status = NodeStatus::Failed;
                }
            }
            Self::release_parent(&tree, id, &mut pending_children, &mut ready);
        }

        if tree.node(tree.root()).status == NodeStatus::Failed {
            let root_unit = units.get(&tree.root());
            let reason = root_unit
                .and_then(|u| u.meta.failure_reason.clone())
                .unwrap_or_else(|| "root node failed".into());
            if *self.cancel_rx.borrow() {
                return Err(LoomError::Cancelled { reason });
            }
            return Err(LoomError::GenerationFatal {
                node: tree.node(tree.root()).path.clone(),
                reason,
            });
        }

        let units: BTreeMap<ModuleId, DocumentationUnit> = units.into_iter().collect();
        let wiki = Assembler::assemble(&tree, &units);

        let metadata = Self::metadata(
            run_id,
            repo_name,
            started_at,
            &tree,
            &units,
            &delegated,
            &wiki,
        );
        info!(
            documented = metadata.documented,
            failed = metadata.failed.len(),
            tokens = metadata.input_tokens + metadata.output_tokens,
            "run complete"
        );

        Ok(RunReport {
            wiki,
            metadata,
            warnings,
        })
    }

    fn release_parent(
        tree: &crate::partition::ModuleTree,
        id: ModuleId,
        pending_children: &mut [usize],
        ready: &mut VecDeque<ModuleId>,
    ) {
        if let Some(parent) = tree.node(id).parent {
            pending_children[parent.index()] -= 1;
            if pending_children[parent.index()] == 0 {
                ready.push_back(parent);
            }
        }
    }

    fn metadata(
        run_id: Uuid,
        repo_name: &str,
        started_at: DateTime<Utc>,
        tree: &crate::partition::ModuleTree,
        units: &BTreeMap<ModuleId, DocumentationUnit>,
        delegated: &BTreeSet<ModuleId>,
        wiki: &Wiki,
    ) -> RunMetadata {
        let failed = tree
            .nodes()
            .filter(|n| n.status == NodeStatus::Failed)
            .map(|n| FailedNode {
                path: n.path.clone(),
                reason: units
                    .get(&n.id)
                    .and_then(|u| u.meta.failure_reason.clone())
                    .unwrap_or_else(|| "unknown".into()),
            })
            .collect();

        let mut input_tokens = 0;
        let mut output_tokens = 0;
        let mut models = BTreeSet::new();
        let mut retry_counts = BTreeMap::new();
        for unit in units.values() {
            input_tokens += unit.meta.input_tokens;
            output_tokens += unit.meta.output_tokens;
            if !unit.meta.model.is_empty() {
                models.insert(unit.meta.model.clone());
            }
            if !unit.placeholder {
                retry_counts.insert(unit.node_path.clone(), unit.meta.retry_count);
            }
        }

        RunMetadata {
            run_id,
            repository: repo_name.to_string(),
            started_at,
            finished_at: Utc::now(),
            node_count: tree.len(),
            symbol_count: tree.node(tree.root()).members.len(),
            documented: tree
                .nodes()
                .filter(|n| n.status == NodeStatus::Documented)
                .count(),
            delegated: delegated.len(),
            failed,
            retry_counts,
            input_tokens,
            output_tokens,
            models,
            pages: wiki.pages.keys().cloned().collect(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GenerationRequest, ModelProvider, ModelResponse, TokenUsage};
    use crate::types::{EdgeKind, ModelError, Symbol, SymbolId, SymbolKind};
    use crate::assemble::Page;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Provider that answers every request with a valid payload and
    /// tracks call count plus peak concurrency.
    struct CountingProvider {
        calls: AtomicU32,
        live: AtomicU32,
        peak: AtomicU32,
        fail_marker: Option<String>,
        fail_first: AtomicU32,
    }

    impl CountingProvider {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                live: AtomicU32::new(0),
                peak: AtomicU32::new(0),
                fail_marker: None,
                fail_first: AtomicU32::new(0),
            })
        }

        /// Fails every request whose prompt contains `marker`.
        fn failing_on(marker: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                live: AtomicU32::new(0),
                peak: AtomicU32::new(0),
                fail_marker: Some(marker.to_string()),
                fail_first: AtomicU32::new(0),
            })
        }

        /// Times out the first `n` requests, then answers normally.
        fn flaky(n: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                live: AtomicU32::new(0),
                peak: AtomicU32::new(0),
                fail_marker: None,
                fail_first: AtomicU32::new(n),
            })
        }
    }

    #[async_trait]
    impl ModelProvider for CountingProvider {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> std::result::Result<ModelResponse, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(live, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.live.fetch_sub(1, Ordering::SeqCst);

            if let Some(marker) = &self.fail_marker {
                if request.prompt.contains(marker) {
                    return Err(ModelError::timeout("generation", Duration::from_secs(1)));
                }
            }
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ModelError::timeout("generation", Duration::from_secs(1)));
            }
            Ok(ModelResponse {
                content: json!({
                    "body": format!("docs for request {}", self.calls.load(Ordering::SeqCst)),
                    "described_symbols": [],
                    "referenced_symbols": []
                }),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
                model: "counting-1".into(),
            })
        }

        fn name(&self) -> &str {
            "counting"
        }

        fn model(&self) -> &str {
            "counting-1"
        }
    }

    /// Provider whose first call flips the orchestrator's cancellation
    /// switch, then completes normally.
    struct CancellingProvider {
        orch: OnceLock<Arc<Orchestrator>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ModelProvider for CancellingProvider {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> std::result::Result<ModelResponse, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(orch) = self.orch.get() {
                orch.cancel();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(ModelResponse {
                content: json!({
                    "body": "docs finished before the stop",
                    "described_symbols": [],
                    "referenced_symbols": []
                }),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
                model: "cancelling-1".into(),
            })
        }

        fn name(&self) -> &str {
            "cancelling"
        }

        fn model(&self) -> &str {
            "cancelling-1"
        }
    }

    /// Two weakly-linked clusters across four files, weight 8 per file
    /// pair, so budget 20 forces a two-leaf split under the root.
    fn clustered_graph() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        let files = [
            ("alpha.rs", "Alpha"),
            ("beta.rs", "Beta"),
            ("gamma.rs", "Gamma"),
            ("delta.rs", "Delta"),
        ];
        for (file, name) in files {
            graph.insert_symbol(
                Symbol::new(SymbolId::class(file, name), name, SymbolKind::Class)
                    .with_location(crate::types::SourceLocation::new(file, 1, 40))
                    .with_weight(8),
            );
        }
        let a = SymbolId::class("alpha.rs", "Alpha");
        let b = SymbolId::class("beta.rs", "Beta");
        let c = SymbolId::class("gamma.rs", "Gamma");
        let d = SymbolId::class("delta.rs", "Delta");
        graph.add_edge(&a, &b, EdgeKind::Calls, 9);
        graph.add_edge(&c, &d, EdgeKind::Calls, 9);
        graph.add_edge(&b, &c, EdgeKind::References, 1);
        graph
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    fn fast_agent_config() -> AgentConfig {
        AgentConfig {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..AgentConfig::default()
        }
    }

    fn orchestrator(provider: Arc<CountingProvider>, budget: u64) -> Orchestrator {
        Orchestrator::new(
            provider,
            PartitionConfig::with_budget(budget),
            fast_agent_config(),
            PipelineConfig {
                max_concurrent_requests: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_full_run_documents_every_node() {
        init_tracing();
        let provider = CountingProvider::ok();
        let orch = orchestrator(provider.clone(), 20);

        let report = orch.run(clustered_graph(), "repo").await.unwrap();

        assert!(report.metadata.failed.is_empty());
        assert_eq!(report.metadata.documented, report.metadata.node_count);
        assert!(report.metadata.node_count >= 3);
        assert_eq!(report.metadata.pages.len(), report.metadata.node_count);
        assert!(report.wiki.pages.contains_key("repo"));
        assert_eq!(report.metadata.models.len(), 1);
        assert_eq!(
            report.metadata.input_tokens,
            10 * provider.calls.load(Ordering::SeqCst) as u64
        );
        assert_eq!(report.metadata.symbol_count, 4);
        assert_eq!(
            report.metadata.retry_counts.len(),
            report.metadata.node_count
        );
        assert!(report.metadata.retry_counts.values().all(|&r| r == 0));
    }

    #[tokio::test]
    async fn test_metadata_reports_per_node_retries() {
        // The whole graph fits the budget, so a single root leaf whose
        // first call times out and whose retry succeeds.
        let provider = CountingProvider::flaky(1);
        let orch = orchestrator(provider.clone(), 100);

        let report = orch.run(clustered_graph(), "repo").await.unwrap();

        assert_eq!(report.metadata.node_count, 1);
        assert_eq!(report.metadata.symbol_count, 4);
        assert_eq!(report.metadata.retry_counts["repo"], 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrency_respects_admission_cap() {
        let provider = CountingProvider::ok();
        let orch = orchestrator(provider.clone(), 20);
        orch.run(clustered_graph(), "repo").await.unwrap();
        assert!(provider.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failed_leaf_is_contained() {
        // Alpha/Beta leaf prompts mention alpha.rs; fail those calls.
        // A low threshold makes the root merge child overviews instead
        // of synthesizing over the failing file itself.
        let provider = CountingProvider::failing_on("alpha.rs");
        let orch = Orchestrator::new(
            provider,
            PartitionConfig::with_budget(20),
            AgentConfig {
                synthesis_threshold: 10,
                ..fast_agent_config()
            },
            PipelineConfig::default(),
        );

        let report = orch.run(clustered_graph(), "repo").await.unwrap();

        assert_eq!(report.metadata.failed.len(), 1);
        assert!(report.metadata.failed[0].path.contains("alpha"));
        // The root still documented, and the failed leaf has a
        // placeholder page so coverage holds.
        assert!(report.wiki.pages.contains_key("repo"));
        let failed_page = &report.wiki.pages[&report.metadata.failed[0].path];
        assert!(failed_page.placeholder);
    }

    #[tokio::test]
    async fn test_cancelled_run_fails_with_cancellation() {
        let provider = CountingProvider::ok();
        let orch = orchestrator(provider.clone(), 20);
        orch.cancel();

        let err = orch.run(clustered_graph(), "repo").await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mid_run_cancellation_preserves_finished_units() {
        init_tracing();
        let provider = Arc::new(CancellingProvider {
            orch: OnceLock::new(),
            calls: AtomicU32::new(0),
        });
        let orch = Arc::new(Orchestrator::new(
            provider.clone(),
            PartitionConfig::with_budget(20),
            fast_agent_config(),
            PipelineConfig {
                max_concurrent_requests: 1,
            },
        ));
        assert!(provider.orch.set(orch.clone()).is_ok());

        // A cached root overview lets the run finish even though the
        // root's own turn comes after the signal.
        let mut existing = BTreeMap::new();
        existing.insert("repo".to_string(), placeholder_free_unit("repo"));

        let report = orch
            .resume(clustered_graph(), "repo", existing)
            .await
            .unwrap();

        // The first leaf finished before the signal; the second drained
        // to a cancellation placeholder without another model call.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.metadata.failed.len(), 1);
        assert!(report.metadata.failed[0].reason.contains("cancelled"));

        let leaf_pages: Vec<&Page> = report
            .wiki
            .pages
            .values()
            .filter(|p| p.path != "repo")
            .collect();
        assert_eq!(leaf_pages.len(), 2);
        assert_eq!(leaf_pages.iter().filter(|p| p.placeholder).count(), 1);
        let survivor = leaf_pages.iter().find(|p| !p.placeholder).unwrap();
        assert!(survivor.body.contains("docs finished"));
        assert!(!report.wiki.pages["repo"].placeholder);
    }

    #[tokio::test]
    async fn test_resume_skips_existing_units() {
        let provider = CountingProvider::ok();
        let orch = orchestrator(provider.clone(), 20);
        let report = orch.run(clustered_graph(), "repo").await.unwrap();
        let first_calls = provider.calls.load(Ordering::SeqCst);
        assert!(first_calls > 0);

        let existing: BTreeMap<String, DocumentationUnit> = report
            .wiki
            .pages
            .keys()
            .map(|path| (path.clone(), placeholder_free_unit(path)))
            .collect();

        let resumed = orch
            .resume(clustered_graph(), "repo", existing)
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), first_calls);
        assert_eq!(resumed.metadata.documented, resumed.metadata.node_count);
    }

    fn placeholder_free_unit(path: &str) -> DocumentationUnit {
        DocumentationUnit {
            node: ModuleId::ROOT,
            node_path: path.to_string(),
            body: format!("cached docs for {path}"),
            described_symbols: Vec::new(),
            references: Vec::new(),
            placeholder: false,
            meta: crate::types::GenerationMeta::default(),
        }
    }

    #[tokio::test]
    async fn test_heavy_root_is_delegated() {
        let provider = CountingProvider::ok();
        let agent = AgentConfig {
            synthesis_threshold: 10,
            ..fast_agent_config()
        };
        let orch = Orchestrator::new(
            provider,
            PartitionConfig::with_budget(20),
            agent,
            PipelineConfig::default(),
        );

        let report = orch.run(clustered_graph(), "repo").await.unwrap();
        // Total weight 32 exceeds the threshold, so the root (which has
        // children after the split) is delegated.
        assert!(report.metadata.delegated >= 1);
        assert!(report.metadata.failed.is_empty());
    }

    #[tokio::test]
    async fn test_single_node_repo_runs_one_call() {
        let mut graph = DependencyGraph::new();
        graph.insert_symbol(
            Symbol::new(SymbolId::file("main.rs"), "main.rs", SymbolKind::File)
                .with_location(crate::types::SourceLocation::new("main.rs", 1, 10))
                .with_weight(5),
        );
        let provider = CountingProvider::ok();
        let orch = orchestrator(provider.clone(), 100);

        let report = orch.run(graph, "tiny").await.unwrap();
        assert_eq!(report.metadata.node_count, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(report.wiki.pages.contains_key("tiny"));
    }
}
