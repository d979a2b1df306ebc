//! Execution engine for task batches.
//!
//! The orchestrator owns every piece of shared state (quota view, chain
//! totals, cost store, handoff store) and runs each task as one unit:
//! - acquire an admission permit and hold it for the task's whole
//!   retry and fallback lifecycle
//! - route, resolve any handoff, execute with fallback
//! - record cost and chain totals, store the result at the task's index
//!
//! Units are spawned, so a panicking or failing unit never disturbs its
//! siblings; its slot simply holds a failed result.

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

use switchyard_core::{
    AggregatedResult, ConfigError, HandoffContext, QuotaStatus, QuotaView, Router, RoutingConfig,
    Task, TaskResult,
};

use crate::chain::ChainTracker;
use crate::config::{validate_concurrency_limit, RuntimeConfig};
use crate::cost::{CostError, CostStore, CostTracker};
use crate::handoff::{ContextStore, HandoffError, HandoffManager, MemoryContextStore};
use crate::platforms::AdapterSet;
use crate::quota::QuotaTracker;
use crate::resilience::{CircuitBreaker, FallbackExecutor};

/// Errors from the orchestrator's fallible surface.
///
/// Task failures are never errors; they come back as failed results.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error("Cost store error: {0}")]
    Cost(#[from] CostError),

    #[error("No platform adapters registered")]
    NoAdapters,
}

/// Effective concurrency for a batch: `min(base, max(1, remaining / 2))`.
///
/// `remaining` is `None` when no quota key is metered, in which case the
/// base limit stands.
pub fn adaptive_concurrency(base_limit: usize, remaining: Option<u64>) -> usize {
    match remaining {
        Some(remaining) => {
            let half = usize::try_from(remaining / 2).unwrap_or(usize::MAX);
            base_limit.min(half.max(1))
        }
        None => base_limit,
    }
}

/// Current and peak number of units holding a permit.
#[derive(Debug, Default)]
pub struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightGauge {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a InFlightGauge);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub platforms: Vec<String>,
    pub default_platform: String,
    pub concurrency_limit: usize,
    pub adaptive_limit: usize,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub circuits: BTreeMap<String, String>,
    pub quota: BTreeMap<String, QuotaStatus>,
}

struct Shared {
    router: Router,
    executor: FallbackExecutor,
    quota: Arc<dyn QuotaView>,
    costs: CostTracker,
    chains: ChainTracker,
    handoff: HandoffManager,
    config: RuntimeConfig,
    in_flight: InFlightGauge,
}

impl Shared {
    async fn run_unit(&self, task: Task) -> TaskResult {
        let platform = self.router.route(&task, self.quota.as_ref());

        let task = match self.handoff.load_handoff_context(&task).await {
            Ok(Some(payload)) => task.with_handoff_payload(payload),
            Ok(None) => task,
            Err(e) => {
                let result = TaskResult::failed(&task, platform, e.to_string());
                self.record_outcome(&task, &result).await;
                return result;
            }
        };

        let result = self.executor.execute_with_fallback(&task, &platform).await;
        self.record_outcome(&task, &result).await;

        tracing::info!(
            task_id = %result.task_id,
            platform = %result.platform,
            success = result.success,
            attempts = result.attempts,
            duration_ms = result.duration_ms,
            "Task finished"
        );
        result
    }

    /// Persistence failures are logged; they never fail the task.
    async fn record_outcome(&self, task: &Task, result: &TaskResult) {
        // Chain totals only count what the store holds.
        let cost = match self.costs.record(task, result, None).await {
            Ok(record) => record.cost,
            Err(e) => {
                tracing::error!(task_id = %result.task_id, error = %e, "Failed to record cost");
                0.0
            }
        };

        if let Some(chain_id) = task.chain_id() {
            self.chains
                .record(chain_id, &result.task_id, cost, result.usage.total());
        }
    }
}

/// Routes, executes and accounts for batches of tasks.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn router(&self) -> &Router {
        &self.shared.router
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    pub fn costs(&self) -> &CostTracker {
        &self.shared.costs
    }

    pub fn chains(&self) -> &ChainTracker {
        &self.shared.chains
    }

    pub fn quota(&self) -> &Arc<dyn QuotaView> {
        &self.shared.quota
    }

    /// Platform `task` would be routed to right now.
    pub fn route(&self, task: &Task) -> String {
        self.shared.router.route(task, self.shared.quota.as_ref())
    }

    /// Run a single task outside any batch.
    pub async fn submit(&self, task: Task) -> TaskResult {
        let _in_flight = self.shared.in_flight.enter();
        self.shared.run_unit(task).await
    }

    /// Run `tasks` with at most `concurrency_limit` in flight. Results come
    /// back in submission order.
    pub async fn execute_parallel(
        &self,
        tasks: Vec<Task>,
        concurrency_limit: usize,
    ) -> Result<Vec<TaskResult>, RuntimeError> {
        self.execute_parallel_until(tasks, concurrency_limit, std::future::pending())
            .await
    }

    /// Like [`execute_parallel`](Self::execute_parallel), but stops when
    /// `cancel` resolves. Finished results are kept; unfinished slots hold a
    /// failed result with error `"cancelled"`.
    pub async fn execute_parallel_until<C>(
        &self,
        tasks: Vec<Task>,
        concurrency_limit: usize,
        cancel: C,
    ) -> Result<Vec<TaskResult>, RuntimeError>
    where
        C: Future<Output = ()>,
    {
        validate_concurrency_limit(concurrency_limit)?;
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(tasks = tasks.len(), limit = concurrency_limit, "Starting batch");

        let semaphore = Arc::new(Semaphore::new(concurrency_limit));
        let slots: Arc<Mutex<Vec<Option<TaskResult>>>> = Arc::new(Mutex::new(vec![None; tasks.len()]));

        let mut handles = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().cloned().enumerate() {
            let shared = self.shared.clone();
            let semaphore = semaphore.clone();
            let slots = slots.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let _in_flight = shared.in_flight.enter();
                tracing::debug!(task_id = %task.id, index = index, "Permit acquired");

                let result = shared.run_unit(task).await;
                slots.lock()[index] = Some(result);
            }));
        }

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| async move { (index, handle.await) })
            .collect();
        tokio::pin!(cancel);

        let mut crashed: BTreeMap<usize, String> = BTreeMap::new();
        let mut record_crash = |index: usize, e: tokio::task::JoinError| {
            if e.is_panic() {
                tracing::error!(task_id = %tasks[index].id, error = %e, "Task unit crashed");
                crashed.insert(index, format!("task unit crashed: {}", e));
            }
        };

        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some((index, Err(e))) => record_crash(index, e),
                    Some(_) => {}
                    None => break,
                },
                _ = &mut cancel => {
                    tracing::warn!("Batch cancelled, aborting in-flight tasks");
                    for abort in &aborts {
                        abort.abort();
                    }
                    // Drain aborted units so every permit is back before returning.
                    while let Some((index, outcome)) = pending.next().await {
                        if let Err(e) = outcome {
                            record_crash(index, e);
                        }
                    }
                    break;
                }
            }
        }

        let filled: Vec<Option<TaskResult>> = slots.lock().iter_mut().map(Option::take).collect();
        let results = filled
            .into_iter()
            .zip(tasks.iter())
            .enumerate()
            .map(|(index, (slot, task))| {
                slot.unwrap_or_else(|| {
                    let reason = crashed
                        .remove(&index)
                        .unwrap_or_else(|| "cancelled".to_string());
                    TaskResult::failed(task, self.route(task), reason)
                })
            })
            .collect();

        Ok(results)
    }

    /// Base limit throttled by remaining quota.
    pub fn get_adaptive_concurrency(&self, base_limit: usize) -> usize {
        let remaining = self.shared.router.remaining_quota(self.shared.quota.as_ref());
        let limit = adaptive_concurrency(base_limit, remaining);
        tracing::debug!(base = base_limit, remaining = ?remaining, limit = limit, "Adaptive concurrency");
        limit
    }

    /// Run a batch at the adaptive limit and summarize it.
    ///
    /// Quota and cost warnings are logged before execution; they never
    /// block it.
    pub async fn execute_batch(&self, tasks: Vec<Task>) -> Result<AggregatedResult, RuntimeError> {
        let config = &self.shared.config;
        self.shared
            .router
            .warn_quota_threshold(self.shared.quota.as_ref(), config.quota_warn_fraction);

        for task in &tasks {
            let model = task.model.clone().unwrap_or_else(|| self.route(task));
            self.shared
                .costs
                .should_warn_cost(&task.prompt, &model, config.cost_warn_threshold_tokens);
        }

        let limit = self.get_adaptive_concurrency(config.concurrency_limit);
        let results = self.execute_parallel(tasks, limit).await?;
        let aggregated = AggregatedResult::from_results(results);

        tracing::info!(
            tasks = aggregated.results.len(),
            succeeded = aggregated.success_count,
            failed = aggregated.failure_count,
            total_cost = aggregated.total_cost,
            "Batch finished"
        );
        Ok(aggregated)
    }

    /// Build the follow-on task for `parent`.
    ///
    /// When this starts a chain the parent was not in, the parent joins it
    /// as root and its cost record moves into the chain, so chain totals
    /// and stored costs keep agreeing. A parent result that was already
    /// made a root stays in that chain, so siblings share it.
    pub async fn spawn_child_task(
        &self,
        parent: &TaskResult,
        prompt: impl Into<String>,
        chain_id: Option<&str>,
    ) -> Result<(Task, HandoffContext), RuntimeError> {
        let costs = &self.shared.costs;
        let parent_chain = match &parent.chain_id {
            Some(chain) => Some(chain.clone()),
            None => costs.get_task_chain(&parent.task_id).await?,
        };

        let (child, context) = self
            .shared
            .handoff
            .spawn_child_task(parent, prompt, chain_id.or(parent_chain.as_deref()))
            .await?;

        if parent_chain.as_deref() != Some(context.chain_id.as_str()) {
            if costs.attach_to_chain(&parent.task_id, &context.chain_id).await? {
                let cost = costs.get_task_cost(&parent.task_id).await?.unwrap_or(0.0);
                self.shared.chains.record(
                    &context.chain_id,
                    &parent.task_id,
                    cost,
                    parent.usage.total(),
                );
            } else {
                self.shared.chains.ensure(&context.chain_id, &parent.task_id);
            }
        }

        Ok((child, context))
    }

    /// Resolve a task's handoff payload; `None` for tasks without one.
    pub async fn load_handoff_context(&self, task: &Task) -> Result<Option<String>, HandoffError> {
        self.shared.handoff.load_handoff_context(task).await
    }

    /// Running cost of a chain in this process; zero when unknown.
    pub fn get_chain_cost(&self, chain_id: &str) -> f64 {
        self.shared.chains.get_chain_cost(chain_id)
    }

    pub fn status(&self) -> OrchestratorStatus {
        let shared = &self.shared;
        OrchestratorStatus {
            platforms: shared
                .executor
                .adapters()
                .platforms()
                .into_iter()
                .map(str::to_string)
                .collect(),
            default_platform: shared.router.default_platform().to_string(),
            concurrency_limit: shared.config.concurrency_limit,
            adaptive_limit: self.get_adaptive_concurrency(shared.config.concurrency_limit),
            in_flight: shared.in_flight.current(),
            peak_in_flight: shared.in_flight.peak(),
            circuits: shared
                .executor
                .breaker()
                .snapshot()
                .into_iter()
                .map(|(platform, state)| (platform, state.to_string()))
                .collect(),
            quota: shared.quota.status(),
        }
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    routing: RoutingConfig,
    config: RuntimeConfig,
    adapters: AdapterSet,
    quota: Option<Arc<dyn QuotaView>>,
    context_store: Option<Arc<dyn ContextStore>>,
    cost_store: Option<Arc<CostStore>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            routing: RoutingConfig::default(),
            config: RuntimeConfig::default(),
            adapters: AdapterSet::new(),
            quota: None,
            context_store: None,
            cost_store: None,
        }
    }

    pub fn routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn adapters(mut self, adapters: AdapterSet) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn quota(mut self, quota: Arc<dyn QuotaView>) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.context_store = Some(store);
        self
    }

    pub fn cost_store(mut self, store: Arc<CostStore>) -> Self {
        self.cost_store = Some(store);
        self
    }

    /// Validate configuration and build. Missing collaborators default to
    /// in-memory ones.
    pub fn build(self) -> Result<Orchestrator, RuntimeError> {
        self.routing.validate()?;
        self.config.validate()?;
        if self.adapters.is_empty() {
            return Err(RuntimeError::NoAdapters);
        }

        let config = self.config;
        let router = self.routing.router();
        let pricing = Arc::new(self.routing.pricing);

        let cost_store = match self.cost_store {
            Some(store) => store,
            None => Arc::new(CostStore::in_memory()?),
        };
        let context_store = self.context_store.unwrap_or_else(|| {
            Arc::new(MemoryContextStore::new(
                config.handoff_capacity,
                config.handoff_ttl,
            ))
        });
        let quota = self
            .quota
            .unwrap_or_else(|| Arc::new(QuotaTracker::new()));

        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        let executor = FallbackExecutor::new(
            self.adapters,
            &router,
            pricing.clone(),
            config.retry.clone(),
            config.call_timeout,
            breaker,
        );

        tracing::debug!(
            platforms = ?executor.adapters().platforms(),
            default_platform = %router.default_platform(),
            concurrency_limit = config.concurrency_limit,
            "Orchestrator built"
        );

        Ok(Orchestrator {
            shared: Arc::new(Shared {
                router,
                executor,
                quota,
                costs: CostTracker::new(cost_store, pricing),
                chains: ChainTracker::new(),
                handoff: HandoffManager::new(context_store),
                config,
                in_flight: InFlightGauge::default(),
            }),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MockAdapter;
    use crate::resilience::{CircuitBreakerConfig, RetryConfig};
    use std::time::Duration;
    use switchyard_core::{CostTier, PlatformError, TokenUsage};

    fn routing() -> RoutingConfig {
        RoutingConfig {
            default_platform: "claude".to_string(),
            tiers: vec![
                CostTier::new("gemini", "gemini_free", 0.0, 1),
                CostTier::new("claude", "claude_subscription", 1.0, 2),
            ],
            pricing: switchyard_core::PricingTable::builtin(),
        }
    }

    fn config() -> RuntimeConfig {
        RuntimeConfig::default()
            .with_concurrency_limit(2)
            .with_circuit_breaker(CircuitBreakerConfig::disabled())
    }

    fn orchestrator(adapters: AdapterSet, quota: Arc<QuotaTracker>) -> Orchestrator {
        Orchestrator::builder()
            .routing(routing())
            .config(config())
            .adapters(adapters)
            .quota(quota)
            .build()
            .unwrap()
    }

    fn two_platforms() -> AdapterSet {
        AdapterSet::new()
            .with(Arc::new(MockAdapter::new("gemini").with_model("gemini-2.5-flash")))
            .with(Arc::new(
                MockAdapter::new("claude")
                    .with_model("claude-sonnet-4-5")
                    .with_usage(TokenUsage::new(1_000_000, 0)),
            ))
    }

    #[test]
    fn test_adaptive_concurrency_formula() {
        assert_eq!(adaptive_concurrency(8, None), 8);
        assert_eq!(adaptive_concurrency(8, Some(100)), 8);
        assert_eq!(adaptive_concurrency(8, Some(6)), 3);
        assert_eq!(adaptive_concurrency(8, Some(1)), 1);
        assert_eq!(adaptive_concurrency(8, Some(0)), 1);
    }

    #[test]
    fn test_build_rejects_bad_config() {
        let result = Orchestrator::builder()
            .adapters(two_platforms())
            .config(RuntimeConfig::default().with_concurrency_limit(0))
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));

        let result = Orchestrator::builder().build();
        assert!(matches!(result, Err(RuntimeError::NoAdapters)));
    }

    #[tokio::test]
    async fn test_zero_limit_rejected_at_call() {
        let orch = orchestrator(two_platforms(), Arc::new(QuotaTracker::new()));
        let result = orch.execute_parallel(vec![Task::new("x")], 0).await;
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[tokio::test]
    async fn test_oversized_limit_rejected_at_call() {
        let orch = orchestrator(two_platforms(), Arc::new(QuotaTracker::new()));
        let result = orch.execute_parallel(vec![Task::new("x")], usize::MAX).await;
        assert!(matches!(result, Err(RuntimeError::Config(_))));

        let result = Orchestrator::builder()
            .adapters(two_platforms())
            .config(RuntimeConfig::default().with_concurrency_limit(usize::MAX))
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let orch = orchestrator(two_platforms(), Arc::new(QuotaTracker::new()));
        assert!(orch.execute_parallel(Vec::new(), 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adaptive_uses_metered_keys() {
        let quota = Arc::new(QuotaTracker::with_entries([("gemini_free", 96, Some(100))]));
        let orch = orchestrator(two_platforms(), quota);
        assert_eq!(orch.get_adaptive_concurrency(10), 2);
        assert_eq!(orch.status().adaptive_limit, 2);
    }

    #[tokio::test]
    async fn test_submit_records_cost_and_chain() {
        let orch = orchestrator(two_platforms(), Arc::new(QuotaTracker::new()));
        let task = Task::new("hello").with_hint("claude").in_chain("c1");
        let result = orch.submit(task).await;

        assert!(result.success);
        assert_eq!(result.platform, "claude");
        assert!((result.cost - 3.0).abs() < 1e-9);
        assert!((orch.get_chain_cost("c1") - 3.0).abs() < 1e-9);
        assert!((orch.costs().get_chain_cost("c1").await.unwrap() - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_child_task_end_to_end() {
        let orch = orchestrator(two_platforms(), Arc::new(QuotaTracker::new()));
        let parent = orch.submit(Task::new("draft").with_hint("claude")).await;
        assert!(parent.chain_id.is_none());

        let (child, context) = orch
            .spawn_child_task(&parent, "review the draft", None)
            .await
            .unwrap();
        assert_eq!(
            orch.load_handoff_context(&child).await.unwrap(),
            parent.output.clone()
        );

        let child_result = orch.submit(child.with_hint("claude")).await;
        assert!(child_result.success);

        let chain = orch.chains().get_chain(&context.chain_id).unwrap();
        assert_eq!(chain.root_task_id, parent.task_id);
        assert_eq!(chain.len(), 2);
        let stored = orch.costs().get_chain_cost(&context.chain_id).await.unwrap();
        assert!((chain.total_cost - stored).abs() < 1e-9);
        assert!((stored - 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_child_dispatch_carries_full_parent_output() {
        let claude = Arc::new(MockAdapter::new("claude"));
        let parent_output = "finding ".repeat(240);
        claude.push_response(parent_output.clone());
        let orch = orchestrator(AdapterSet::new().with(claude), Arc::new(QuotaTracker::new()));

        let parent = orch.submit(Task::new("draft")).await;
        let (child, context) = orch.spawn_child_task(&parent, "condense", None).await.unwrap();
        assert!(context.summary.len() < parent_output.len());
        assert!(!child.prompt.contains(&parent_output));

        let result = orch.submit(child).await;
        let echoed = result.output.unwrap();
        assert!(echoed.starts_with("[claude] condense"));
        assert!(echoed.contains(&parent_output));
    }

    #[tokio::test]
    async fn test_sibling_children_share_chain() {
        let orch = orchestrator(two_platforms(), Arc::new(QuotaTracker::new()));
        let parent = orch.submit(Task::new("draft").with_hint("claude")).await;

        let (_, first) = orch.spawn_child_task(&parent, "review", None).await.unwrap();
        let (second_child, second) = orch.spawn_child_task(&parent, "translate", None).await.unwrap();
        assert_eq!(first.chain_id, second.chain_id);
        assert_eq!(second_child.chain_id(), Some(first.chain_id.as_str()));

        let chain = orch.chains().get_chain(&first.chain_id).unwrap();
        assert_eq!(chain.len(), 1);
        assert!((chain.total_cost - 3.0).abs() < 1e-9);
        assert_eq!(orch.chains().len(), 1);
    }

    #[tokio::test]
    async fn test_chain_skips_cost_the_store_rejected() {
        let store = Arc::new(CostStore::in_memory().unwrap());
        let orch = Orchestrator::builder()
            .routing(routing())
            .config(config())
            .adapters(two_platforms())
            .cost_store(store.clone())
            .build()
            .unwrap();
        store.drop_schema();

        let result = orch.submit(Task::new("x").with_hint("claude").in_chain("c1")).await;
        assert!(result.success);
        assert!((result.cost - 3.0).abs() < 1e-9);

        let chain = orch.chains().get_chain("c1").unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.total_cost, 0.0);
    }

    #[tokio::test]
    async fn test_missing_handoff_fails_without_dispatch() {
        let store = Arc::new(MemoryContextStore::default());
        let claude = Arc::new(MockAdapter::new("claude"));
        let orch = Orchestrator::builder()
            .routing(routing())
            .config(config())
            .adapters(AdapterSet::new().with(claude.clone()))
            .context_store(store.clone())
            .build()
            .unwrap();

        let parent = orch.submit(Task::new("draft")).await;
        let (child, context) = orch.spawn_child_task(&parent, "next", None).await.unwrap();
        store.remove(&context.pointer).await;
        let calls_before = claude.call_count();

        let result = orch.submit(child).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("missing"));
        assert_eq!(claude.call_count(), calls_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_finished_results() {
        let gemini = Arc::new(MockAdapter::new("gemini"));
        gemini.delay_when_prompt_contains("slow", Duration::from_secs(60));
        let orch = Orchestrator::builder()
            .routing(routing())
            .config(config().with_retry(RetryConfig::none()))
            .adapters(AdapterSet::new().with(gemini))
            .build()
            .unwrap();

        let tasks = vec![
            Task::new("fast").with_id("a"),
            Task::new("slow").with_id("b"),
            Task::new("fast again").with_id("c"),
        ];
        let results = orch
            .execute_parallel_until(tasks, 3, tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[1].task_id, "b");
        assert_eq!(results[1].error.as_deref(), Some("cancelled"));
        assert!(results[2].success);
        assert_eq!(orch.status().in_flight, 0);
    }

    /// Panics on prompts containing "crash", otherwise never answers.
    struct CrashingAdapter;

    #[async_trait::async_trait]
    impl crate::platforms::PlatformAdapter for CrashingAdapter {
        fn name(&self) -> &str {
            "gemini"
        }

        async fn submit(&self, task: &Task) -> Result<crate::platforms::SubmissionHandle, PlatformError> {
            if task.prompt.contains("crash") {
                panic!("adapter bug");
            }
            Ok(crate::platforms::SubmissionHandle::new("h", "gemini", task))
        }

        async fn await_result(
            &self,
            _handle: &crate::platforms::SubmissionHandle,
            _timeout: Duration,
        ) -> Result<crate::platforms::PlatformOutput, PlatformError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reports_crashed_units() {
        let orch = Orchestrator::builder()
            .routing(routing())
            .config(config().with_retry(RetryConfig::none()))
            .adapters(AdapterSet::new().with(Arc::new(CrashingAdapter)))
            .build()
            .unwrap();

        let tasks = vec![Task::new("crash").with_id("a"), Task::new("hang").with_id("b")];
        let results = orch
            .execute_parallel_until(tasks, 2, tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap();

        assert!(results[0].error.as_deref().unwrap().starts_with("task unit crashed"));
        assert_eq!(results[1].error.as_deref(), Some("cancelled"));
        assert_eq!(orch.status().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_exhausted_hint_falls_to_next_tier() {
        let quota = Arc::new(QuotaTracker::with_entries([("gemini_free", 10, Some(10))]));
        let orch = orchestrator(two_platforms(), quota);
        let result = orch.submit(Task::new("x").with_hint("gemini")).await;
        assert_eq!(result.platform, "claude");
        assert_eq!(result.platforms_tried, vec!["claude"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_circuits() {
        let gemini = Arc::new(MockAdapter::new("gemini"));
        gemini.push_error(PlatformError::from_status(401, "bad key"));
        let orch = Orchestrator::builder()
            .routing(routing())
            .config(config().with_circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            }))
            .adapters(AdapterSet::new().with(gemini).with(Arc::new(MockAdapter::new("claude"))))
            .build()
            .unwrap();

        let result = orch.submit(Task::new("x")).await;
        assert_eq!(result.platform, "claude");

        let status = orch.status();
        assert_eq!(status.platforms, vec!["claude", "gemini"]);
        assert_eq!(status.circuits.get("gemini").map(String::as_str), Some("open"));
        assert_eq!(status.peak_in_flight, 1);
    }
}
