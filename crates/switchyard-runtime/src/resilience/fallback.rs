//! Retry-then-switch execution across platforms.
//!
//! A task first runs on its routed platform. Transient failures are retried
//! there with exponential backoff; once retries run out, or on the first
//! non-retryable failure, execution moves to the next platform in the
//! fallback order. The walk always ends in a [`TaskResult`], never an error.

use backon::Retryable;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use switchyard_core::{CostTiers, PlatformError, PricingTable, Router, Task, TaskResult};

use super::{CircuitBreaker, RetryConfig};
use crate::platforms::{call_platform, AdapterSet, PlatformAdapter, PlatformOutput};

/// Runs one task to completion against the configured platforms.
pub struct FallbackExecutor {
    adapters: AdapterSet,
    tiers: CostTiers,
    default_platform: String,
    pricing: Arc<PricingTable>,
    retry: RetryConfig,
    call_timeout: Duration,
    breaker: Arc<CircuitBreaker>,
}

impl FallbackExecutor {
    pub fn new(
        adapters: AdapterSet,
        router: &Router,
        pricing: Arc<PricingTable>,
        retry: RetryConfig,
        call_timeout: Duration,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            adapters,
            tiers: router.tiers().clone(),
            default_platform: router.default_platform().to_string(),
            pricing,
            retry,
            call_timeout,
            breaker,
        }
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Platforms to try, in order: `preferred`, then the tier platforms by
    /// rank, then the default platform. Only platforms with an adapter are
    /// listed, each once.
    pub fn fallback_order(&self, preferred: &str) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        let candidates = std::iter::once(preferred)
            .chain(self.tiers.platforms())
            .chain(std::iter::once(self.default_platform.as_str()));

        for platform in candidates {
            if self.adapters.contains(platform) && !order.iter().any(|p| p == platform) {
                order.push(platform.to_string());
            }
        }
        order
    }

    /// Execute `task`, starting on `preferred`.
    pub async fn execute_with_fallback(&self, task: &Task, preferred: &str) -> TaskResult {
        let started = Instant::now();
        let order = self.fallback_order(preferred);

        if order.is_empty() {
            tracing::error!(task_id = %task.id, platform = %preferred, "No adapter available for any platform");
            let mut result = TaskResult::failed(
                task,
                preferred,
                format!("no platform adapter available (routed to '{}')", preferred),
            );
            result.duration_ms = elapsed_ms(started);
            return result;
        }

        let mut tried: Vec<String> = Vec::new();
        let mut attempts: u32 = 0;
        let mut failures: Vec<String> = Vec::new();
        let mut last_error: Option<PlatformError> = None;

        let last_index = order.len() - 1;
        for (index, platform) in order.into_iter().enumerate() {
            // The last platform is always attempted so an open circuit can
            // never fail a task without a single backend call.
            if index < last_index && self.breaker.is_open(&platform) {
                tracing::debug!(task_id = %task.id, platform = %platform, "Circuit open, skipping platform");
                failures.push(format!("{}: circuit open", platform));
                continue;
            }
            let Some(adapter) = self.adapters.get(&platform) else {
                continue;
            };

            if !tried.is_empty() {
                tracing::info!(
                    task_id = %task.id,
                    from = %tried[tried.len() - 1],
                    to = %platform,
                    "Switching platform"
                );
            }
            tried.push(platform.clone());

            let calls = AtomicU32::new(0);
            let outcome = self
                .run_on_platform(task, &platform, adapter.as_ref(), &calls)
                .await;
            let calls = calls.load(Ordering::SeqCst);
            attempts += calls;

            match outcome {
                Ok(output) => {
                    self.breaker.record_success(&platform);
                    return self.success(task, platform, output, tried, attempts, started);
                }
                Err(err) => {
                    tracing::warn!(
                        task_id = %task.id,
                        platform = %platform,
                        attempts = calls,
                        error = %err,
                        "Abandoning platform"
                    );
                    if err.kind.is_platform_fault() {
                        self.breaker.record_failure(&platform);
                    }
                    failures.push(format!(
                        "{} ({} attempt{}): {}",
                        platform,
                        calls,
                        if calls == 1 { "" } else { "s" },
                        err
                    ));
                    last_error = Some(err);
                }
            }
        }

        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no platform attempted".to_string());
        let platform = tried.last().cloned().unwrap_or_else(|| preferred.to_string());
        tracing::error!(task_id = %task.id, tried = ?tried, "All platforms failed");

        let mut result = TaskResult::failed(
            task,
            platform,
            format!("all platforms failed [{}]; last error: {}", failures.join("; "), last),
        );
        result.platforms_tried = tried;
        result.attempts = attempts;
        result.duration_ms = elapsed_ms(started);
        result
    }

    async fn run_on_platform(
        &self,
        task: &Task,
        platform: &str,
        adapter: &dyn PlatformAdapter,
        calls: &AtomicU32,
    ) -> Result<PlatformOutput, PlatformError> {
        let timeout = task
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.call_timeout);

        (|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            call_platform(adapter, task, timeout).await
        })
        .retry(self.retry.backoff())
        .sleep(tokio::time::sleep)
        .when(|e: &PlatformError| e.is_retryable())
        .notify(|e: &PlatformError, delay: Duration| {
            tracing::warn!(
                task_id = %task.id,
                platform = %platform,
                error = %e,
                delay = ?delay,
                "Transient failure, retrying"
            );
        })
        .await
    }

    fn success(
        &self,
        task: &Task,
        platform: String,
        output: PlatformOutput,
        tried: Vec<String>,
        attempts: u32,
        started: Instant,
    ) -> TaskResult {
        let model = output
            .model
            .clone()
            .or_else(|| task.model.clone())
            .unwrap_or_else(|| platform.clone());
        let cost = self.pricing.cost_for(&model, &output.usage);

        tracing::debug!(
            task_id = %task.id,
            platform = %platform,
            model = %model,
            attempts = attempts,
            "Task succeeded"
        );

        TaskResult {
            task_id: task.id.clone(),
            platform,
            success: true,
            output: Some(output.content),
            model: Some(model),
            cost,
            usage: output.usage,
            duration_ms: elapsed_ms(started),
            error: None,
            platforms_tried: tried,
            attempts,
            chain_id: task.context.chain_id.clone(),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MockAdapter;
    use crate::resilience::CircuitBreakerConfig;
    use switchyard_core::{CostTier, TokenUsage};

    fn router() -> Router {
        Router::new(
            CostTiers::new(vec![
                CostTier::new("gemini", "gemini_free", 0.0, 1),
                CostTier::new("groq", "groq_free", 0.0, 2),
                CostTier::new("claude", "claude_subscription", 1.0, 3),
            ]),
            "claude",
        )
    }

    fn executor(adapters: AdapterSet) -> FallbackExecutor {
        FallbackExecutor::new(
            adapters,
            &router(),
            Arc::new(PricingTable::builtin()),
            RetryConfig::default(),
            Duration::from_secs(30),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig::disabled())),
        )
    }

    #[test]
    fn test_fallback_order_skips_missing_adapters() {
        let exec = executor(
            AdapterSet::new()
                .with(Arc::new(MockAdapter::new("claude")))
                .with(Arc::new(MockAdapter::new("gemini"))),
        );
        assert_eq!(exec.fallback_order("claude"), vec!["claude", "gemini"]);
        assert_eq!(exec.fallback_order("groq"), vec!["gemini", "claude"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success_on_same_platform() {
        let gemini = Arc::new(MockAdapter::new("gemini").with_model("gemini-2.5-flash"));
        gemini.push_error(PlatformError::from_status(503, "unavailable"));
        gemini.push_error(PlatformError::from_message("connection reset"));
        let exec = executor(AdapterSet::new().with(gemini.clone()));

        let started = Instant::now();
        let result = exec.execute_with_fallback(&Task::new("hi"), "gemini").await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.platforms_tried, vec!["gemini"]);
        assert_eq!(result.platform_switches(), 0);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_switches_immediately() {
        let gemini = Arc::new(MockAdapter::new("gemini"));
        gemini.push_error(PlatformError::from_status(401, "bad key"));
        let claude = Arc::new(MockAdapter::new("claude").with_model("claude-sonnet-4-5"));
        let exec = executor(AdapterSet::new().with(gemini.clone()).with(claude));

        let started = Instant::now();
        let result = exec.execute_with_fallback(&Task::new("hi"), "gemini").await;

        assert!(result.success);
        assert_eq!(result.platform, "claude");
        assert_eq!(result.platforms_tried, vec!["gemini", "claude"]);
        assert_eq!(result.attempts, 2);
        assert_eq!(gemini.call_count(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_every_platform() {
        let gemini = Arc::new(MockAdapter::new("gemini"));
        gemini.fail_when_prompt_contains("boom", PlatformError::from_status(400, "bad request"));
        let claude = Arc::new(MockAdapter::new("claude"));
        claude.fail_when_prompt_contains("boom", PlatformError::from_message("quota exceeded"));
        let exec = executor(AdapterSet::new().with(gemini).with(claude));

        let result = exec.execute_with_fallback(&Task::new("boom").with_id("t1"), "gemini").await;

        assert!(!result.success);
        assert_eq!(result.task_id, "t1");
        assert_eq!(result.platform, "claude");
        let error = result.error.unwrap();
        assert!(error.contains("gemini"));
        assert!(error.contains("claude"));
        assert!(error.contains("quota"));
    }

    #[tokio::test]
    async fn test_no_adapters_fails_without_panicking() {
        let exec = executor(AdapterSet::new());
        let result = exec.execute_with_fallback(&Task::new("hi"), "gemini").await;
        assert!(!result.success);
        assert_eq!(result.attempts, 0);
        assert!(result.error.unwrap().contains("no platform adapter"));
    }

    #[tokio::test]
    async fn test_cost_uses_reported_model() {
        let claude = Arc::new(
            MockAdapter::new("claude")
                .with_model("claude-sonnet-4-5")
                .with_usage(TokenUsage::new(1_000_000, 0)),
        );
        let exec = executor(AdapterSet::new().with(claude));
        let result = exec.execute_with_fallback(&Task::new("hi"), "claude").await;
        assert!((result.cost - 3.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_is_skipped() {
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        }));
        breaker.record_failure("gemini");
        let gemini = Arc::new(MockAdapter::new("gemini"));
        let exec = FallbackExecutor::new(
            AdapterSet::new().with(gemini.clone()).with(Arc::new(MockAdapter::new("claude"))),
            &router(),
            Arc::new(PricingTable::builtin()),
            RetryConfig::default(),
            Duration::from_secs(30),
            breaker,
        );

        let result = exec.execute_with_fallback(&Task::new("hi"), "gemini").await;
        assert_eq!(result.platform, "claude");
        assert_eq!(gemini.call_count(), 0);
    }

    fn open_breaker(platforms: &[&str]) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        }));
        for platform in platforms {
            breaker.record_failure(platform);
        }
        breaker
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_platform_runs_even_when_every_circuit_is_open() {
        let gemini = Arc::new(MockAdapter::new("gemini"));
        let claude = Arc::new(MockAdapter::new("claude"));
        let exec = FallbackExecutor::new(
            AdapterSet::new().with(gemini.clone()).with(claude.clone()),
            &router(),
            Arc::new(PricingTable::builtin()),
            RetryConfig::none(),
            Duration::from_secs(30),
            open_breaker(&["gemini", "claude"]),
        );

        let result = exec.execute_with_fallback(&Task::new("hi"), "gemini").await;
        assert!(result.success);
        assert_eq!(result.platform, "claude");
        assert_eq!(gemini.call_count(), 0);
        assert_eq!(claude.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_specific_failures_leave_circuits_closed() {
        let breaker = open_breaker(&[]);
        let gemini = Arc::new(MockAdapter::new("gemini"));
        gemini.fail_when_prompt_contains("poison", PlatformError::from_message("model refused this content"));
        gemini.fail_when_prompt_contains("broken", PlatformError::from_status(400, "bad body"));
        let exec = FallbackExecutor::new(
            AdapterSet::new().with(gemini.clone()),
            &router(),
            Arc::new(PricingTable::builtin()),
            RetryConfig::none(),
            Duration::from_secs(30),
            breaker.clone(),
        );

        for prompt in ["poison", "broken"] {
            assert!(!exec.execute_with_fallback(&Task::new(prompt), "gemini").await.success);
        }
        assert_eq!(breaker.state("gemini").label(), "closed");

        gemini.push_error(PlatformError::from_status(503, "unavailable"));
        exec.execute_with_fallback(&Task::new("fine"), "gemini").await;
        assert_eq!(breaker.state("gemini").label(), "open");
    }
}
