//! In-process adapter for demos and tests.
//!
//! Outcomes are decided in order: a scripted queue first, then
//! prompt-substring failure rules, then a plain echo response.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use switchyard_core::{estimate_tokens, PlatformError, Task, TokenUsage};

use super::{AdapterFactory, PlatformAdapter, PlatformOutput, RegistryError, SubmissionHandle};

/// Failure rule: prompts containing `contains` fail with `message`,
/// classified like any platform error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockFailure {
    pub contains: String,
    pub message: String,
}

/// Configuration accepted by the `mock` adapter type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Model reported on every response
    pub model: Option<String>,

    /// Simulated latency per call
    #[serde(with = "crate::config::duration_str")]
    pub latency: Duration,

    /// Fixed response content instead of the echo
    pub response: Option<String>,

    pub failures: Vec<MockFailure>,
}

type Outcome = Result<String, PlatformError>;

/// Scriptable in-memory platform.
pub struct MockAdapter {
    name: String,
    model: Option<String>,
    response: Option<String>,
    usage: Option<TokenUsage>,
    latency: Duration,
    script: Mutex<VecDeque<Outcome>>,
    failures: Mutex<Vec<(String, PlatformError)>>,
    slow_prompts: Mutex<Vec<(String, Duration)>>,
    pending: Mutex<HashMap<String, String>>,
    next_handle: AtomicU64,
    calls: AtomicU32,
    outstanding: AtomicUsize,
    peak_outstanding: AtomicUsize,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            response: None,
            usage: None,
            latency: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            failures: Mutex::new(Vec::new()),
            slow_prompts: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
            calls: AtomicU32::new(0),
            outstanding: AtomicUsize::new(0),
            peak_outstanding: AtomicUsize::new(0),
        }
    }

    /// Build from factory configuration.
    pub fn from_config(name: impl Into<String>, config: MockConfig) -> Self {
        let adapter = Self {
            model: config.model,
            response: config.response,
            latency: config.latency,
            ..Self::new(name)
        };
        for rule in config.failures {
            adapter.fail_when_prompt_contains(rule.contains, PlatformError::from_message(rule.message));
        }
        adapter
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    /// Report fixed usage instead of estimating from text length.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue an error for the next call.
    pub fn push_error(&self, error: PlatformError) {
        self.script.lock().push_back(Err(error));
    }

    /// Queue a response for the next call.
    pub fn push_response(&self, content: impl Into<String>) {
        self.script.lock().push_back(Ok(content.into()));
    }

    /// Fail every call whose prompt contains `needle`.
    pub fn fail_when_prompt_contains(&self, needle: impl Into<String>, error: PlatformError) {
        self.failures.lock().push((needle.into(), error));
    }

    /// Delay calls whose prompt contains `needle` by `latency` instead of
    /// the adapter default.
    pub fn delay_when_prompt_contains(&self, needle: impl Into<String>, latency: Duration) {
        self.slow_prompts.lock().push((needle.into(), latency));
    }

    /// Number of `await_result` calls so far.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls in flight at once.
    pub fn peak_outstanding(&self) -> usize {
        self.peak_outstanding.load(Ordering::SeqCst)
    }

    fn latency_for(&self, prompt: &str) -> Duration {
        self.slow_prompts
            .lock()
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, latency)| *latency)
            .unwrap_or(self.latency)
    }

    fn outcome_for(&self, prompt: &str) -> Outcome {
        if let Some(scripted) = self.script.lock().pop_front() {
            return scripted;
        }
        if let Some((_, error)) = self
            .failures
            .lock()
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
        {
            return Err(error.clone());
        }
        Ok(self
            .response
            .clone()
            .unwrap_or_else(|| format!("[{}] {}", self.name, prompt)))
    }
}

struct OutstandingGuard<'a>(&'a AtomicUsize);

impl Drop for OutstandingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, task: &Task) -> Result<SubmissionHandle, PlatformError> {
        let id = format!(
            "{}-{}",
            self.name,
            self.next_handle.fetch_add(1, Ordering::SeqCst)
        );
        self.pending.lock().insert(id.clone(), task.dispatch_prompt().into_owned());
        Ok(SubmissionHandle::new(id, self.name.clone(), task))
    }

    async fn await_result(
        &self,
        handle: &SubmissionHandle,
        _timeout: Duration,
    ) -> Result<PlatformOutput, PlatformError> {
        let prompt = self.pending.lock().remove(&handle.id).ok_or_else(|| {
            PlatformError::from_status(404, format!("unknown submission '{}'", handle.id))
        })?;

        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_outstanding.fetch_max(now, Ordering::SeqCst);
        let _guard = OutstandingGuard(&self.outstanding);

        let latency = self.latency_for(&prompt);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let content = self.outcome_for(&prompt)?;
        let usage = self.usage.unwrap_or_else(|| {
            TokenUsage::new(estimate_tokens(&prompt), estimate_tokens(&content))
        });

        Ok(PlatformOutput {
            content,
            model: self.model.clone(),
            usage,
        })
    }
}

/// Factory for the `mock` adapter type.
pub struct MockAdapterFactory;

impl AdapterFactory for MockAdapterFactory {
    fn adapter_type(&self) -> &'static str {
        "mock"
    }

    fn create(
        &self,
        platform: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn PlatformAdapter>, RegistryError> {
        let config = parse_config(platform, config)?;
        Ok(Arc::new(MockAdapter::from_config(platform, config)))
    }

    fn validate_config(&self, platform: &str, config: &JsonValue) -> Result<(), RegistryError> {
        parse_config(platform, config).map(|_| ())
    }

    fn description(&self) -> &'static str {
        "In-process echo platform with scripted failures"
    }
}

fn parse_config(platform: &str, config: &JsonValue) -> Result<MockConfig, RegistryError> {
    if config.is_null() {
        return Ok(MockConfig::default());
    }
    serde_json::from_value(config.clone()).map_err(|e| RegistryError::InvalidConfig {
        platform: platform.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::ErrorKind;

    async fn run(adapter: &MockAdapter, prompt: &str) -> Result<PlatformOutput, PlatformError> {
        let task = Task::new(prompt);
        let handle = adapter.submit(&task).await?;
        adapter.await_result(&handle, Duration::from_secs(5)).await
    }

    #[tokio::test]
    async fn test_echo_response() {
        let adapter = MockAdapter::new("gemini").with_model("gemini-2.5-flash");
        let output = run(&adapter, "hello world!").await.unwrap();
        assert_eq!(output.content, "[gemini] hello world!");
        assert_eq!(output.model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(output.usage.input_tokens, 3);
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn test_script_runs_before_rules() {
        let adapter = MockAdapter::new("groq");
        adapter.push_error(PlatformError::from_status(429, "slow down"));
        adapter.push_response("scripted");

        let first = run(&adapter, "x").await.unwrap_err();
        assert_eq!(first.kind, ErrorKind::RateLimited);
        assert_eq!(run(&adapter, "x").await.unwrap().content, "scripted");
        assert_eq!(run(&adapter, "x").await.unwrap().content, "[groq] x");
    }

    #[tokio::test]
    async fn test_prompt_rule() {
        let adapter = MockAdapter::new("claude");
        adapter.fail_when_prompt_contains("secret", PlatformError::from_status(401, "denied"));
        assert!(run(&adapter, "tell me a secret").await.is_err());
        assert!(run(&adapter, "tell me a joke").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_handle_rejected() {
        let adapter = MockAdapter::new("claude");
        let handle = SubmissionHandle::new("nope", "claude", &Task::new("x"));
        assert!(adapter.await_result(&handle, Duration::from_secs(1)).await.is_err());
    }

    #[test]
    fn test_factory_parses_failures() {
        let config = serde_json::json!({
            "model": "llama-3.3-70b",
            "latency": "10ms",
            "failures": [{"contains": "bad", "message": "401 unauthorized"}]
        });
        assert!(MockAdapterFactory.validate_config("groq", &config).is_ok());
        assert!(MockAdapterFactory
            .validate_config("groq", &serde_json::json!({"latency": 5}))
            .is_err());
    }
}
