//! Runtime configuration.
//!
//! Durations are written the way people say them (`"1s"`, `"500ms"`,
//! `"24h"`) and parsed with `humantime`. Every limit is checked by
//! [`RuntimeConfig::validate`]; a zero concurrency limit or an
//! out-of-range threshold is rejected at construction, never defaulted.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Semaphore;

use switchyard_core::{ConfigError, DEFAULT_COST_WARN_TOKENS};

use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Base number of tasks allowed to hold an execution permit at once
    pub concurrency_limit: usize,

    /// Deadline for a single platform call
    #[serde(with = "duration_str")]
    pub call_timeout: Duration,

    /// Same-platform retry policy
    pub retry: RetryConfig,

    /// Free-tier utilization at which quota warnings fire
    pub quota_warn_fraction: f64,

    /// Estimated prompt tokens above which cost warnings fire
    pub cost_warn_threshold_tokens: u64,

    /// How long handoff payloads stay in the in-memory context store
    #[serde(with = "duration_str")]
    pub handoff_ttl: Duration,

    /// Maximum handoff payloads kept in the in-memory context store
    pub handoff_capacity: u64,

    /// Per-platform circuit breaker
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            call_timeout: Duration::from_secs(120),
            retry: RetryConfig::default(),
            quota_warn_fraction: 0.9,
            cost_warn_threshold_tokens: DEFAULT_COST_WARN_TOKENS,
            handoff_ttl: Duration::from_secs(24 * 60 * 60),
            handoff_capacity: 10_000,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = breaker;
        self
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_concurrency_limit(self.concurrency_limit)?;

        if self.call_timeout.is_zero() {
            return Err(ConfigError::invalid("call_timeout", "must be greater than zero"));
        }

        if !(self.quota_warn_fraction > 0.0 && self.quota_warn_fraction <= 1.0) {
            return Err(ConfigError::invalid(
                "quota_warn_fraction",
                format!("must be in (0, 1], got {}", self.quota_warn_fraction),
            ));
        }

        if self.cost_warn_threshold_tokens == 0 {
            return Err(ConfigError::invalid(
                "cost_warn_threshold_tokens",
                "must be greater than zero",
            ));
        }

        if self.handoff_capacity == 0 {
            return Err(ConfigError::invalid("handoff_capacity", "must be greater than zero"));
        }

        self.retry.validate()?;
        self.circuit_breaker.validate()?;

        Ok(())
    }
}

/// A batch concurrency limit must admit at least one task and fit in a
/// tokio semaphore.
pub fn validate_concurrency_limit(limit: usize) -> Result<(), ConfigError> {
    if limit == 0 {
        return Err(ConfigError::invalid(
            "concurrency_limit",
            "must be at least 1",
        ));
    }
    if limit > Semaphore::MAX_PERMITS {
        return Err(ConfigError::invalid(
            "concurrency_limit",
            format!("must be at most {}, got {}", Semaphore::MAX_PERMITS, limit),
        ));
    }
    Ok(())
}

/// Serde adapter for human-readable durations.
pub(crate) mod duration_str {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}
