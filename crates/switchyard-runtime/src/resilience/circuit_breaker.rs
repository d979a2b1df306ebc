//! Per-platform circuit breaker.
//!
//! A platform that keeps getting abandoned is skipped by the fallback walk
//! until its recovery timeout passes, so a dead backend stops costing every
//! task a full retry schedule.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

use switchyard_core::ConfigError;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,

    /// Consecutive abandonments before the circuit opens
    pub failure_threshold: u32,

    /// Time before a trial call is let through
    #[serde(with = "crate::config::duration_str")]
    pub recovery_timeout: Duration,

    /// Trial successes needed to close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.success_threshold",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// State of one platform's circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Platform is skipped
    Open { opened_at: Instant },

    /// Letting trial calls through
    HalfOpen { successes: u32 },
}

impl CircuitState {
    pub fn label(&self) -> &'static str {
        match self {
            CircuitState::Closed { .. } => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen { .. } => "half_open",
        }
    }
}

/// Circuits keyed by platform id.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// True if `platform` should be skipped right now.
    pub fn is_open(&self, platform: &str) -> bool {
        if !self.config.enabled {
            return false;
        }

        let states = self.states.read();
        match states.get(platform) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(platform);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, platform: &str) {
        if !self.config.enabled {
            return;
        }

        let mut states = self.states.write();
        match states.get(platform).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(platform.to_string(), CircuitState::Closed { failures: 0 });
                    tracing::info!(platform = %platform, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        platform.to_string(),
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(platform.to_string(), CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    /// Record that a task gave up on `platform`.
    pub fn record_failure(&self, platform: &str) {
        if !self.config.enabled {
            return;
        }

        let mut states = self.states.write();
        let failures = match states.get(platform).cloned() {
            Some(CircuitState::Closed { failures }) => failures + 1,
            None => 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    platform.to_string(),
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(platform = %platform, "Circuit reopened after failed recovery call");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                platform.to_string(),
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(
                platform = %platform,
                failures = failures,
                "Circuit opened after repeated failures"
            );
        } else {
            states.insert(platform.to_string(), CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, platform: &str) {
        let mut states = self.states.write();
        if matches!(states.get(platform), Some(CircuitState::Open { .. })) {
            states.insert(platform.to_string(), CircuitState::HalfOpen { successes: 0 });
            tracing::info!(platform = %platform, "Circuit half-open, letting a trial call through");
        }
    }

    pub fn state(&self, platform: &str) -> CircuitState {
        self.states
            .read()
            .get(platform)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// State label for every platform that has seen traffic.
    pub fn snapshot(&self) -> BTreeMap<String, &'static str> {
        self.states
            .read()
            .iter()
            .map(|(platform, state)| (platform.clone(), state.label()))
            .collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            ..Default::default()
        })
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_open("gemini"));
        assert_eq!(cb.state("gemini").label(), "closed");
    }

    #[test]
    fn test_circuit_opens_after_failures() {
        let cb = breaker(2);
        cb.record_failure("gemini");
        assert!(!cb.is_open("gemini"));
        cb.record_failure("gemini");
        assert!(cb.is_open("gemini"));
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = breaker(3);
        cb.record_failure("groq");
        cb.record_failure("groq");
        cb.record_success("groq");
        cb.record_failure("groq");
        cb.record_failure("groq");
        assert!(!cb.is_open("groq"));
    }

    #[test]
    fn test_platforms_are_independent() {
        let cb = breaker(1);
        cb.record_failure("gemini");
        assert!(cb.is_open("gemini"));
        assert!(!cb.is_open("claude"));
        assert_eq!(cb.snapshot().get("gemini"), Some(&"open"));
    }

    #[test]
    fn test_disabled_never_opens() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::disabled()
        });
        cb.record_failure("gemini");
        assert!(!cb.is_open("gemini"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_after_timeout() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            recovery_timeout: Duration::from_secs(30),
            enabled: true,
        });
        cb.record_failure("gemini");
        assert!(cb.is_open("gemini"));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!cb.is_open("gemini"));
        assert_eq!(cb.state("gemini").label(), "half_open");

        cb.record_success("gemini");
        assert_eq!(cb.state("gemini"), CircuitState::Closed { failures: 0 });
    }
}
