//! Same-platform retry policy.

use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use switchyard_core::ConfigError;

/// Exponential backoff for transient failures on one platform.
///
/// With the defaults a task sees up to four calls on a platform, with
/// waits of 1s, 2s and 4s between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first call
    pub max_retries: usize,

    /// Wait before the first retry; doubles on each further retry
    #[serde(with = "crate::config::duration_str")]
    pub base_delay: Duration,

    /// Upper bound for a single wait
    #[serde(with = "crate::config::duration_str")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay > self.max_delay {
            return Err(ConfigError::invalid(
                "retry.base_delay",
                format!(
                    "{} exceeds retry.max_delay {}",
                    humantime::format_duration(self.base_delay),
                    humantime::format_duration(self.max_delay)
                ),
            ));
        }
        Ok(())
    }

    /// Backoff schedule for `backon`.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_retries)
    }
}
