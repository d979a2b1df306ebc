//! Resilience patterns for switchyard-runtime.
//!
//! This module provides:
//! - Exponential retry on one platform
//! - Fallback across platforms
//! - A per-platform circuit breaker

mod circuit_breaker;
mod fallback;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use fallback::FallbackExecutor;
pub use retry::RetryConfig;
