//! # switchyard-runtime
//!
//! Async execution for Switchyard.
//!
//! `switchyard-core` decides where a task should go and what it costs;
//! this crate actually runs it. It provides:
//! - Bounded-concurrency batch execution with results in submission order
//! - Same-platform retry with exponential backoff, then platform fallback
//! - Parent-to-child handoffs through a context store
//! - Chain totals and SQLite-backed cost records
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use switchyard_core::Task;
//! use switchyard_runtime::{AdapterSet, MockAdapter, Orchestrator};
//!
//! let orchestrator = Orchestrator::builder()
//!     .adapters(AdapterSet::new().with(Arc::new(MockAdapter::new("gemini"))))
//!     .build()?;
//!
//! let batch = orchestrator
//!     .execute_batch(vec![Task::new("summarize"), Task::new("translate")])
//!     .await?;
//! assert_eq!(batch.results.len(), 2);
//! ```

pub mod chain;
pub mod config;
pub mod cost;
pub mod handoff;
pub mod orchestrator;
pub mod platforms;
pub mod quota;
pub mod resilience;

pub use chain::ChainTracker;
pub use config::RuntimeConfig;
pub use cost::{CostError, CostRecord, CostStore, CostTracker, PlatformTotal, SessionSummary};
pub use handoff::{ContextStore, HandoffError, HandoffManager, MemoryContextStore};
pub use orchestrator::{
    adaptive_concurrency, Orchestrator, OrchestratorBuilder, OrchestratorStatus, RuntimeError,
};
pub use platforms::{
    AdapterFactory, AdapterSet, FactoryRegistry, MockAdapter, PlatformAdapter, PlatformOutput,
    PlatformSpec, SubmissionHandle,
};
pub use quota::QuotaTracker;
pub use resilience::{CircuitBreakerConfig, FallbackExecutor, RetryConfig};
