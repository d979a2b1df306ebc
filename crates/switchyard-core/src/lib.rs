//! # switchyard-core
//!
//! Deterministic dispatch policy for Switchyard.
//!
//! This crate answers, without doing any I/O:
//! - Which platform should run this task?
//! - Is this failure worth retrying?
//! - What did this task cost, and what will this prompt cost?
//! - How did the batch go?
//!
//! ## Key Guarantees
//!
//! 1. **Total routing**: [`Router::route`] always returns a platform
//! 2. **Explicit context**: handoff state is a typed field, never a map key
//! 3. **Zero-priced unknowns**: unknown models cost nothing instead of erroring
//! 4. **Stable aggregation**: batch summaries group through ordered maps
//!
//! ## Example
//!
//! ```rust,ignore
//! use switchyard_core::{RoutingConfig, Task};
//!
//! let config = RoutingConfig::from_yaml_file("routing.yaml")?;
//! let router = config.router();
//! let platform = router.route(&Task::new("summarize the diff"), &quota);
//! ```

pub mod aggregate;
pub mod chain;
pub mod config;
pub mod failure;
pub mod handoff;
pub mod pricing;
pub mod quota;
pub mod router;
pub mod tiers;
pub mod types;

// Re-export main types at crate root
pub use aggregate::AggregatedResult;
pub use chain::TaskChain;
pub use config::{ConfigError, RoutingConfig};
pub use failure::{classify_message, ErrorKind, PlatformError};
pub use handoff::{summarize, HandoffContext, SUMMARY_LIMIT};
pub use pricing::{estimate_tokens, CostEstimate, ModelPricing, PricingTable, DEFAULT_COST_WARN_TOKENS};
pub use quota::{QuotaStatus, QuotaView};
pub use router::{QuotaWarning, Router};
pub use tiers::{CostTier, CostTiers};
pub use types::{
    new_chain_id, new_task_id, HandoffRef, Task, TaskContext, TaskKind, TaskResult, TokenUsage,
};
