//! Platform adapter abstractions.
//!
//! An adapter is the only thing that talks to an execution backend. The
//! runtime never looks inside an adapter's transport or its own retries;
//! it sees a two-step `submit` / `await_result` protocol and a
//! [`PlatformError`] whose kind says whether the failure is transient.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use switchyard_core::{PlatformError, Task, TokenUsage};

pub mod mock;
mod registry;

pub use mock::{MockAdapter, MockAdapterFactory, MockConfig, MockFailure};
pub use registry::{AdapterFactory, AdapterSet, FactoryRegistry, PlatformSpec, RegistryError};

/// Receipt for a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionHandle {
    /// Adapter-scoped id
    pub id: String,

    /// Platform the task was submitted to
    pub platform: String,

    /// Task the handle belongs to
    pub task_id: String,

    pub submitted_at: DateTime<Utc>,
}

impl SubmissionHandle {
    pub fn new(id: impl Into<String>, platform: impl Into<String>, task: &Task) -> Self {
        Self {
            id: id.into(),
            platform: platform.into(),
            task_id: task.id.clone(),
            submitted_at: Utc::now(),
        }
    }
}

/// Output of a successful platform call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformOutput {
    /// Generated content
    pub content: String,

    /// Model that served the call, if the platform reports it
    pub model: Option<String>,

    /// Token usage
    pub usage: TokenUsage,
}

/// Adapter abstraction that lets backends be swapped freely.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform id used in routing and cost records.
    fn name(&self) -> &str;

    /// Hand a task to the backend.
    async fn submit(&self, task: &Task) -> Result<SubmissionHandle, PlatformError>;

    /// Wait for the backend's answer. Exceeding `timeout` must surface as a
    /// timeout error.
    async fn await_result(
        &self,
        handle: &SubmissionHandle,
        timeout: Duration,
    ) -> Result<PlatformOutput, PlatformError>;
}

/// Submit and wait, bounding the whole exchange by `timeout`.
pub async fn call_platform(
    adapter: &dyn PlatformAdapter,
    task: &Task,
    timeout: Duration,
) -> Result<PlatformOutput, PlatformError> {
    let exchange = async {
        let handle = adapter.submit(task).await?;
        adapter.await_result(&handle, timeout).await
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(PlatformError::timeout(timeout)),
    }
}
