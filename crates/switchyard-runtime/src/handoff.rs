//! Parent-to-child handoffs through an external context store.
//!
//! The full parent output goes into the store under a fresh pointer; the
//! child task only carries that pointer and a short summary. Resolving a
//! pointer that the store no longer knows is fatal for the child.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use switchyard_core::{new_chain_id, HandoffContext, Task, TaskKind, TaskResult};

/// Errors from handoff operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandoffError {
    /// A child's pointer could not be resolved.
    #[error("handoff context '{pointer}' from parent task '{parent_task_id}' is missing")]
    Missing {
        pointer: String,
        parent_task_id: String,
    },

    #[error("context store error: {0}")]
    Store(String),
}

/// Durable store for handoff payloads.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Store `payload` and return its pointer id.
    async fn put(&self, payload: String) -> Result<String, HandoffError>;

    /// Fetch a payload; `Ok(None)` when the pointer is unknown.
    async fn get(&self, pointer: &str) -> Result<Option<String>, HandoffError>;
}

/// In-process context store with a TTL, backed by moka.
pub struct MemoryContextStore {
    cache: Cache<String, String>,
}

impl MemoryContextStore {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Drop a payload before its TTL.
    pub async fn remove(&self, pointer: &str) {
        self.cache.invalidate(pointer).await;
    }
}

impl Default for MemoryContextStore {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(24 * 60 * 60))
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn put(&self, payload: String) -> Result<String, HandoffError> {
        let pointer = format!("ctx-{}", uuid::Uuid::new_v4().simple());
        self.cache.insert(pointer.clone(), payload).await;
        Ok(pointer)
    }

    async fn get(&self, pointer: &str) -> Result<Option<String>, HandoffError> {
        Ok(self.cache.get(pointer).await)
    }
}

/// Builds child tasks and resolves their context.
#[derive(Clone)]
pub struct HandoffManager {
    store: Arc<dyn ContextStore>,
}

impl HandoffManager {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ContextStore> {
        &self.store
    }

    /// Store `parent`'s output and build the child task that follows it.
    ///
    /// The chain id is `chain_id` if given, else the parent's chain, else a
    /// new one.
    pub async fn spawn_child_task(
        &self,
        parent: &TaskResult,
        prompt: impl Into<String>,
        chain_id: Option<&str>,
    ) -> Result<(Task, HandoffContext), HandoffError> {
        let output = parent.output.clone().unwrap_or_default();
        let pointer = self.store.put(output.clone()).await?;

        let chain_id = chain_id
            .map(str::to_string)
            .or_else(|| parent.chain_id.clone())
            .unwrap_or_else(new_chain_id);

        let context = HandoffContext::new(pointer, parent, &output, chain_id);
        let child = context.child_task(prompt, TaskKind::General);

        tracing::info!(
            parent_task_id = %parent.task_id,
            child_task_id = %child.id,
            chain_id = %context.chain_id,
            pointer = %context.pointer,
            "Spawned child task"
        );

        Ok((child, context))
    }

    /// Resolve the handoff payload for `task`.
    ///
    /// Returns `Ok(None)` for tasks without a handoff.
    pub async fn load_handoff_context(&self, task: &Task) -> Result<Option<String>, HandoffError> {
        let Some(handoff) = task.context.handoff.as_ref() else {
            return Ok(None);
        };

        let missing = || HandoffError::Missing {
            pointer: handoff.pointer.clone(),
            parent_task_id: handoff.parent_task_id.clone(),
        };

        match self.store.get(&handoff.pointer).await {
            Ok(Some(payload)) => Ok(Some(payload)),
            Ok(None) => {
                tracing::error!(task_id = %task.id, pointer = %handoff.pointer, "Handoff context not found");
                Err(missing())
            }
            Err(e) => {
                tracing::error!(task_id = %task.id, pointer = %handoff.pointer, error = %e, "Handoff context lookup failed");
                Err(missing())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::SUMMARY_LIMIT;

    fn parent(output: &str) -> TaskResult {
        let mut result = TaskResult::failed(&Task::new("p").with_id("parent"), "gemini", "");
        result.success = true;
        result.error = None;
        result.output = Some(output.to_string());
        result
    }

    fn manager() -> (Arc<MemoryContextStore>, HandoffManager) {
        let store = Arc::new(MemoryContextStore::default());
        (store.clone(), HandoffManager::new(store))
    }

    #[tokio::test]
    async fn test_round_trip_returns_full_output() {
        let (_, handoff) = manager();
        let long = "x".repeat(2_000);
        let (child, context) = handoff
            .spawn_child_task(&parent(&long), "review it", Some("c1"))
            .await
            .unwrap();

        assert_eq!(context.summary.chars().count(), SUMMARY_LIMIT);
        assert_eq!(context.parent_task_id, "parent");
        assert_eq!(child.chain_id(), Some("c1"));
        assert!(child.is_handoff_child());
        assert_eq!(handoff.load_handoff_context(&child).await.unwrap(), Some(long));
    }

    #[tokio::test]
    async fn test_chain_id_inherited_from_parent() {
        let (_, handoff) = manager();
        let mut p = parent("out");
        p.chain_id = Some("chain-parent".to_string());
        let (child, _) = handoff.spawn_child_task(&p, "next", None).await.unwrap();
        assert_eq!(child.chain_id(), Some("chain-parent"));

        let (orphan, _) = handoff.spawn_child_task(&parent("out"), "next", None).await.unwrap();
        assert!(orphan.chain_id().unwrap().starts_with("chain-"));
    }

    #[tokio::test]
    async fn test_plain_task_has_no_handoff() {
        let (_, handoff) = manager();
        assert_eq!(handoff.load_handoff_context(&Task::new("x")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_deleted_payload_is_missing() {
        let (store, handoff) = manager();
        let (child, context) = handoff.spawn_child_task(&parent("out"), "next", None).await.unwrap();
        store.remove(&context.pointer).await;

        let err = handoff.load_handoff_context(&child).await.unwrap_err();
        assert_eq!(
            err,
            HandoffError::Missing {
                pointer: context.pointer,
                parent_task_id: "parent".to_string(),
            }
        );
    }
}
