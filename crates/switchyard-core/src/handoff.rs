//! Handoff contexts: the bridge from a parent task's output to a child task.
//!
//! A child never receives the parent's full output. It receives a pointer
//! into the external context store and a summary capped at
//! [`SUMMARY_LIMIT`] characters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{new_task_id, HandoffRef, Task, TaskContext, TaskKind, TaskResult};

/// Maximum summary length, in characters.
pub const SUMMARY_LIMIT: usize = 500;

/// Pointer + summary linking a parent task to its child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffContext {
    /// Pointer id into the context store
    pub pointer: String,

    /// Parent output, truncated to `SUMMARY_LIMIT` characters
    pub summary: String,

    /// Task whose output was stored
    pub parent_task_id: String,

    /// Chain shared by parent and child
    pub chain_id: String,

    pub created_at: DateTime<Utc>,
}

impl HandoffContext {
    /// Build a context for `parent`'s `output` stored under `pointer`.
    pub fn new(pointer: impl Into<String>, parent: &TaskResult, output: &str, chain_id: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
            summary: summarize(output),
            parent_task_id: parent.task_id.clone(),
            chain_id: chain_id.into(),
            created_at: Utc::now(),
        }
    }

    /// The reference carried in the child's task context.
    pub fn to_ref(&self) -> HandoffRef {
        HandoffRef {
            pointer: self.pointer.clone(),
            summary: self.summary.clone(),
            parent_task_id: self.parent_task_id.clone(),
        }
    }

    /// Build the child task that consumes this handoff.
    pub fn child_task(&self, prompt: impl Into<String>, kind: TaskKind) -> Task {
        Task {
            id: new_task_id(),
            kind,
            prompt: prompt.into(),
            platform_hint: None,
            model: None,
            timeout_secs: None,
            context: TaskContext {
                handoff: Some(self.to_ref()),
                chain_id: Some(self.chain_id.clone()),
                handoff_payload: None,
            },
        }
    }
}

/// Truncate to `SUMMARY_LIMIT` characters on a char boundary.
pub fn summarize(output: &str) -> String {
    match output.char_indices().nth(SUMMARY_LIMIT) {
        Some((byte_idx, _)) => output[..byte_idx].to_string(),
        None => output.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenUsage;

    fn parent() -> TaskResult {
        TaskResult {
            task_id: "parent-1".to_string(),
            platform: "gemini".to_string(),
            success: true,
            output: Some("full output".to_string()),
            model: None,
            cost: 0.0,
            usage: TokenUsage::default(),
            duration_ms: 10,
            error: None,
            platforms_tried: vec!["gemini".to_string()],
            attempts: 1,
            chain_id: None,
        }
    }

    #[test]
    fn test_summary_truncated() {
        let long = "x".repeat(2_000);
        assert_eq!(summarize(&long).chars().count(), SUMMARY_LIMIT);
        assert_eq!(summarize("short"), "short");
    }

    #[test]
    fn test_summary_multibyte_boundary() {
        let long = "é".repeat(600);
        let summary = summarize(&long);
        assert_eq!(summary.chars().count(), SUMMARY_LIMIT);
        assert_eq!(summary.len(), SUMMARY_LIMIT * 2);
    }

    #[test]
    fn test_child_task_carries_handoff() {
        let ctx = HandoffContext::new("ptr-1", &parent(), "full output", "chain-1");
        let child = ctx.child_task("review it", TaskKind::Review);

        assert!(child.is_handoff_child());
        assert_eq!(child.chain_id(), Some("chain-1"));
        let handoff = child.context.handoff.unwrap();
        assert_eq!(handoff.pointer, "ptr-1");
        assert_eq!(handoff.parent_task_id, "parent-1");
        assert_eq!(handoff.summary, "full output");
    }
}
