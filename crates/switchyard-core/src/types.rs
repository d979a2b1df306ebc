//! Core types for task dispatch.
//!
//! A [`Task`] is immutable once submitted. Its [`TaskContext`] is an explicit
//! struct rather than an open map, so "this task is a handoff child" is a
//! type-level fact (`context.handoff.is_some()`) and not a key lookup.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;

/// Generate a fresh task identifier.
pub fn new_task_id() -> String {
    format!("task-{}", Uuid::new_v4().simple())
}

/// Generate a fresh chain identifier.
pub fn new_chain_id() -> String {
    format!("chain-{}", Uuid::new_v4().simple())
}

/// What sort of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Writing or modifying code
    Code,

    /// Reviewing existing material
    Review,

    /// Open-ended investigation
    Research,

    /// Condensing a larger input
    Summarize,

    /// Anything else
    #[default]
    General,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Code => write!(f, "code"),
            TaskKind::Review => write!(f, "review"),
            TaskKind::Research => write!(f, "research"),
            TaskKind::Summarize => write!(f, "summarize"),
            TaskKind::General => write!(f, "general"),
        }
    }
}

/// Reference to a parent task's output held in the external context store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRef {
    /// Pointer id into the context store
    pub pointer: String,

    /// Short summary of the parent output (at most 500 chars)
    pub summary: String,

    /// The task that produced the referenced output
    pub parent_task_id: String,
}

/// Typed task context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    /// Present only for tasks spawned through a handoff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<HandoffRef>,

    /// Chain this task belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,

    /// Parent output resolved from the context store just before dispatch
    #[serde(skip)]
    pub handoff_payload: Option<String>,
}

/// A unit of work to submit to a platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id
    #[serde(default = "new_task_id")]
    pub id: String,

    /// Kind of work
    #[serde(default)]
    pub kind: TaskKind,

    /// Prompt or payload sent to the platform
    pub prompt: String,

    /// Advisory platform preference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_hint: Option<String>,

    /// Model requested from the platform (used for pricing when the
    /// platform does not report one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Per-call timeout override in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Typed context (handoff pointer, chain id)
    #[serde(default)]
    pub context: TaskContext,
}

impl Task {
    /// Create a general task with a fresh id.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: new_task_id(),
            kind: TaskKind::General,
            prompt: prompt.into(),
            platform_hint: None,
            model: None,
            timeout_secs: None,
            context: TaskContext::default(),
        }
    }

    /// Set an explicit id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the task kind.
    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set a platform hint.
    pub fn with_hint(mut self, platform: impl Into<String>) -> Self {
        self.platform_hint = Some(platform.into());
        self
    }

    /// Set the requested model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Place the task in a chain.
    pub fn in_chain(mut self, chain_id: impl Into<String>) -> Self {
        self.context.chain_id = Some(chain_id.into());
        self
    }

    /// Chain id, if any.
    pub fn chain_id(&self) -> Option<&str> {
        self.context.chain_id.as_deref()
    }

    /// Whether this task was spawned from a parent's output.
    pub fn is_handoff_child(&self) -> bool {
        self.context.handoff.is_some()
    }

    /// Attach the resolved parent output.
    pub fn with_handoff_payload(mut self, payload: impl Into<String>) -> Self {
        self.context.handoff_payload = Some(payload.into());
        self
    }

    /// Text a platform should receive: the prompt, followed by the parent's
    /// full output once it has been resolved.
    pub fn dispatch_prompt(&self) -> Cow<'_, str> {
        match (&self.context.handoff_payload, &self.context.handoff) {
            (Some(payload), Some(handoff)) => Cow::Owned(format!(
                "{}\n\n[output of task {}]\n{}",
                self.prompt, handoff.parent_task_id, payload
            )),
            (Some(payload), None) => Cow::Owned(format!("{}\n\n{}", self.prompt, payload)),
            (None, _) => Cow::Borrowed(&self.prompt),
        }
    }
}

/// Token counts for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens sent to the platform
    pub input_tokens: u64,

    /// Tokens produced by the platform
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Outcome of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// The task this result belongs to
    pub task_id: String,

    /// Platform that produced the result (last one attempted on failure)
    pub platform: String,

    /// Whether the task succeeded
    pub success: bool,

    /// Platform output on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Model reported by the platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Cost in USD
    pub cost: f64,

    /// Token usage
    pub usage: TokenUsage,

    /// Wall time for the full fallback/retry lifecycle
    pub duration_ms: u64,

    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Platforms attempted, in order
    #[serde(default)]
    pub platforms_tried: Vec<String>,

    /// Total calls made across all platforms
    #[serde(default)]
    pub attempts: u32,

    /// Chain the task belonged to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

impl TaskResult {
    /// Build a failed result that never reached a platform.
    pub fn failed(task: &Task, platform: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task.id.clone(),
            platform: platform.into(),
            success: false,
            output: None,
            model: None,
            cost: 0.0,
            usage: TokenUsage::default(),
            duration_ms: 0,
            error: Some(error.into()),
            platforms_tried: Vec::new(),
            attempts: 0,
            chain_id: task.context.chain_id.clone(),
        }
    }

    /// Number of times execution moved to another platform.
    pub fn platform_switches(&self) -> usize {
        self.platforms_tried.len().saturating_sub(1)
    }
}
