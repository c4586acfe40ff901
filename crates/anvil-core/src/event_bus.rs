//! EventBus - broadcast-based task lifecycle events
//!
//! Publishes events while tasks advance so SSE endpoints and internal
//! subscribers can follow along. Events carry ids and statuses only; full
//! artifacts are fetched through the task state.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::task::{TaskId, TaskStatus};

/// Events emitted while tasks advance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Task accepted
    Submitted {
        /// Task identifier
        task_id: TaskId,
        /// Rate-limit identity
        identity: String,
    },
    /// Status transition
    StatusChanged {
        /// Task identifier
        task_id: TaskId,
        /// Previous status
        from: TaskStatus,
        /// New status
        to: TaskStatus,
    },
    /// A model call finished
    ModelCall {
        /// Task identifier
        task_id: TaskId,
        /// Planner, coder or reviewer
        role: String,
        /// Model name
        model: String,
        /// Served from the response cache
        cached: bool,
    },
    /// A tool call finished
    ToolCall {
        /// Task identifier
        task_id: TaskId,
        /// Tool name
        tool_name: String,
        /// Whether the tool succeeded
        success: bool,
        /// Execution duration in milliseconds
        duration_ms: u64,
    },
    /// A review finished
    Reviewed {
        /// Task identifier
        task_id: TaskId,
        /// Subtask reviewed
        subtask_id: String,
        /// Verdict
        passed: bool,
        /// Retry counter after this review
        retry_count: u32,
    },
    /// A human decision is needed
    ApprovalRequired {
        /// Task identifier
        task_id: TaskId,
        /// Why
        reason: String,
    },
    /// Task reached a terminal status
    Finished {
        /// Task identifier
        task_id: TaskId,
        /// Terminal status
        status: TaskStatus,
    },
}

impl TaskEvent {
    /// Task the event belongs to
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Submitted { task_id, .. }
            | Self::StatusChanged { task_id, .. }
            | Self::ModelCall { task_id, .. }
            | Self::ToolCall { task_id, .. }
            | Self::Reviewed { task_id, .. }
            | Self::ApprovalRequired { task_id, .. }
            | Self::Finished { task_id, .. } => *task_id,
        }
    }
}

/// Broadcast bus for [`TaskEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to all future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of subscribers reached; with no
    /// subscribers the event is dropped.
    pub fn publish(&self, event: TaskEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Current number of subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
