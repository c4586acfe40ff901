//! Task data model
//!
//! A task is one user request driven through planning, per-subtask
//! generation and review, until it reaches a terminal status.

use anvil_llm::Complexity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCategory;

/// Task identifier
pub type TaskId = Uuid;

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for (or running) the planner
    Planning,
    /// Generating the active subtask's artifact
    Executing,
    /// Checking the artifact against acceptance criteria
    Reviewing,
    /// Blocked on a human decision
    AwaitingApproval,
    /// Every subtask passed review
    Completed,
    /// Stopped with an error
    Failed,
    /// Stopped by an interrupt request
    Interrupted,
}

impl TaskStatus {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Reviewing => "reviewing",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        }
    }

    /// No further transitions happen from a terminal status
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Interrupted)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a subtask is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskKind {
    /// Generated by a model
    Code,
    /// Produced by invoking a tool
    Tool,
}

/// One planned unit of work. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    /// Identifier, unique within the plan
    pub id: String,
    /// What to do
    #[serde(rename = "type")]
    pub kind: SubtaskKind,
    /// Natural-language description
    pub description: String,
    /// Ids of subtasks that must complete first
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Conditions the result must satisfy, all of them
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Tool to run (tool subtasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Arguments for the tool (tool subtasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<serde_json::Value>,
    /// Routing hint
    #[serde(default)]
    pub complexity: Complexity,
}

/// Verdict on a single acceptance criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionResult {
    /// The criterion text
    pub criterion: String,
    /// Whether it was met
    pub passed: bool,
    /// Reviewer's note
    #[serde(default)]
    pub note: String,
}

/// Outcome of a review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFeedback {
    /// True only when every criterion passed
    pub passed: bool,
    /// Free-text feedback for the next attempt
    pub feedback: String,
    /// Per-criterion verdicts
    #[serde(default)]
    pub criteria: Vec<CriterionResult>,
}

/// A subtask that passed review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskResult {
    /// Subtask id
    pub subtask_id: String,
    /// Accepted artifact
    pub artifact: String,
    /// Generation attempts it took
    pub attempts: u32,
    /// Where the artifact was stored, if anywhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
}

/// Cumulative model usage for a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Prompt tokens across all calls
    pub prompt_tokens: u64,
    /// Completion tokens across all calls
    pub completion_tokens: u64,
    /// Model calls dispatched to a backend
    pub model_calls: u32,
    /// Model calls answered from the cache
    pub cache_hits: u32,
    /// Estimated spend in dollars
    pub estimated_cost: f64,
}

/// Full state of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    /// Task id
    pub id: TaskId,
    /// Original request
    pub input: String,
    /// Optional context supplied with the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    /// Identity charged by the rate limiter
    pub identity: String,
    /// Ordered plan
    pub plan: Vec<Subtask>,
    /// Index of the active subtask
    pub current_index: usize,
    /// Accepted subtasks, in order
    pub completed: Vec<SubtaskResult>,
    /// Most recent artifact for the active subtask
    pub artifact: Option<String>,
    /// Where the most recent artifact was stored
    pub artifact_path: Option<String>,
    /// Whether the tool behind the most recent artifact succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_success: Option<bool>,
    /// Most recent review
    pub review: Option<ReviewFeedback>,
    /// Accumulated review feedback for the active subtask, newest first
    pub feedback: String,
    /// Failed reviews for the active subtask
    pub retry_count: u32,
    /// Failed reviews across the whole task. Never reset.
    pub iterations: u32,
    /// Cumulative model usage
    pub usage: UsageTotals,
    /// Current status
    pub status: TaskStatus,
    /// An interrupt was requested
    pub interrupted: bool,
    /// Result once completed
    pub final_output: Option<String>,
    /// Human-readable failure, prefixed by its category
    pub error: Option<String>,
    /// Category of the failure
    pub error_category: Option<ErrorCategory>,
    /// Subtask whose high-risk tool call was approved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_subtask: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    /// Fresh task in `planning`
    #[must_use]
    pub fn new(
        input: impl Into<String>,
        context: Option<serde_json::Value>,
        identity: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            input: input.into(),
            context,
            identity: identity.into(),
            plan: Vec::new(),
            current_index: 0,
            completed: Vec::new(),
            artifact: None,
            artifact_path: None,
            tool_success: None,
            review: None,
            feedback: String::new(),
            retry_count: 0,
            iterations: 0,
            usage: UsageTotals::default(),
            status: TaskStatus::Planning,
            interrupted: false,
            final_output: None,
            error: None,
            error_category: None,
            approved_subtask: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The subtask being worked on
    #[must_use]
    pub fn current_subtask(&self) -> Option<&Subtask> {
        self.plan.get(self.current_index)
    }

    /// Move to `status`, stamping the update time
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Move to `failed` with a categorized message
    pub fn fail(&mut self, category: ErrorCategory, message: impl Into<String>) {
        self.error = Some(message.into());
        self.error_category = Some(category);
        self.set_status(TaskStatus::Failed);
    }

    /// Accept the current artifact and move to the next subtask.
    ///
    /// Resets the per-subtask retry counter and feedback. The last review is
    /// kept until the next one replaces it.
    pub fn accept_current(&mut self) {
        if let Some(subtask) = self.plan.get(self.current_index) {
            self.completed.push(SubtaskResult {
                subtask_id: subtask.id.clone(),
                artifact: self.artifact.take().unwrap_or_default(),
                attempts: self.retry_count + 1,
                artifact_path: self.artifact_path.take(),
            });
        }
        self.current_index += 1;
        self.tool_success = None;
        self.retry_count = 0;
        self.feedback.clear();
        self.approved_subtask = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Interrupted.is_terminal());
        assert!(!TaskStatus::AwaitingApproval.is_terminal());
        assert!(!TaskStatus::Planning.is_terminal());
    }

    #[test]
    fn test_subtask_deserializes_planner_shape() {
        let subtask: Subtask = serde_json::from_str(
            r#"{"id": "s1", "type": "code", "description": "print it",
                "acceptance_criteria": ["prints hello"], "complexity": "simple"}"#,
        )
        .unwrap();

        assert_eq!(subtask.kind, SubtaskKind::Code);
        assert!(subtask.depends_on.is_empty());
        assert_eq!(subtask.complexity, Complexity::Simple);
    }

    #[test]
    fn test_accept_current_resets_retry_state() {
        let mut state = TaskState::new("x", None, "anon");
        state.plan.push(Subtask {
            id: "s1".into(),
            kind: SubtaskKind::Code,
            description: "d".into(),
            depends_on: vec![],
            acceptance_criteria: vec![],
            tool_name: None,
            tool_args: None,
            complexity: Complexity::Medium,
        });
        state.artifact = Some("print(42)".into());
        state.retry_count = 2;
        state.feedback = "try again".into();

        state.accept_current();

        assert_eq!(state.current_index, 1);
        assert_eq!(state.retry_count, 0);
        assert!(state.feedback.is_empty());
        assert_eq!(state.completed[0].attempts, 3);
        assert_eq!(state.completed[0].artifact, "print(42)");
    }
}
