//! Approval gates
//!
//! A task that needs a human decision registers a pending approval here and
//! waits on it. Decisions arrive through [`ApprovalManager::decide`], which
//! never touches the task itself, so it cannot block behind a running step.
//! An approval that is not decided before its deadline counts as rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::task::TaskId;

/// Why a task is waiting for a human
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalReason {
    /// The review retry budget ran out
    RetriesExhausted {
        /// Failed reviews so far
        retry_count: u32,
    },
    /// A high-risk tool is about to run
    HighRiskTool {
        /// Tool name
        tool_name: String,
    },
}

impl std::fmt::Display for ApprovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted { retry_count } => {
                write!(f, "review failed {retry_count} time(s)")
            }
            Self::HighRiskTool { tool_name } => write!(f, "high-risk tool '{tool_name}'"),
        }
    }
}

/// A human's decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    /// Let the task continue
    Approve,
    /// Fail the task
    Reject,
}

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Approved in time
    Approved,
    /// Rejected
    Rejected,
    /// Deadline passed with no decision
    Expired,
    /// The task was interrupted while waiting
    Cancelled,
}

/// A pending approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Request id
    pub id: Uuid,
    /// Task waiting on it
    pub task_id: TaskId,
    /// Subtask concerned
    pub subtask_id: Option<String>,
    /// Why approval is needed
    pub reason: ApprovalReason,
    /// When it was raised
    pub created_at: DateTime<Utc>,
    /// When it expires
    pub expires_at: DateTime<Utc>,
}

struct Pending {
    request: ApprovalRequest,
    decision: Option<ApprovalDecision>,
    deadline: Instant,
    notify: Arc<Notify>,
}

/// Registry of pending approvals, one per task
pub struct ApprovalManager {
    pending: Mutex<HashMap<TaskId, Pending>>,
    timeout: Duration,
}

impl Default for ApprovalManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl ApprovalManager {
    /// Create a manager whose approvals expire after `timeout`
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, Pending>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a pending approval for `task_id`, replacing any earlier one
    pub fn request(
        &self,
        task_id: TaskId,
        subtask_id: Option<String>,
        reason: ApprovalReason,
    ) -> ApprovalRequest {
        let now = Utc::now();
        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            task_id,
            subtask_id,
            reason,
            created_at: now,
            expires_at: now
                + chrono::Duration::from_std(self.timeout)
                    .unwrap_or_else(|_| chrono::Duration::days(365)),
        };

        info!(task_id = %task_id, reason = %request.reason, "Approval requested");

        self.lock().insert(
            task_id,
            Pending {
                request: request.clone(),
                decision: None,
                deadline: Instant::now() + self.timeout,
                notify: Arc::new(Notify::new()),
            },
        );
        request
    }

    /// Record a decision for the task's pending approval.
    ///
    /// # Errors
    /// [`Error::InvalidState`] when the task has no pending approval.
    pub fn decide(&self, task_id: TaskId, decision: ApprovalDecision) -> Result<ApprovalRequest> {
        let mut pending = self.lock();
        let entry = pending.get_mut(&task_id).ok_or_else(|| {
            Error::InvalidState(format!("task {task_id} has no pending approval"))
        })?;

        entry.decision = Some(decision);
        entry.notify.notify_one();
        info!(task_id = %task_id, decision = ?decision, "Approval decided");
        Ok(entry.request.clone())
    }

    /// Wait for the task's pending approval to be decided, expire, or be
    /// cancelled. The pending entry is removed however the wait ends.
    ///
    /// A task with nothing pending is treated as expired.
    pub async fn wait(&self, task_id: TaskId, cancel: &CancellationToken) -> ApprovalOutcome {
        let (notify, deadline) = match self.lock().get(&task_id) {
            Some(p) => (Arc::clone(&p.notify), p.deadline),
            None => return ApprovalOutcome::Expired,
        };

        let outcome = loop {
            let decision = self.lock().get(&task_id).and_then(|p| p.decision);
            match decision {
                Some(ApprovalDecision::Approve) => break ApprovalOutcome::Approved,
                Some(ApprovalDecision::Reject) => break ApprovalOutcome::Rejected,
                None => {}
            }

            tokio::select! {
                _ = notify.notified() => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(task_id = %task_id, "Approval expired, treating as rejected");
                    break ApprovalOutcome::Expired;
                }
                _ = cancel.cancelled() => break ApprovalOutcome::Cancelled,
            }
        };

        self.lock().remove(&task_id);
        outcome
    }

    /// The task's pending approval, if any
    #[must_use]
    pub fn get(&self, task_id: TaskId) -> Option<ApprovalRequest> {
        self.lock().get(&task_id).map(|p| p.request.clone())
    }

    /// All pending approvals
    #[must_use]
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        self.lock().values().map(|p| p.request.clone()).collect()
    }

    /// Drop the task's pending approval
    pub fn cancel(&self, task_id: TaskId) {
        self.lock().remove(&task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason() -> ApprovalReason {
        ApprovalReason::RetriesExhausted { retry_count: 3 }
    }

    #[tokio::test]
    async fn test_decision_before_wait() {
        let manager = ApprovalManager::default();
        let task = Uuid::new_v4();
        manager.request(task, Some("s1".into()), reason());
        manager.decide(task, ApprovalDecision::Approve).unwrap();

        let outcome = manager.wait(task, &CancellationToken::new()).await;
        assert_eq!(outcome, ApprovalOutcome::Approved);
        assert!(manager.get(task).is_none());
    }

    #[tokio::test]
    async fn test_decision_during_wait() {
        let manager = Arc::new(ApprovalManager::default());
        let task = Uuid::new_v4();
        manager.request(task, None, reason());

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.wait(task, &CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.decide(task, ApprovalDecision::Reject).unwrap();

        assert_eq!(waiter.await.unwrap(), ApprovalOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_expiry_is_fail_safe() {
        let manager = ApprovalManager::new(Duration::from_millis(20));
        let task = Uuid::new_v4();
        manager.request(task, None, reason());

        let outcome = manager.wait(task, &CancellationToken::new()).await;
        assert_eq!(outcome, ApprovalOutcome::Expired);
        assert!(manager.decide(task, ApprovalDecision::Approve).is_err());
    }

    #[tokio::test]
    async fn test_cancel_drops_request() {
        let manager = ApprovalManager::default();
        let task = Uuid::new_v4();
        manager.request(task, None, reason());

        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(manager.wait(task, &token).await, ApprovalOutcome::Cancelled);
        assert!(manager.pending().is_empty());
    }

    #[test]
    fn test_decide_without_request() {
        let manager = ApprovalManager::default();
        let err = manager
            .decide(Uuid::new_v4(), ApprovalDecision::Approve)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
