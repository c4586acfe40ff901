//! Orchestrator main loop
//!
//! `advance` owns the task for the duration of its steps. Each step runs on
//! a working copy that is committed only when the step does not bail out
//! with a rate-limit denial, so a denied call leaves the task untouched.

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::config::AdvanceMode;
use super::core::Orchestrator;
use crate::approval::{ApprovalOutcome, ApprovalReason};
use crate::error::{Error, Result};
use crate::event_bus::TaskEvent;
use crate::task::{SubtaskKind, TaskId, TaskState, TaskStatus};

impl Orchestrator {
    /// Advance a task using the configured [`AdvanceMode`]
    ///
    /// # Errors
    /// See [`Orchestrator::advance_with`].
    pub async fn advance(&self, task_id: TaskId) -> Result<TaskState> {
        self.advance_with(task_id, self.config.advance_mode).await
    }

    /// Advance a task by one transition or until it is terminal.
    ///
    /// Failures inside a step move the task to `failed` and are reported
    /// through the returned state, not as `Err`.
    ///
    /// # Errors
    /// [`Error::TaskNotFound`] for unknown ids; [`Error::RateLimited`] when a
    /// model call is denied admission, in which case the denied step is not
    /// applied.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn advance_with(&self, task_id: TaskId, mode: AdvanceMode) -> Result<TaskState> {
        let slot = self.slot(task_id)?;
        let mut state = slot.state.lock().await;
        let mut steps = 0u32;

        loop {
            if state.status.is_terminal() {
                break;
            }
            if slot.cancel.is_cancelled() {
                self.mark_interrupted(&slot, &mut state);
                break;
            }
            if steps > 0 && mode == AdvanceMode::SingleStep {
                break;
            }

            let from = state.status;
            let mut working = state.clone();
            match self.step(&mut working, &slot.cancel).await {
                Ok(()) => {}
                Err(e @ Error::RateLimited { .. }) => {
                    warn!(identity = %state.identity, error = %e, "Step denied by rate limiter");
                    return Err(e);
                }
                Err(e) => {
                    error!(from = %from, category = %e.category(), error = %e, "Step failed");
                    working.fail(e.category(), e.task_message());
                }
            }

            *state = working;
            steps += 1;
            slot.publish(&state);
            self.announce(from, &state);
        }

        Ok(state.clone())
    }

    async fn step(&self, state: &mut TaskState, cancel: &CancellationToken) -> Result<()> {
        match state.status {
            TaskStatus::Planning => self.plan_step(state).await,
            TaskStatus::Executing => self.execute_step(state).await,
            TaskStatus::Reviewing => self.review_step(state).await,
            TaskStatus::AwaitingApproval => self.approval_step(state, cancel).await,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Interrupted => Ok(()),
        }
    }

    fn announce(&self, from: TaskStatus, state: &TaskState) {
        if from != state.status {
            info!(from = %from, to = %state.status, "Task status changed");
            self.emit(TaskEvent::StatusChanged {
                task_id: state.id,
                from,
                to: state.status,
            });
        }
        if state.status.is_terminal() {
            self.emit(TaskEvent::Finished {
                task_id: state.id,
                status: state.status,
            });
        }
    }

    // ========================================================================
    // Approval gate
    // ========================================================================

    /// Register a pending approval and move to `awaiting_approval`
    pub(crate) fn park_for_approval(&self, state: &mut TaskState, reason: ApprovalReason) {
        let subtask_id = state.current_subtask().map(|s| s.id.clone());
        let request = self.approvals.request(state.id, subtask_id, reason);
        state.set_status(TaskStatus::AwaitingApproval);
        self.emit(TaskEvent::ApprovalRequired {
            task_id: state.id,
            reason: request.reason.to_string(),
        });
    }

    /// `awaiting_approval` → `executing`, `failed` or `interrupted`
    async fn approval_step(&self, state: &mut TaskState, cancel: &CancellationToken) -> Result<()> {
        let request = match self.approvals.get(state.id) {
            Some(request) => request,
            None => {
                // The pending entry was dropped; raise it again.
                let reason = pending_reason(state);
                let subtask_id = state.current_subtask().map(|s| s.id.clone());
                self.approvals.request(state.id, subtask_id, reason)
            }
        };

        match self.approvals.wait(state.id, cancel).await {
            ApprovalOutcome::Approved => {
                if matches!(request.reason, ApprovalReason::HighRiskTool { .. }) {
                    state.approved_subtask = request.subtask_id;
                }
                state.set_status(TaskStatus::Executing);
                Ok(())
            }
            ApprovalOutcome::Rejected => Err(Error::Approval(format!(
                "{} was rejected",
                request.reason
            ))),
            ApprovalOutcome::Expired => Err(Error::Approval(format!(
                "{} expired without a decision",
                request.reason
            ))),
            ApprovalOutcome::Cancelled => {
                state.interrupted = true;
                state.set_status(TaskStatus::Interrupted);
                Ok(())
            }
        }
    }
}

fn pending_reason(state: &TaskState) -> ApprovalReason {
    match state.current_subtask() {
        Some(subtask) if subtask.kind == SubtaskKind::Tool && state.artifact.is_none() => {
            ApprovalReason::HighRiskTool {
                tool_name: subtask.tool_name.clone().unwrap_or_default(),
            }
        }
        _ => ApprovalReason::RetriesExhausted {
            retry_count: state.retry_count,
        },
    }
}
