//! Executing step
//!
//! Produces the artifact for the active subtask: a model generation for
//! `code` subtasks, a tool invocation for `tool` subtasks.

use anvil_tools::CallOptions;
use tracing::{debug, info};

use super::core::Orchestrator;
use super::helpers::strip_code_fence;
use super::model_call::ModelCall;
use super::prompts::CODER_PROMPT;
use crate::approval::ApprovalReason;
use crate::error::{Error, Result};
use crate::event_bus::TaskEvent;
use crate::security::InputSource;
use crate::task::{Subtask, SubtaskKind, TaskState, TaskStatus};
use crate::utils::retry_with_backoff;

impl Orchestrator {
    /// `executing` → `reviewing`, or `awaiting_approval` for a gated tool
    pub(crate) async fn execute_step(&self, state: &mut TaskState) -> Result<()> {
        let subtask = state
            .current_subtask()
            .cloned()
            .ok_or_else(|| Error::Internal("executing with no active subtask".to_string()))?;

        match subtask.kind {
            SubtaskKind::Code => self.generate(state, &subtask).await?,
            SubtaskKind::Tool => {
                if !self.run_tool(state, &subtask).await? {
                    return Ok(());
                }
            }
        }

        state.set_status(TaskStatus::Reviewing);
        Ok(())
    }

    async fn generate(&self, state: &mut TaskState, subtask: &Subtask) -> Result<()> {
        let handle = self
            .router
            .select(subtask.complexity, self.config.coder_temperature);
        let user = coder_prompt(state, subtask);

        let response = self
            .call_model(
                state,
                ModelCall {
                    role: "coder",
                    handle: &handle,
                    system: CODER_PROMPT,
                    user: &user,
                    source: InputSource::Model,
                },
            )
            .await?;

        let artifact = strip_code_fence(&response).to_string();
        debug!(task_id = %state.id, subtask = %subtask.id, bytes = artifact.len(), "Artifact generated");

        state.artifact_path = self.store_artifact(state.id, &subtask.id, &artifact).await;
        state.artifact = Some(artifact);
        state.tool_success = None;
        Ok(())
    }

    /// Run the subtask's tool. Returns `false` when the task was parked for
    /// approval instead.
    async fn run_tool(&self, state: &mut TaskState, subtask: &Subtask) -> Result<bool> {
        let tool_name = subtask
            .tool_name
            .as_deref()
            .ok_or_else(|| Error::Validation(format!("tool subtask '{}' names no tool", subtask.id)))?;
        let definition = self
            .runner
            .registry()
            .get_definition(tool_name)
            .ok_or_else(|| anvil_tools::Error::NotFound(tool_name.to_string()))?;

        let approved = state.approved_subtask.as_deref() == Some(subtask.id.as_str());
        if definition.risk_level.requires_approval()
            && self.config.require_tool_approval
            && !approved
        {
            self.park_for_approval(
                state,
                ApprovalReason::HighRiskTool {
                    tool_name: tool_name.to_string(),
                },
            );
            return Ok(false);
        }

        let args = subtask
            .tool_args
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        let options = CallOptions::new()
            .deadline(self.config.tool_timeout)
            .approved(approved);

        let result = retry_with_backoff(
            &self.config.retry,
            || self.runner.invoke(tool_name, args.clone(), options),
            anvil_tools::Error::is_transient,
        )
        .await
        .map_err(|e| {
            if e.last_error.is_transient() {
                Error::RetriesExhausted {
                    attempts: e.attempts,
                    message: e.last_error.to_string(),
                }
            } else {
                Error::Tool(e.last_error)
            }
        })?;

        info!(
            task_id = %state.id,
            tool = %tool_name,
            success = result.success,
            duration_ms = result.duration_ms,
            "Tool finished"
        );
        self.emit(TaskEvent::ToolCall {
            task_id: state.id,
            tool_name: tool_name.to_string(),
            success: result.success,
            duration_ms: result.duration_ms,
        });

        let artifact = if result.success {
            result.output_text()
        } else {
            result.error.clone().unwrap_or_default()
        };

        state.artifact_path = self.store_artifact(state.id, &subtask.id, &artifact).await;
        state.artifact = Some(artifact);
        state.tool_success = Some(result.success);
        Ok(true)
    }
}

fn coder_prompt(state: &TaskState, subtask: &Subtask) -> String {
    let mut prompt = format!(
        "Task:\n{}\n\nSubtask {}: {}\n",
        state.input, subtask.id, subtask.description
    );

    if !subtask.acceptance_criteria.is_empty() {
        prompt.push_str("\nAcceptance criteria:\n");
        for criterion in &subtask.acceptance_criteria {
            prompt.push_str(&format!("- {criterion}\n"));
        }
    }

    let earlier: Vec<_> = state
        .completed
        .iter()
        .filter(|r| subtask.depends_on.contains(&r.subtask_id))
        .collect();
    if !earlier.is_empty() {
        prompt.push_str("\nResults of earlier subtasks:\n");
        for result in earlier {
            prompt.push_str(&format!("### {}\n{}\n", result.subtask_id, result.artifact));
        }
    }

    if !state.feedback.is_empty() {
        prompt.push_str(&format!(
            "\nFeedback from previous review (newest first):\n{}\n",
            state.feedback
        ));
    }
    prompt
}
