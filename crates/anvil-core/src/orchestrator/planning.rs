//! Planning step
//!
//! Asks the planner for an ordered plan and validates it before the task
//! moves to `executing`.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info};

use super::core::Orchestrator;
use super::helpers::extract_json;
use super::model_call::ModelCall;
use super::prompts::PLANNER_PROMPT;
use crate::error::{Error, Result};
use crate::security::InputSource;
use crate::task::{Subtask, SubtaskKind, TaskState, TaskStatus};

lazy_static! {
    static ref SUBTASK_ID: Regex =
        Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("SUBTASK_ID is a compile-time constant");
}

impl Orchestrator {
    /// `planning` → `executing`
    pub(crate) async fn plan_step(&self, state: &mut TaskState) -> Result<()> {
        let handle = self
            .router
            .select(self.config.planner_complexity, self.config.planner_temperature);
        let system = self.planner_system_prompt();
        let user = match &state.context {
            Some(context) => format!("Request:\n{}\n\nContext:\n{context}", state.input),
            None => format!("Request:\n{}", state.input),
        };

        let response = self
            .call_model(
                state,
                ModelCall {
                    role: "planner",
                    handle: &handle,
                    system: &system,
                    user: &user,
                    source: InputSource::User,
                },
            )
            .await?;

        let plan = parse_plan(&response)?;
        validate_plan(&plan, self.config.max_subtasks)?;

        info!(task_id = %state.id, subtasks = plan.len(), "Plan accepted");
        for subtask in &plan {
            debug!(id = %subtask.id, kind = ?subtask.kind, complexity = %subtask.complexity, "Planned subtask");
        }

        state.plan = plan;
        state.current_index = 0;
        state.set_status(TaskStatus::Executing);
        Ok(())
    }

    fn planner_system_prompt(&self) -> String {
        let tools = self.runner.registry().list_enabled();
        if tools.is_empty() {
            return format!("{PLANNER_PROMPT}\n\nNo tools are available; use code subtasks only.");
        }

        let mut prompt = format!("{PLANNER_PROMPT}\n\nAvailable tools:");
        for tool in tools {
            prompt.push_str(&format!(
                "\n- {} ({} risk): {}\n  parameters: {}",
                tool.name,
                tool.risk_level.as_str(),
                tool.description,
                tool.parameters
            ));
        }
        prompt
    }
}

/// Parse a planner response: either `{"subtasks": [...]}` or a bare array
pub(crate) fn parse_plan(response: &str) -> Result<Vec<Subtask>> {
    let value = extract_json(response)
        .ok_or_else(|| Error::Validation("planner response is not JSON".to_string()))?;

    let subtasks = match value {
        serde_json::Value::Object(mut map) => map
            .remove("subtasks")
            .ok_or_else(|| Error::Validation("plan has no 'subtasks' field".to_string()))?,
        array @ serde_json::Value::Array(_) => array,
        _ => return Err(Error::Validation("plan must be an object or array".to_string())),
    };

    serde_json::from_value(subtasks).map_err(|e| Error::Validation(format!("malformed plan: {e}")))
}

/// Check plan structure.
///
/// # Errors
/// [`Error::Validation`] for an empty or oversized plan, a bad or duplicate
/// id, a dependency that is not an earlier subtask, or a tool subtask
/// without a tool name or with non-object arguments.
pub(crate) fn validate_plan(plan: &[Subtask], max_subtasks: usize) -> Result<()> {
    if plan.is_empty() {
        return Err(Error::Validation("plan has no subtasks".to_string()));
    }
    if plan.len() > max_subtasks {
        return Err(Error::Validation(format!(
            "plan has {} subtasks, at most {max_subtasks} allowed",
            plan.len()
        )));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for subtask in plan {
        if !SUBTASK_ID.is_match(&subtask.id) {
            return Err(Error::Validation(format!(
                "invalid subtask id '{}'",
                subtask.id
            )));
        }
        for dep in &subtask.depends_on {
            if !seen.contains(dep.as_str()) {
                return Err(Error::Validation(format!(
                    "subtask '{}' depends on '{dep}', which is not an earlier subtask",
                    subtask.id
                )));
            }
        }
        if subtask.kind == SubtaskKind::Tool {
            match subtask.tool_name.as_deref() {
                Some(name) if !name.trim().is_empty() => {}
                _ => {
                    return Err(Error::Validation(format!(
                        "tool subtask '{}' names no tool",
                        subtask.id
                    )))
                }
            }
            if let Some(args) = &subtask.tool_args {
                if !args.is_object() {
                    return Err(Error::Validation(format!(
                        "tool subtask '{}' arguments must be an object",
                        subtask.id
                    )));
                }
            }
        }
        if !seen.insert(subtask.id.as_str()) {
            return Err(Error::Validation(format!(
                "duplicate subtask id '{}'",
                subtask.id
            )));
        }
    }
    Ok(())
}
