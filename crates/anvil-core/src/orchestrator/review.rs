//! Reviewing step
//!
//! Code artifacts are judged by the reviewer model; tool output is checked
//! deterministically. A subtask passes only when every acceptance criterion
//! does.

use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use super::core::Orchestrator;
use super::helpers::{extract_json, prepend_feedback};
use super::model_call::ModelCall;
use super::prompts::REVIEWER_PROMPT;
use crate::approval::ApprovalReason;
use crate::error::{Error, Result};
use crate::event_bus::TaskEvent;
use crate::security::InputSource;
use crate::task::{
    CriterionResult, ReviewFeedback, Subtask, SubtaskKind, SubtaskResult, TaskState, TaskStatus,
};

impl Orchestrator {
    /// `reviewing` → `executing` (next subtask or retry), `completed`,
    /// `awaiting_approval` or `failed`
    pub(crate) async fn review_step(&self, state: &mut TaskState) -> Result<()> {
        let subtask = state
            .current_subtask()
            .cloned()
            .ok_or_else(|| Error::Internal("reviewing with no active subtask".to_string()))?;
        let artifact = state.artifact.clone().unwrap_or_default();

        let review = match subtask.kind {
            SubtaskKind::Code => self.review_with_model(state, &subtask, &artifact).await?,
            SubtaskKind::Tool => {
                check_tool_output(&subtask, &artifact, state.tool_success.unwrap_or(false))
            }
        };

        self.apply_review(state, &subtask, review)
    }

    async fn review_with_model(
        &self,
        state: &mut TaskState,
        subtask: &Subtask,
        artifact: &str,
    ) -> Result<ReviewFeedback> {
        let handle = self
            .router
            .select(subtask.complexity, self.config.reviewer_temperature);

        let mut user = format!("Subtask: {}\n\nAcceptance criteria:\n", subtask.description);
        for criterion in &subtask.acceptance_criteria {
            user.push_str(&format!("- {criterion}\n"));
        }
        user.push_str(&format!("\nArtifact:\n{artifact}\n"));

        let response = self
            .call_model(
                state,
                ModelCall {
                    role: "reviewer",
                    handle: &handle,
                    system: REVIEWER_PROMPT,
                    user: &user,
                    source: InputSource::Model,
                },
            )
            .await?;

        Ok(parse_review(&response))
    }

    fn apply_review(
        &self,
        state: &mut TaskState,
        subtask: &Subtask,
        review: ReviewFeedback,
    ) -> Result<()> {
        let passed = review.passed;
        let feedback = review.feedback.clone();
        state.review = Some(review);

        if passed {
            self.emit(TaskEvent::Reviewed {
                task_id: state.id,
                subtask_id: subtask.id.clone(),
                passed: true,
                retry_count: state.retry_count,
            });
            info!(task_id = %state.id, subtask = %subtask.id, attempts = state.retry_count + 1, "Subtask accepted");

            state.accept_current();
            if state.current_index >= state.plan.len() {
                state.final_output = Some(assemble_output(&state.completed));
                state.set_status(TaskStatus::Completed);
            } else {
                state.set_status(TaskStatus::Executing);
            }
            return Ok(());
        }

        state.retry_count += 1;
        state.iterations += 1;
        state.feedback = prepend_feedback(&state.feedback, &feedback, self.config.feedback_cap);
        self.emit(TaskEvent::Reviewed {
            task_id: state.id,
            subtask_id: subtask.id.clone(),
            passed: false,
            retry_count: state.retry_count,
        });

        if state.retry_count <= self.config.max_retries {
            info!(
                task_id = %state.id,
                subtask = %subtask.id,
                retry = state.retry_count,
                max_retries = self.config.max_retries,
                "Review failed, retrying with feedback"
            );
            state.set_status(TaskStatus::Executing);
            return Ok(());
        }

        warn!(task_id = %state.id, subtask = %subtask.id, retries = state.retry_count, "Review budget exhausted");

        if self.config.escalate_to_approval {
            let retry_count = state.retry_count;
            self.park_for_approval(state, ApprovalReason::RetriesExhausted { retry_count });
            return Ok(());
        }

        Err(Error::Policy(format!(
            "subtask '{}' failed review {} time(s): {feedback}",
            subtask.id, state.retry_count
        )))
    }
}

#[derive(Deserialize)]
struct ReviewerVerdict {
    #[serde(default)]
    passed: bool,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    criteria: Vec<CriterionResult>,
}

/// Interpret a reviewer response. Anything unparseable is a failed review.
pub(crate) fn parse_review(response: &str) -> ReviewFeedback {
    let Some(verdict) = extract_json(response)
        .and_then(|value| serde_json::from_value::<ReviewerVerdict>(value).ok())
    else {
        warn!("Reviewer response was not a valid verdict");
        return ReviewFeedback {
            passed: false,
            feedback: "The review could not be read; make the artifact satisfy every criterion."
                .to_string(),
            criteria: Vec::new(),
        };
    };

    let passed = verdict.passed && verdict.criteria.iter().all(|c| c.passed);
    let feedback = if verdict.feedback.trim().is_empty() && !passed {
        failing_criteria_summary(&verdict.criteria)
    } else {
        verdict.feedback
    };

    ReviewFeedback {
        passed,
        feedback,
        criteria: verdict.criteria,
    }
}

/// Check tool output against its criteria.
///
/// Supported forms: `contains: <text>`, `equals: <text>` and
/// `matches: <regex>`. Other criteria cannot be checked mechanically and
/// pass whenever the tool succeeded.
pub(crate) fn check_tool_output(subtask: &Subtask, output: &str, success: bool) -> ReviewFeedback {
    if !success {
        return ReviewFeedback {
            passed: false,
            feedback: format!(
                "tool '{}' failed: {output}",
                subtask.tool_name.as_deref().unwrap_or("?")
            ),
            criteria: Vec::new(),
        };
    }

    let criteria: Vec<CriterionResult> = subtask
        .acceptance_criteria
        .iter()
        .map(|criterion| check_criterion(criterion, output))
        .collect();
    let passed = criteria.iter().all(|c| c.passed);

    ReviewFeedback {
        passed,
        feedback: if passed {
            String::new()
        } else {
            failing_criteria_summary(&criteria)
        },
        criteria,
    }
}

fn check_criterion(criterion: &str, output: &str) -> CriterionResult {
    let (passed, note) = if let Some(needle) = criterion.strip_prefix("contains:") {
        let needle = needle.trim();
        (output.contains(needle), format!("output must contain '{needle}'"))
    } else if let Some(expected) = criterion.strip_prefix("equals:") {
        let expected = expected.trim();
        (output.trim() == expected, format!("output must equal '{expected}'"))
    } else if let Some(pattern) = criterion.strip_prefix("matches:") {
        match Regex::new(pattern.trim()) {
            Ok(re) => (re.is_match(output), format!("output must match /{}/", pattern.trim())),
            Err(e) => (false, format!("invalid pattern: {e}")),
        }
    } else {
        (true, "accepted on tool success".to_string())
    };

    CriterionResult {
        criterion: criterion.to_string(),
        passed,
        note,
    }
}

fn failing_criteria_summary(criteria: &[CriterionResult]) -> String {
    let failing: Vec<String> = criteria
        .iter()
        .filter(|c| !c.passed)
        .map(|c| {
            if c.note.is_empty() {
                format!("not met: {}", c.criterion)
            } else {
                format!("not met: {} ({})", c.criterion, c.note)
            }
        })
        .collect();

    if failing.is_empty() {
        "The artifact was rejected without details.".to_string()
    } else {
        failing.join("\n")
    }
}

fn assemble_output(completed: &[SubtaskResult]) -> String {
    if let [only] = completed {
        return only.artifact.clone();
    }
    completed
        .iter()
        .map(|r| format!("## {}\n{}", r.subtask_id, r.artifact))
        .collect::<Vec<_>>()
        .join("\n\n")
}
