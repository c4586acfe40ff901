//! Orchestrator helper methods
//!
//! Event emission, interruption bookkeeping, artifact storage and the text
//! helpers shared by the steps.

use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::core::{Orchestrator, TaskSlot};
use crate::event_bus::TaskEvent;
use crate::task::{TaskId, TaskState, TaskStatus};

const FEEDBACK_SEPARATOR: &str = "\n---\n";

impl Orchestrator {
    /// Publish an event to the event bus.
    pub(crate) fn emit(&self, event: TaskEvent) {
        self.event_bus.publish(event);
    }

    /// Move to `interrupted`, leaving the rest of the state as it was
    pub(crate) fn mark_interrupted(&self, slot: &TaskSlot, state: &mut TaskState) {
        let from = state.status;
        state.interrupted = true;
        state.set_status(TaskStatus::Interrupted);
        slot.publish(state);
        self.approvals.cancel(state.id);

        info!(task_id = %state.id, from = %from, "Task interrupted");
        self.emit(TaskEvent::StatusChanged {
            task_id: state.id,
            from,
            to: TaskStatus::Interrupted,
        });
        self.emit(TaskEvent::Finished {
            task_id: state.id,
            status: TaskStatus::Interrupted,
        });
    }

    /// Write an artifact to `<artifact_dir>/<task_id>/<subtask_id>.txt`.
    ///
    /// Best-effort: failures are logged and yield `None`.
    pub(crate) async fn store_artifact(
        &self,
        task_id: TaskId,
        subtask_id: &str,
        artifact: &str,
    ) -> Option<String> {
        let dir = self.config.artifact_dir.as_ref()?.join(task_id.to_string());
        let path: PathBuf = dir.join(format!("{subtask_id}.txt"));

        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(path = %dir.display(), error = %e, "Failed to create artifact directory");
            return None;
        }
        match tokio::fs::write(&path, artifact).await {
            Ok(()) => {
                debug!(path = %path.display(), "Artifact stored");
                Some(path.display().to_string())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to store artifact");
                None
            }
        }
    }
}

/// Put `latest` in front of `existing`, keeping at most `cap` characters
pub(crate) fn prepend_feedback(existing: &str, latest: &str, cap: usize) -> String {
    let combined = if existing.is_empty() {
        latest.to_string()
    } else {
        format!("{latest}{FEEDBACK_SEPARATOR}{existing}")
    };

    match combined.char_indices().nth(cap) {
        Some((idx, _)) => combined[..idx].to_string(),
        None => combined,
    }
}

/// Strip a single surrounding markdown code fence, if present
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening line
    match body.split_once('\n') {
        Some((_, code)) => code.trim_end_matches('\n'),
        None => body,
    }
}

/// Locate the JSON value in a model response: the whole response when it
/// parses, otherwise the outermost `{...}` or `[...]` span.
pub(crate) fn extract_json(text: &str) -> Option<serde_json::Value> {
    let body = strip_code_fence(text);
    if let Ok(value) = serde_json::from_str(body) {
        return Some(value);
    }

    let start = body.find(['{', '['])?;
    let close = if body[start..].starts_with('{') { '}' } else { ']' };
    let end = body.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&body[start..=end]).ok()
}
