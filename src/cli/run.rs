//! `anvil run` - drive one request to completion on the console
//!
//! Progress events are printed as they arrive. Approval gates prompt on
//! stdin unless `--yes` is given; Ctrl-C interrupts the task.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use anvil_core::{
    format_error_for_cli, AdvanceMode, ApprovalDecision, Error, Orchestrator, TaskEvent, TaskId,
    TaskState, TaskStatus,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::server::{build_orchestrator, load_config};

/// Run a request
pub async fn run(request: String, context: Option<String>, auto_approve: bool) -> Result<()> {
    let context = context
        .map(|raw| serde_json::from_str(&raw).context("--context must be valid JSON"))
        .transpose()?;

    let config = load_config()?;
    let orchestrator = build_orchestrator(&config)?;

    let task_id = orchestrator
        .submit(request, context)
        .map_err(|e| anyhow::anyhow!(format_error_for_cli(&e)))?;
    println!("Task {task_id} submitted");

    let watcher = tokio::spawn(watch_events(orchestrator.clone(), task_id, auto_approve));
    let interrupter = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\nInterrupting...");
                let _ = orchestrator.interrupt(task_id);
            }
        })
    };

    let result = drive(&orchestrator, task_id).await;
    interrupter.abort();
    watcher.abort();

    let cache = orchestrator.cache().clone();
    if let Err(e) = tokio::task::spawn_blocking(move || cache.flush()).await {
        warn!(error = %e, "Cache flush task failed");
    }

    let state = result.map_err(|e| anyhow::anyhow!(format_error_for_cli(&e)))?;
    report(&state)
}

/// Advance until terminal, waiting out rate-limit denials
async fn drive(orchestrator: &Orchestrator, task_id: TaskId) -> anvil_core::Result<TaskState> {
    loop {
        match orchestrator
            .advance_with(task_id, AdvanceMode::RunToCompletion)
            .await
        {
            Ok(state) => return Ok(state),
            Err(Error::RateLimited { retry_after }) => {
                println!("Rate limited, retrying in {:.1}s", retry_after.as_secs_f64());
                tokio::time::sleep(retry_after).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn watch_events(orchestrator: Arc<Orchestrator>, task_id: TaskId, auto_approve: bool) {
    let mut events = orchestrator.events();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Event printer lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if event.task_id() != task_id {
            continue;
        }

        match &event {
            TaskEvent::StatusChanged { to, .. } => println!("  → {to}"),
            TaskEvent::ModelCall {
                role,
                model,
                cached,
                ..
            } => {
                let source = if *cached { " (cached)" } else { "" };
                println!("    {role}: {model}{source}");
            }
            TaskEvent::ToolCall {
                tool_name,
                success,
                duration_ms,
                ..
            } => println!(
                "    tool {tool_name}: {} in {duration_ms}ms",
                if *success { "ok" } else { "failed" }
            ),
            TaskEvent::Reviewed {
                subtask_id,
                passed,
                retry_count,
                ..
            } => {
                if *passed {
                    println!("    review of '{subtask_id}' passed");
                } else {
                    println!("    review of '{subtask_id}' failed (retry {retry_count})");
                }
            }
            TaskEvent::ApprovalRequired { reason, .. } => {
                println!("Approval required: {reason}");
                let decision = if auto_approve {
                    println!("  auto-approved (--yes)");
                    ApprovalDecision::Approve
                } else {
                    prompt_decision().await
                };
                if let Err(e) = orchestrator.approve(task_id, decision) {
                    warn!(error = %e, "Failed to record approval");
                }
            }
            TaskEvent::Finished { .. } => break,
            TaskEvent::Submitted { .. } => {}
        }
    }
}

async fn prompt_decision() -> ApprovalDecision {
    let answer = tokio::task::spawn_blocking(|| {
        print!("Approve? [y/N] ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await;

    match answer {
        Ok(Ok(line)) if matches!(line.trim(), "y" | "Y" | "yes") => ApprovalDecision::Approve,
        _ => ApprovalDecision::Reject,
    }
}

fn report(state: &TaskState) -> Result<()> {
    println!();
    println!(
        "Status: {} ({} subtask(s), {} model call(s), {} cache hit(s), ${:.4})",
        state.status,
        state.plan.len(),
        state.usage.model_calls,
        state.usage.cache_hits,
        state.usage.estimated_cost
    );

    match state.status {
        TaskStatus::Completed => {
            println!();
            println!("{}", state.final_output.as_deref().unwrap_or_default());
            Ok(())
        }
        TaskStatus::Interrupted => bail!("task interrupted"),
        _ => bail!(
            "task {}: {}",
            state.status,
            state.error.as_deref().unwrap_or("no error recorded")
        ),
    }
}
