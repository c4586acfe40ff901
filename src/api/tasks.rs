//! Task API endpoints
//!
//! POST   /api/tasks                 - Submit a request
//! GET    /api/tasks                 - List tasks
//! GET    /api/tasks/:id             - Task snapshot
//! DELETE /api/tasks/:id             - Drop a finished task
//! POST   /api/tasks/:id/advance     - Step or run a task
//! POST   /api/tasks/:id/approve     - Approve or reject a pending gate
//! POST   /api/tasks/:id/interrupt   - Request interruption
//! GET    /api/tasks/:id/events      - Status stream (server-sent events)

use std::sync::Arc;

use anvil_core::{
    AdvanceMode, ApprovalDecision, ApprovalRequest, Error, Orchestrator, TaskState, TaskStatus,
};
use axum::{
    extract::Path,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::response::{ApiError, ApiResponse};

/// Submission body
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// The natural-language request
    pub input: String,
    /// Optional structured context
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    /// Rate-limit identity; the configured default when absent
    #[serde(default)]
    pub identity: Option<String>,
    /// Start running in the background right away
    #[serde(default = "default_run")]
    pub run: bool,
}

fn default_run() -> bool {
    true
}

/// Submission result
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
}

/// Task summary for list view
#[derive(Debug, Serialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub status: TaskStatus,
    pub input: String,
    pub subtasks: usize,
    pub iterations: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&TaskState> for TaskSummary {
    fn from(state: &TaskState) -> Self {
        Self {
            id: state.id,
            status: state.status,
            input: state.input.clone(),
            subtasks: state.plan.len(),
            iterations: state.iterations,
            created_at: state.created_at,
            updated_at: state.updated_at,
        }
    }
}

/// Advance body
#[derive(Debug, Default, Deserialize)]
pub struct AdvanceRequest {
    #[serde(default)]
    pub mode: Option<AdvanceMode>,
}

/// Approval body
#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub decision: ApprovalDecision,
}

/// Create task routes
pub fn tasks_routes() -> Router {
    Router::new()
        .route("/api/tasks", post(submit_task).get(list_tasks))
        .route("/api/tasks/:id", get(get_task).delete(remove_task))
        .route("/api/tasks/:id/advance", post(advance_task))
        .route("/api/tasks/:id/approve", post(approve_task))
        .route("/api/tasks/:id/interrupt", post(interrupt_task))
        .route("/api/tasks/:id/events", get(task_events))
}

async fn submit_task(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubmitResponse>>), ApiError> {
    let task_id = match request.identity {
        Some(identity) => orchestrator.submit_as(identity, request.input, request.context)?,
        None => orchestrator.submit(request.input, request.context)?,
    };

    if request.run {
        tokio::spawn(run_in_background(orchestrator.clone(), task_id));
    }

    let status = orchestrator.get_state(task_id)?.status;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(SubmitResponse { task_id, status })),
    ))
}

/// Run a submitted task to completion, waiting out rate-limit denials.
///
/// A denied step leaves the task untouched, so it is simply retried once
/// the identity's bucket has refilled.
async fn run_in_background(orchestrator: Arc<Orchestrator>, task_id: Uuid) {
    loop {
        match orchestrator
            .advance_with(task_id, AdvanceMode::RunToCompletion)
            .await
        {
            Ok(state) => {
                info!(task_id = %task_id, status = %state.status, "Background run ended");
                return;
            }
            Err(Error::RateLimited { retry_after }) => {
                info!(
                    task_id = %task_id,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Background run rate limited, waiting"
                );
                tokio::time::sleep(retry_after).await;
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Background run stopped");
                return;
            }
        }
    }
}

async fn list_tasks(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
) -> Json<ApiResponse<Vec<TaskSummary>>> {
    let tasks = orchestrator
        .list_tasks()
        .iter()
        .map(TaskSummary::from)
        .collect();
    Json(ApiResponse::success(tasks))
}

async fn get_task(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TaskState>>, ApiError> {
    Ok(Json(ApiResponse::success(orchestrator.get_state(id)?)))
}

async fn remove_task(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TaskState>>, ApiError> {
    Ok(Json(ApiResponse::success(orchestrator.remove(id)?)))
}

async fn advance_task(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
    body: Option<Json<AdvanceRequest>>,
) -> Result<Json<ApiResponse<TaskState>>, ApiError> {
    let mode = body
        .and_then(|Json(request)| request.mode)
        .unwrap_or(orchestrator.config().advance_mode);
    let state = orchestrator.advance_with(id, mode).await?;
    Ok(Json(ApiResponse::success(state)))
}

async fn approve_task(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<ApiResponse<ApprovalRequest>>, ApiError> {
    let approval = orchestrator.approve(id, request.decision)?;
    info!(task_id = %id, decision = ?request.decision, "Approval decided over HTTP");
    Ok(Json(ApiResponse::success(approval)))
}

async fn interrupt_task(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TaskState>>, ApiError> {
    Ok(Json(ApiResponse::success(orchestrator.interrupt(id)?)))
}

async fn task_events(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let stream = orchestrator
        .status_stream(id)?
        .map(|state| Event::default().event("status").json_data(&state));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::{OrchestratorConfig, RateLimitConfig, RateLimiter};
    use anvil_llm::{MessageRole, MockProvider, ModelRouter, ResponseCache, RouterConfig};
    use anvil_tools::{ToolRegistry, ToolRunner};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    const PLAN: &str = r#"{"subtasks":[{"id":"main","type":"code","description":"print hello","acceptance_criteria":["prints hello"]}]}"#;
    const PASS: &str = r#"{"passed":true,"feedback":"","criteria":[{"criterion":"prints hello","passed":true}]}"#;

    fn orchestrator() -> Arc<Orchestrator> {
        orchestrator_with(Arc::new(RateLimiter::default()))
    }

    fn orchestrator_with(limiter: Arc<RateLimiter>) -> Arc<Orchestrator> {
        let provider = Arc::new(MockProvider::new().with_handler(|request| {
            let system = request.content_of(MessageRole::System);
            if system.starts_with("You are the planner") {
                Ok(PLAN.to_string())
            } else if system.starts_with("You are the reviewer") {
                Ok(PASS.to_string())
            } else {
                Ok("print('hello')".to_string())
            }
        }));
        let router = Arc::new(ModelRouter::local_only(RouterConfig::default(), provider));
        let runner = ToolRunner::with_defaults(Arc::new(ToolRegistry::new()));
        let config = OrchestratorConfig::new().with_advance_mode(AdvanceMode::SingleStep);
        Arc::new(
            Orchestrator::new(router, runner, config)
                .with_cache(Arc::new(ResponseCache::in_memory(16, Duration::from_secs(60))))
                .with_rate_limiter(limiter),
        )
    }

    fn app(orchestrator: Arc<Orchestrator>) -> Router {
        tasks_routes().layer(Extension(orchestrator))
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_and_get() {
        let orch = orchestrator();
        let resp = app(orch.clone())
            .oneshot(post_json(
                "/api/tasks",
                serde_json::json!({"input": "print hello", "run": false}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["status"], "planning");
        let id = body["data"]["task_id"].as_str().unwrap().to_string();

        let resp = app(orch)
            .oneshot(
                Request::builder()
                    .uri(format!("/api/tasks/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["input"], "print hello");
    }

    #[tokio::test]
    async fn test_background_run_waits_out_rate_limit() {
        // 10 tokens per second once drained
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::per_minute(600)));
        while limiter.acquire("alice").is_ok() {}
        let orch = orchestrator_with(limiter);

        let resp = app(orch.clone())
            .oneshot(post_json(
                "/api/tasks",
                serde_json::json!({"input": "print hello", "identity": "alice"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        let id: Uuid = body["data"]["task_id"].as_str().unwrap().parse().unwrap();

        let mut snapshots = orch.subscribe(id).unwrap();
        let settled = tokio::time::timeout(
            Duration::from_secs(10),
            snapshots.wait_for(|state| state.status.is_terminal()),
        )
        .await
        .expect("background run never finished")
        .unwrap()
        .clone();

        assert_eq!(settled.status, TaskStatus::Completed);
        assert_eq!(settled.final_output.as_deref(), Some("print('hello')"));
    }

    #[tokio::test]
    async fn test_blank_submission_is_bad_request() {
        let resp = app(orchestrator())
            .oneshot(post_json(
                "/api/tasks",
                serde_json::json!({"input": "   ", "run": false}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION");
    }

    #[tokio::test]
    async fn test_advance_to_completion() {
        let orch = orchestrator();
        let id = orch.submit("print hello", None).unwrap();

        let resp = app(orch.clone())
            .oneshot(post_json(
                &format!("/api/tasks/{id}/advance"),
                serde_json::json!({"mode": "run_to_completion"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["status"], "completed");
        assert_eq!(body["data"]["final_output"], "print('hello')");
    }

    #[tokio::test]
    async fn test_advance_without_body_uses_configured_mode() {
        let orch = orchestrator();
        let id = orch.submit("print hello", None).unwrap();

        let resp = app(orch)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/tasks/{id}/advance"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["data"]["status"], "executing");
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let resp = app(orchestrator())
            .oneshot(
                Request::builder()
                    .uri(format!("/api/tasks/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_approve_without_pending_gate_conflicts() {
        let orch = orchestrator();
        let id = orch.submit("print hello", None).unwrap();

        let resp = app(orch)
            .oneshot(post_json(
                &format!("/api/tasks/{id}/approve"),
                serde_json::json!({"decision": "approve"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_interrupt_then_remove() {
        let orch = orchestrator();
        let id = orch.submit("print hello", None).unwrap();

        // Live tasks cannot be removed
        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/tasks/{id}"))
                .body(Body::empty())
                .unwrap()
        };
        let resp = app(orch.clone()).oneshot(delete()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = app(orch.clone())
            .oneshot(post_json(
                &format!("/api/tasks/{id}/interrupt"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["data"]["status"], "interrupted");

        let resp = app(orch.clone()).oneshot(delete()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(orch.list_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_list_tasks() {
        let orch = orchestrator();
        orch.submit("first", None).unwrap();
        orch.submit("second", None).unwrap();

        let resp = app(orch)
            .oneshot(Request::builder().uri("/api/tasks").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(resp).await;
        let tasks = body["data"].as_array().unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0]["input"], "first");
    }
}
