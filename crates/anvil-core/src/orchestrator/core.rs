//! Orchestrator core structure
//!
//! Contains the `Orchestrator` struct, its builder methods and the
//! task-arena operations that do not step a task.

use anvil_llm::{global_cache, ModelRouter, ResponseCache};
use anvil_tools::ToolRunner;
use dashmap::DashMap;
use futures::stream::{self, Stream};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::config::OrchestratorConfig;
use crate::approval::{ApprovalDecision, ApprovalManager, ApprovalRequest};
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, TaskEvent};
use crate::security::{PatternSecurityFilter, SecurityFilter};
use crate::task::{TaskId, TaskState, TaskStatus};
use crate::utils::RateLimiter;

/// One task in the arena.
///
/// `state` is held for the whole of a step, so at most one step runs per
/// task. Readers use `snapshot`, which is published after every step.
pub(crate) struct TaskSlot {
    pub(crate) state: Mutex<TaskState>,
    pub(crate) snapshot: watch::Sender<TaskState>,
    pub(crate) cancel: CancellationToken,
}

impl TaskSlot {
    fn new(state: TaskState) -> Self {
        let (snapshot, _) = watch::channel(state.clone());
        Self {
            state: Mutex::new(state),
            snapshot,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn publish(&self, state: &TaskState) {
        self.snapshot.send_replace(state.clone());
    }

    pub(crate) fn current(&self) -> TaskState {
        self.snapshot.borrow().clone()
    }
}

/// Drives tasks through planning, generation, review and approval
pub struct Orchestrator {
    pub(crate) router: Arc<ModelRouter>,
    pub(crate) runner: ToolRunner,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) security: Arc<dyn SecurityFilter>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) approvals: Arc<ApprovalManager>,
    pub(crate) config: OrchestratorConfig,
    pub(crate) tasks: DashMap<TaskId, Arc<TaskSlot>>,
}

impl Orchestrator {
    /// Create a new orchestrator.
    ///
    /// Uses the process-wide response cache, a default rate limiter and the
    /// pattern security filter until replaced with the `with_*` methods.
    #[must_use]
    pub fn new(router: Arc<ModelRouter>, runner: ToolRunner, config: OrchestratorConfig) -> Self {
        let approvals = Arc::new(ApprovalManager::new(config.approval_timeout));
        Self {
            router,
            runner,
            cache: global_cache(),
            limiter: Arc::new(RateLimiter::default()),
            security: Arc::new(PatternSecurityFilter::default()),
            event_bus: Arc::new(EventBus::default()),
            approvals,
            config,
            tasks: DashMap::new(),
        }
    }

    /// Use a specific response cache
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Use a specific rate limiter
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Use a specific security filter
    #[must_use]
    pub fn with_security_filter(mut self, filter: Arc<dyn SecurityFilter>) -> Self {
        self.security = filter;
        self
    }

    /// Publish events on `bus`
    #[must_use]
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    /// Use a specific approval manager
    #[must_use]
    pub fn with_approval_manager(mut self, manager: Arc<ApprovalManager>) -> Self {
        self.approvals = manager;
        self
    }

    /// Orchestrator configuration
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The model router
    #[must_use]
    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// The response cache
    #[must_use]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// The rate limiter
    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The approval manager
    #[must_use]
    pub fn approvals(&self) -> &Arc<ApprovalManager> {
        &self.approvals
    }

    /// Subscribe to lifecycle events of every task
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_bus.subscribe()
    }

    pub(crate) fn slot(&self, task_id: TaskId) -> Result<Arc<TaskSlot>> {
        self.tasks
            .get(&task_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::TaskNotFound(task_id))
    }

    // ========================================================================
    // Task arena
    // ========================================================================

    /// Submit a request under the default identity
    ///
    /// # Errors
    /// [`Error::Validation`] when `input` is blank.
    pub fn submit(
        &self,
        input: impl Into<String>,
        context: Option<serde_json::Value>,
    ) -> Result<TaskId> {
        let identity = self.config.default_identity.clone();
        self.submit_as(identity, input, context)
    }

    /// Submit a request charged to `identity` by the rate limiter
    ///
    /// # Errors
    /// [`Error::Validation`] when `input` is blank.
    #[instrument(skip(self, input, context), fields(identity = %identity.as_ref()))]
    pub fn submit_as(
        &self,
        identity: impl AsRef<str>,
        input: impl Into<String>,
        context: Option<serde_json::Value>,
    ) -> Result<TaskId> {
        let input = input.into();
        if input.trim().is_empty() {
            return Err(Error::Validation("request is empty".to_string()));
        }

        let state = TaskState::new(input, context, identity.as_ref());
        let task_id = state.id;
        self.tasks.insert(task_id, Arc::new(TaskSlot::new(state)));

        info!(task_id = %task_id, "Task submitted");
        self.emit(TaskEvent::Submitted {
            task_id,
            identity: identity.as_ref().to_string(),
        });
        Ok(task_id)
    }

    /// Latest published snapshot. Never waits on a running step.
    ///
    /// # Errors
    /// [`Error::TaskNotFound`] for unknown ids.
    pub fn get_state(&self, task_id: TaskId) -> Result<TaskState> {
        Ok(self.slot(task_id)?.current())
    }

    /// Snapshot receiver updated after every step
    ///
    /// # Errors
    /// [`Error::TaskNotFound`] for unknown ids.
    pub fn subscribe(&self, task_id: TaskId) -> Result<watch::Receiver<TaskState>> {
        Ok(self.slot(task_id)?.snapshot.subscribe())
    }

    /// Stream of snapshots, starting with the current one and ending after
    /// the task reaches a terminal status
    ///
    /// # Errors
    /// [`Error::TaskNotFound`] for unknown ids.
    pub fn status_stream(&self, task_id: TaskId) -> Result<impl Stream<Item = TaskState>> {
        let rx = self.subscribe(task_id)?;
        Ok(stream::unfold(
            (rx, true, false),
            |(mut rx, first, done)| async move {
                if done {
                    return None;
                }
                if !first && rx.changed().await.is_err() {
                    return None;
                }
                let state = rx.borrow_and_update().clone();
                let terminal = state.status.is_terminal();
                Some((state, (rx, false, terminal)))
            },
        ))
    }

    /// Snapshots of every task, oldest first
    #[must_use]
    pub fn list_tasks(&self) -> Vec<TaskState> {
        let mut tasks: Vec<TaskState> = self
            .tasks
            .iter()
            .map(|entry| entry.value().current())
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Drop a terminal task from the arena
    ///
    /// # Errors
    /// [`Error::TaskNotFound`] for unknown ids, [`Error::InvalidState`] when
    /// the task is still live.
    pub fn remove(&self, task_id: TaskId) -> Result<TaskState> {
        let state = self.get_state(task_id)?;
        if !state.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "task {task_id} is {}, only terminal tasks can be removed",
                state.status
            )));
        }
        self.tasks.remove(&task_id);
        self.approvals.cancel(task_id);
        Ok(state)
    }

    /// Request cooperative interruption.
    ///
    /// An idle task is marked `interrupted` immediately; a task in the middle
    /// of a step is marked when that step ends. Terminal tasks are unchanged.
    ///
    /// # Errors
    /// [`Error::TaskNotFound`] for unknown ids.
    pub fn interrupt(&self, task_id: TaskId) -> Result<TaskState> {
        let slot = self.slot(task_id)?;
        if slot.current().status.is_terminal() {
            return Ok(slot.current());
        }

        slot.cancel.cancel();
        info!(task_id = %task_id, "Interrupt requested");

        if let Ok(mut state) = slot.state.try_lock() {
            if !state.status.is_terminal() {
                self.mark_interrupted(&slot, &mut state);
            }
            return Ok(state.clone());
        }
        Ok(slot.current())
    }

    /// Record a human decision for a task waiting on approval
    ///
    /// # Errors
    /// [`Error::TaskNotFound`] for unknown ids, [`Error::InvalidState`] when
    /// the task is not awaiting approval.
    pub fn approve(&self, task_id: TaskId, decision: ApprovalDecision) -> Result<ApprovalRequest> {
        let state = self.get_state(task_id)?;
        if state.status != TaskStatus::AwaitingApproval {
            return Err(Error::InvalidState(format!(
                "task {task_id} is {}, not awaiting approval",
                state.status
            )));
        }
        self.approvals.decide(task_id, decision)
    }
}
