//! Model call pipeline
//!
//! Every planner, coder and reviewer call goes through [`Orchestrator::call_model`]:
//! injection screening (user-sourced input only), prompt fencing, cache
//! lookup, dispatch with deadline and transport retries (each dispatch
//! admitted by the rate limiter), usage accounting, output redaction and
//! cache fill.
//!
//! Once a subtask has failed review the cache is write-only for the rest of
//! its attempts. A capped feedback history can make a retry prompt identical
//! to the previous one, and a replayed answer would not be a new attempt.

use anvil_llm::{Message, ModelHandle};
use tracing::{debug, instrument, warn};

use super::core::Orchestrator;
use crate::error::{Error, Result};
use crate::event_bus::TaskEvent;
use crate::security::InputSource;
use crate::task::TaskState;
use crate::utils::retry_with_backoff;

/// One model call
pub(crate) struct ModelCall<'a> {
    /// Role label for logs and events
    pub role: &'static str,
    pub handle: &'a ModelHandle,
    pub system: &'a str,
    pub user: &'a str,
    /// Origin of `user`; user input is screened before dispatch
    pub source: InputSource,
}

impl Orchestrator {
    /// Run `call` and return the sanitized response text.
    ///
    /// Usage is accumulated on `state`. Every dispatch, transport retries
    /// included, takes a rate-limit token; a denial returns
    /// [`Error::RateLimited`] without dispatching.
    #[instrument(skip(self, state, call), fields(task_id = %state.id, role = call.role, model = %call.handle.model_name))]
    pub(crate) async fn call_model(&self, state: &mut TaskState, call: ModelCall<'_>) -> Result<String> {
        if call.source == InputSource::User {
            let verdict = self.security.check_injection(call.user, call.source);
            if verdict.is_malicious {
                warn!(
                    target: "security",
                    task_id = %state.id,
                    confidence = verdict.confidence,
                    "Rejected user input before dispatch"
                );
                return Err(Error::Security(format!(
                    "prompt injection detected (confidence {:.2})",
                    verdict.confidence
                )));
            }
        }

        let prompt = self
            .security
            .protect_prompt(call.system, call.user, call.source);
        let model = call.handle.model_name.as_str();

        let cached = if state.retry_count == 0 {
            self.cache.get(&prompt.system, &prompt.user, Some(model))
        } else {
            None
        };
        if let Some(text) = cached {
            debug!("Served from response cache");
            state.usage.cache_hits += 1;
            self.emit(TaskEvent::ModelCall {
                task_id: state.id,
                role: call.role.to_string(),
                model: model.to_string(),
                cached: true,
            });
            return Ok(text);
        }

        let messages = vec![
            Message::system(prompt.system.clone()),
            Message::user(prompt.user.clone()),
        ];
        let messages = &messages;
        let deadline = self.config.call_timeout;
        let limiter = &self.limiter;
        let identity = state.identity.as_str();
        let handle = call.handle;

        let response = retry_with_backoff(
            &self.config.retry,
            || async move {
                limiter
                    .acquire(identity)
                    .map_err(|retry_after| Error::RateLimited { retry_after })?;
                handle
                    .invoke(messages.clone(), deadline)
                    .await
                    .map_err(Error::Llm)
            },
            |e: &Error| matches!(e, Error::Llm(inner) if inner.is_transient()),
        )
        .await
        .map_err(|e| match e.last_error {
            Error::Llm(inner) if inner.is_transient() => Error::RetriesExhausted {
                attempts: e.attempts,
                message: inner.to_string(),
            },
            other => other,
        })?;

        state.usage.model_calls += 1;
        if let Some(usage) = &response.usage {
            state.usage.prompt_tokens += u64::from(usage.prompt_tokens);
            state.usage.completion_tokens += u64::from(usage.completion_tokens);
            state.usage.estimated_cost += call.handle.estimate_cost(usage);
        }

        let text = self.security.sanitize_output(&response.content);
        self.cache.put(&prompt.system, &prompt.user, text.as_str(), Some(model));

        self.emit(TaskEvent::ModelCall {
            task_id: state.id,
            role: call.role.to_string(),
            model: model.to_string(),
            cached: false,
        });
        Ok(text)
    }
}
