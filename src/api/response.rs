//! Response envelope and error mapping

use anvil_core::{Error, ErrorCategory};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

/// Standard JSON envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn error(message: impl Into<String>, code: &'static str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            code: Some(code),
        }
    }
}

/// Whole seconds for `Retry-After`, rounded up and never zero
pub(crate) fn retry_after_secs(wait: Duration) -> u64 {
    let whole = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    whole.max(1)
}

/// Orchestrator error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            Error::TaskNotFound(_) => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
            Error::InvalidState(_) => (StatusCode::CONFLICT, "INVALID_STATE"),
            Error::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            e => match e.category() {
                ErrorCategory::Validation => (StatusCode::BAD_REQUEST, "VALIDATION"),
                ErrorCategory::Security => (StatusCode::BAD_REQUEST, "SECURITY"),
                ErrorCategory::Policy => (StatusCode::UNPROCESSABLE_ENTITY, "POLICY"),
                ErrorCategory::Transient => (StatusCode::BAD_GATEWAY, "UPSTREAM"),
                ErrorCategory::Resource | ErrorCategory::Internal => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        let body = Json(ApiResponse::<()>::error(self.0.to_string(), code));

        match &self.0 {
            Error::RateLimited { retry_after } => (
                status,
                [("Retry-After", retry_after_secs(*retry_after).to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::TaskNotFound(Uuid::new_v4()), StatusCode::NOT_FOUND),
            (Error::InvalidState("x".into()), StatusCode::CONFLICT),
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError(error).status_and_code().0, expected);
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let resp = ApiError(Error::RateLimited {
            retry_after: Duration::from_millis(2500),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()["Retry-After"], "3");
    }
}
