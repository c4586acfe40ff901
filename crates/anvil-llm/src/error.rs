//! Failures reported by model backends

use thiserror::Error;

/// Model backend failure
#[derive(Debug, Error)]
pub enum Error {
    /// Backend is missing a credential or endpoint
    #[error("backend not configured: {0}")]
    NotConfigured(String),

    /// Backend refused the credential
    #[error("credential rejected: {0}")]
    Authentication(String),

    /// Backend answered with an error status
    #[error("backend rejected request ({status}): {message}")]
    Backend {
        /// HTTP status, or 0 when the backend gave none
        status: u16,
        /// Redacted failure description
        message: String,
    },

    /// Backend asked us to slow down
    #[error("backend throttled the request")]
    Throttled,

    /// Backend answered with something we could not read
    #[error("unreadable backend response: {0}")]
    InvalidResponse(String),

    /// Transport failure before an answer arrived
    #[error("transport failure: {0}")]
    Network(String),

    /// No answer within the deadline, in milliseconds
    #[error("no answer within {0}ms")]
    Timeout(u64),
}

impl Error {
    /// Backend error without an HTTP status
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            status: 0,
            message: message.into(),
        }
    }

    /// Whether sending the same request again may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::Throttled => true,
            Self::Backend { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result alias for backend calls
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(Error::Timeout(500).is_transient());
        assert!(Error::Network("reset".into()).is_transient());
        assert!(Error::Throttled.is_transient());
        assert!(Error::Backend {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());

        assert!(!Error::backend("bad prompt").is_transient());
        assert!(!Error::Authentication("bad key".into()).is_transient());
        assert!(!Error::NotConfigured("openai".into()).is_transient());
        assert!(!Error::InvalidResponse("empty".into()).is_transient());
    }

    #[test]
    fn test_backend_display_carries_status() {
        let err = Error::Backend {
            status: 400,
            message: "context too long".into(),
        };
        assert_eq!(
            err.to_string(),
            "backend rejected request (400): context too long"
        );
    }
}
