//! Tool failures

use thiserror::Error;

/// Why a tool call did not produce a result
#[derive(Debug, Error)]
pub enum Error {
    /// No tool is registered under this name
    #[error("no tool named '{0}'")]
    NotFound(String),

    /// The tool ran and gave up
    #[error("tool failed: {0}")]
    Execution(String),

    /// Arguments do not match the tool's schema
    #[error("bad arguments: {0}")]
    InvalidInput(String),

    /// The call is not allowed without approval, or the tool is disabled
    #[error("not permitted: {0}")]
    PermissionDenied(String),

    /// Deadline passed, in milliseconds
    #[error("tool gave no result within {0}ms")]
    Timeout(u64),

    /// Filesystem failure inside a tool
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Only deadline misses are worth another attempt
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result alias for tool calls
pub type Result<T> = std::result::Result<T, Error>;
