//! Client error types.

use std::time::Duration;

use crate::types::Operation;

/// Errors from a single HTTP exchange with a blob server.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: Operation, after: Duration },

    /// No HTTP response was obtained (DNS, connect, TLS, reset).
    #[error("{operation} failed: {message}")]
    Transport { operation: Operation, message: String },

    #[error("{operation} rejected with HTTP {status}: {reason}")]
    Status {
        operation: Operation,
        status: u16,
        reason: String,
    },

    #[error("malformed {operation} response: {message}")]
    Decode { operation: Operation, message: String },

    #[error("failed to read blob: {0}")]
    Source(String),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True when the request never produced an HTTP response.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// HTTP status for server-reported failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn from_reqwest(
        operation: Operation,
        timeout: Option<Duration>,
        err: reqwest::Error,
    ) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                operation,
                after: timeout.unwrap_or_default(),
            };
        }
        if err.is_builder() {
            return Self::InvalidRequest(error_chain(&err));
        }
        Self::Transport {
            operation,
            message: error_chain(&err),
        }
    }
}

/// Joins an error and its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
