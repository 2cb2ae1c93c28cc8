//! Remote client error types.

use glyscan_core::TransportError;
use thiserror::Error;

/// Largest response body kept in an error message.
const MAX_BODY_CHARS: usize = 512;

/// Errors that can occur talking to the vision model or nutrition backend.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection could not be established.
    #[error("remote unreachable: {0}")]
    Unavailable(String),

    /// Request timed out.
    #[error("remote request timed out after {0}ms")]
    Timeout(u64),

    /// Server answered with a non-success status.
    #[error("remote returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// No API key was configured.
    #[error("no API key configured (set {0})")]
    MissingApiKey(String),

    /// Response body did not match the expected shape.
    #[error("failed to decode remote response: {0}")]
    ParseError(String),

    /// HTTP request failed for another reason.
    #[error("remote request failed: {0}")]
    RequestFailed(String),

    /// Configuration error.
    #[error("remote configuration error: {0}")]
    ConfigError(String),
}

impl RemoteError {
    /// Status error with the body cut to a loggable length.
    #[must_use]
    pub fn status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            body: body.chars().take(MAX_BODY_CHARS).collect(),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout(0)
        } else if err.is_connect() {
            RemoteError::Unavailable(err.to_string())
        } else if err.is_decode() {
            RemoteError::ParseError(err.to_string())
        } else {
            RemoteError::RequestFailed(err.to_string())
        }
    }
}

impl From<RemoteError> for TransportError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unavailable(msg) => TransportError::Unreachable(msg),
            RemoteError::Timeout(ms) => TransportError::Timeout(ms),
            RemoteError::Status { status, body } => TransportError::Status { status, body },
            RemoteError::MissingApiKey(_) => TransportError::Credentials,
            RemoteError::ParseError(msg) => TransportError::Payload(msg),
            RemoteError::RequestFailed(msg) | RemoteError::ConfigError(msg) => TransportError::Other(msg),
        }
    }
}
