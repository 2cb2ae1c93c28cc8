//! Error taxonomy and recovery policy for collaborator failures.
//!
//! The vision model and the nutrition store fail with a raw
//! [`TransportError`]. Those are classified at the boundary into a
//! [`ClassifiedError`] that tells the caller whether a retry makes sense
//! and whether a fallback path (cached data, similar-food search, manual
//! entry) exists. Raw transport errors never travel past the resolver or
//! the coordinator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw failure reported by a collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response could be obtained (DNS, refused, reset, offline).
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Transport exceeded its deadline.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// Upstream answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Credentials are missing or were rejected before a request was made.
    #[error("missing or invalid API key")]
    Credentials,

    /// The response arrived but could not be decoded.
    #[error("unusable payload: {0}")]
    Payload(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Which collaborator call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureContext {
    /// The vision recognition call.
    Recognition,
    /// A nutrition store query.
    FoodSearch,
}

/// Failure kinds visible to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No response reachable.
    NetworkError,
    /// Transport exceeded its deadline.
    TimeoutError,
    /// The model returned no usable detections.
    AiRecognitionFailed,
    /// Credentials, rate limiting or upstream server errors.
    ApiError,
    /// Zero candidates for a detection.
    FoodNotFound,
    /// Anything unclassified.
    UnknownError,
}

/// A classified failure with its recovery policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// Failure kind.
    pub kind: ErrorKind,
    /// User-facing message.
    pub message: String,
    /// Whether repeating the same call may succeed.
    pub retryable: bool,
    /// Whether a fallback path exists.
    pub fallback_available: bool,
}

/// What the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecoveryAction {
    /// Offer a retry.
    Retry,
    /// Offer the fallback path.
    Fallback,
    /// Nothing to offer; show the error.
    Surface,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, message: impl Into<String>, retryable: bool, fallback_available: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
            fallback_available,
        }
    }

    /// No candidates were found for `name`.
    #[must_use]
    pub fn food_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::FoodNotFound,
            format!("No nutrition record found for \"{name}\". Try a similar food or enter it manually."),
            false,
            true,
        )
    }

    /// The model answered but nothing usable could be parsed.
    #[must_use]
    pub fn recognition_empty() -> Self {
        Self::new(
            ErrorKind::AiRecognitionFailed,
            "No food could be recognised in the photo. Retake it or enter the food manually.",
            true,
            true,
        )
    }

    /// Preferred next step. Retry wins over fallback when both apply.
    #[must_use]
    pub fn recovery(&self) -> RecoveryAction {
        if self.retryable {
            RecoveryAction::Retry
        } else if self.fallback_available {
            RecoveryAction::Fallback
        } else {
            RecoveryAction::Surface
        }
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Classify a raw collaborator failure.
#[must_use]
pub fn classify(err: &TransportError, context: FailureContext) -> ClassifiedError {
    match err {
        TransportError::Unreachable(_) => ClassifiedError::new(
            ErrorKind::NetworkError,
            "Check your network connection.",
            true,
            true,
        ),
        TransportError::Timeout(_) => ClassifiedError::new(
            ErrorKind::TimeoutError,
            "The request took too long. Try again.",
            true,
            true,
        ),
        TransportError::Status { status, .. } => classify_status(*status),
        TransportError::Credentials => ClassifiedError::new(
            ErrorKind::ApiError,
            "The service is not configured. Check the API key.",
            false,
            true,
        ),
        TransportError::Payload(_) | TransportError::Other(_) => match context {
            FailureContext::Recognition => ClassifiedError::recognition_empty(),
            FailureContext::FoodSearch => ClassifiedError::new(
                ErrorKind::UnknownError,
                "An unexpected error occurred.",
                false,
                false,
            ),
        },
    }
}

fn classify_status(status: u16) -> ClassifiedError {
    match status {
        401 | 403 => ClassifiedError::new(
            ErrorKind::ApiError,
            "Authentication failed. Check the API key.",
            false,
            true,
        ),
        404 => ClassifiedError::new(
            ErrorKind::FoodNotFound,
            "The requested food was not found.",
            false,
            true,
        ),
        429 => ClassifiedError::new(
            ErrorKind::ApiError,
            "Too many requests. Try again shortly.",
            true,
            true,
        ),
        500..=599 => ClassifiedError::new(
            ErrorKind::ApiError,
            "The server is having trouble. Try again later.",
            true,
            true,
        ),
        other => ClassifiedError::new(
            ErrorKind::ApiError,
            format!("Request failed with status {other}."),
            true,
            true,
        ),
    }
}
