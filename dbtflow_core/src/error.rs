//! Error types shared across dbtflow crates.
//!
//! [`ActivityError`] is what an executor reports for a failed activity
//! invocation; [`SessionError`] covers the scoped execution resource.

use crate::encoded::EncodingError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which timeout fired for an activity invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutType {
    StartToClose,
    ScheduleToClose,
}

impl fmt::Display for TimeoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutType::StartToClose => write!(f, "START_TO_CLOSE"),
            TimeoutType::ScheduleToClose => write!(f, "SCHEDULE_TO_CLOSE"),
        }
    }
}

/// Activity error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActivityError {
    #[error("Activity execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Activity panicked: {0}")]
    Panic(String),
    #[error("Retryable activity error: {0}")]
    Retryable(String),
    #[error("Non-retryable activity error: {0}")]
    NonRetryable(String),
    #[error("Application error: {0}")]
    Application(String),
    #[error("Activity cancelled")]
    Cancelled,
    #[error("Activity timed out: {0}")]
    Timeout(TimeoutType),
}

impl ActivityError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a non-retryable error
    pub fn non_retryable(msg: impl Into<String>) -> Self {
        Self::NonRetryable(msg.into())
    }

    /// Create an application error
    pub fn application(msg: impl Into<String>) -> Self {
        Self::Application(msg.into())
    }

    /// Name matched against `RetryPolicy::non_retryable_error_types`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ExecutionFailed(_) => "ExecutionFailed",
            Self::Panic(_) => "Panic",
            Self::Retryable(_) => "Retryable",
            Self::NonRetryable(_) => "NonRetryable",
            Self::Application(_) => "Application",
            Self::Cancelled => "Cancelled",
            Self::Timeout(_) => "Timeout",
        }
    }
}

/// Error an executor reports for a failed invocation.
pub type ExecutorError = ActivityError;

impl From<EncodingError> for ActivityError {
    fn from(err: EncodingError) -> Self {
        ActivityError::NonRetryable(err.to_string())
    }
}

/// Errors establishing the scoped execution resource (session)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("sessions are not supported by this executor")]
    NotSupported,
    #[error("session creation timed out after {0:?}")]
    CreationTimeout(Duration),
    #[error("session unavailable: {0}")]
    Unavailable(String),
}

/// Errors from constructing core values
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        assert_eq!(ActivityError::retryable("flaky").type_name(), "Retryable");
        assert_eq!(
            ActivityError::non_retryable("bad input"),
            ActivityError::NonRetryable("bad input".into())
        );
        assert_eq!(ActivityError::application("exit 2").to_string(), "Application error: exit 2");
        assert_eq!(ActivityError::Cancelled.type_name(), "Cancelled");
    }

    #[test]
    fn test_timeout_display() {
        let err = ActivityError::Timeout(TimeoutType::StartToClose);
        assert_eq!(err.to_string(), "Activity timed out: START_TO_CLOSE");
    }

    #[test]
    fn test_encoding_error_is_not_retried() {
        let err: ActivityError = EncodingError::Deserialization("eof".into()).into();
        assert_eq!(err.type_name(), "NonRetryable");
        assert!(err.to_string().contains("eof"));
    }
}
