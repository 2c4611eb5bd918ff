//! Core types for dbtflow.
//!
//! This module defines the run parameters handed to every activity, the
//! fixed step catalogue of the dbt refresh pipeline, and the options that
//! bound each activity invocation.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Parameters of a single pipeline run.
///
/// Serialized at the executor boundary as
/// `{"env": .., "project_location": .., "profile_location": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunParams {
    /// dbt target the transform runs against
    pub env: String,
    /// Path of the dbt project
    pub project_location: String,
    /// Directory holding `profiles.yml`, if not the dbt default
    #[serde(default)]
    pub profile_location: Option<String>,
}

impl RunParams {
    pub fn new(
        env: impl Into<String>,
        project_location: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let params = Self {
            env: env.into(),
            project_location: project_location.into(),
            profile_location: None,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn with_profile_location(mut self, profile_location: impl Into<String>) -> Self {
        self.profile_location = Some(profile_location.into());
        self
    }

    /// Check that the required fields are present.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.env.trim().is_empty() {
            return Err(CoreError::InvalidArgument("env must not be empty".into()));
        }
        if self.project_location.trim().is_empty() {
            return Err(CoreError::InvalidArgument(
                "project_location must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Identifier used for logging and alerting: `env--project_location--step`.
    pub fn step_identifier(&self, step: &str) -> String {
        format!("{}--{}--{}", self.env, self.project_location, step)
    }

    /// Identifier sent with the success alert.
    pub fn completion_identifier(&self) -> String {
        self.step_identifier(COMPLETED_MARKER)
    }

    /// Final path component of the project location without extension.
    pub fn project_stem(&self) -> &str {
        Path::new(&self.project_location)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.project_location)
    }
}

/// Suffix of the identifier sent when every step succeeded.
pub const COMPLETED_MARKER: &str = "completed";

/// Named units of work of the dbt refresh pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Debug,
    Deps,
    TestSource,
    Run,
    Test,
    Clean,
    DocsGenerate,
}

impl Step {
    /// Steps executed by the pipeline, in order.
    pub const SEQUENCE: [Step; 5] = [
        Step::Debug,
        Step::Deps,
        Step::TestSource,
        Step::Run,
        Step::Test,
    ];

    /// Step executed once when the pipeline finishes.
    pub const CLEANUP: Step = Step::Clean;

    pub const ALL: [Step; 7] = [
        Step::Debug,
        Step::Deps,
        Step::TestSource,
        Step::Run,
        Step::Test,
        Step::Clean,
        Step::DocsGenerate,
    ];

    /// Name the step's activity is registered under.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Debug => "debug",
            Step::Deps => "deps",
            Step::TestSource => "test_source",
            Step::Run => "run",
            Step::Test => "test",
            Step::Clean => "clean",
            Step::DocsGenerate => "docs_generate",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which alert a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Error,
    Success,
}

impl AlertKind {
    /// Name the alert activity is registered under.
    pub fn activity_name(&self) -> &'static str {
        match self {
            AlertKind::Error => "alert_error",
            AlertKind::Success => "alert_success",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Error => write!(f, "error"),
            AlertKind::Success => write!(f, "success"),
        }
    }
}

/// Retry policy for activities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Backoff before the first retry
    pub initial_interval: Duration,
    /// Backoff coefficient (e.g., 2.0 for exponential)
    pub backoff_coefficient: f64,
    /// Maximum retry interval, zero means uncapped
    pub maximum_interval: Duration,
    /// Maximum number of attempts, zero means unlimited
    pub maximum_attempts: i32,
    /// Error type names that are never retried
    pub non_retryable_error_types: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
            maximum_attempts: 0,
            non_retryable_error_types: vec![],
        }
    }
}

impl RetryPolicy {
    pub fn with_maximum_attempts(maximum_attempts: i32) -> Self {
        Self {
            maximum_attempts,
            ..Default::default()
        }
    }

    /// Backoff to wait after the given zero-based attempt failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs =
            self.initial_interval.as_secs_f64() * self.backoff_coefficient.max(1.0).powi(exponent);
        let backoff = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);

        if !self.maximum_interval.is_zero() && backoff > self.maximum_interval {
            self.maximum_interval
        } else {
            backoff
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.maximum_attempts <= 0
    }
}

/// Options bounding a single activity invocation.
///
/// Zero durations mean the timeout is not set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivityOptions {
    /// Task list to schedule the activity on
    pub task_list: String,
    /// Upper bound for the whole invocation including retries
    pub schedule_to_close_timeout: Duration,
    /// Upper bound for a single attempt
    pub start_to_close_timeout: Duration,
    /// Retry policy applied by the executor
    pub retry_policy: Option<RetryPolicy>,
}

impl ActivityOptions {
    pub fn with_start_to_close(start_to_close_timeout: Duration) -> Self {
        Self {
            start_to_close_timeout,
            ..Default::default()
        }
    }

    pub fn schedule_to_close(mut self, timeout: Duration) -> Self {
        self.schedule_to_close_timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    pub fn task_list(mut self, task_list: impl Into<String>) -> Self {
        self.task_list = task_list.into();
        self
    }

    /// Total time the invocation may take, or `None` when unbounded.
    ///
    /// An explicit schedule-to-close timeout wins. Otherwise the bound is
    /// derived from the per-attempt timeout and the retry policy, including
    /// the backoff between attempts.
    pub fn deadline(&self) -> Option<Duration> {
        if !self.schedule_to_close_timeout.is_zero() {
            return Some(self.schedule_to_close_timeout);
        }
        if self.start_to_close_timeout.is_zero() {
            return None;
        }

        match &self.retry_policy {
            None => Some(self.start_to_close_timeout),
            Some(policy) if policy.is_unlimited() => None,
            Some(policy) => {
                let attempts = u32::try_from(policy.maximum_attempts).unwrap_or(1).max(1);
                let mut total = self.start_to_close_timeout.saturating_mul(attempts);
                for attempt in 0..attempts - 1 {
                    total = total.saturating_add(policy.backoff(attempt));
                }
                Some(total)
            }
        }
    }
}

/// Options for the scoped execution resource grouping a run's invocations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// How long to wait for a session slot
    pub creation_timeout: Duration,
    /// How long the session may stay open
    pub execution_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            creation_timeout: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(60 * 60),
        }
    }
}

/// Session information
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub task_list: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        let params = RunParams::new("dev", "./test").unwrap();
        assert_eq!(params.step_identifier("test"), "dev--./test--test");
        assert_eq!(params.completion_identifier(), "dev--./test--completed");
    }

    #[test]
    fn test_run_params_validation() {
        assert!(RunParams::new("", "./test").is_err());
        assert!(RunParams::new("dev", "  ").is_err());

        let err = RunParams::new("dev", "").unwrap_err();
        assert!(err.to_string().contains("project_location"));
    }

    #[test]
    fn test_run_params_wire_format() {
        let params = RunParams::new("prod", "/srv/analytics")
            .unwrap()
            .with_profile_location("/etc/dbt");
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["env"], "prod");
        assert_eq!(value["project_location"], "/srv/analytics");
        assert_eq!(value["profile_location"], "/etc/dbt");

        let without_profile: RunParams =
            serde_json::from_str(r#"{"project_location": "./test", "env": "dev"}"#).unwrap();
        assert_eq!(without_profile.profile_location, None);

        let explicit_null: RunParams = serde_json::from_str(
            r#"{"env": "dev", "project_location": "./test", "profile_location": null}"#,
        )
        .unwrap();
        assert_eq!(explicit_null, without_profile);
    }

    #[test]
    fn test_project_stem() {
        let params = RunParams::new("dev", "projects/jaffle_shop").unwrap();
        assert_eq!(params.project_stem(), "jaffle_shop");

        let dotted = RunParams::new("dev", ".").unwrap();
        assert_eq!(dotted.project_stem(), ".");
    }

    #[test]
    fn test_step_sequence_order() {
        let names: Vec<_> = Step::SEQUENCE.iter().map(Step::name).collect();
        assert_eq!(names, ["debug", "deps", "test_source", "run", "test"]);
        assert!(!Step::SEQUENCE.contains(&Step::CLEANUP));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(10),
            maximum_attempts: 5,
            non_retryable_error_types: vec![],
        };
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(10), Duration::from_secs(10));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_deadline_derivation() {
        let plain = ActivityOptions::with_start_to_close(Duration::from_secs(600));
        assert_eq!(plain.deadline(), Some(Duration::from_secs(600)));

        let explicit = plain.clone().schedule_to_close(Duration::from_secs(30));
        assert_eq!(explicit.deadline(), Some(Duration::from_secs(30)));

        let retried = ActivityOptions::with_start_to_close(Duration::from_secs(10)).retry_policy(
            RetryPolicy {
                initial_interval: Duration::from_secs(1),
                backoff_coefficient: 2.0,
                maximum_interval: Duration::from_secs(100),
                maximum_attempts: 3,
                non_retryable_error_types: vec![],
            },
        );
        // three attempts plus 1s and 2s of backoff
        assert_eq!(retried.deadline(), Some(Duration::from_secs(33)));

        let unlimited = ActivityOptions::with_start_to_close(Duration::from_secs(10))
            .retry_policy(RetryPolicy::default());
        assert_eq!(unlimited.deadline(), None);

        assert_eq!(ActivityOptions::default().deadline(), None);
    }
}
