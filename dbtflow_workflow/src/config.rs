//! Budgets and scoping of a pipeline run.

use dbtflow_core::{ActivityOptions, AlertKind, RetryPolicy, SessionOptions};
use std::time::Duration;

/// Task list used when none is configured.
pub const DEFAULT_TASK_LIST: &str = "dbt-update-operations";

/// Configuration for [`crate::PipelineWorkflow`]
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Options for every step of the sequence
    pub step_options: ActivityOptions,
    /// Options for the deferred `clean` step
    pub cleanup_options: ActivityOptions,
    pub error_alert_options: ActivityOptions,
    pub success_alert_options: ActivityOptions,
    /// Open a session pinning the run to one worker
    pub session: Option<SessionOptions>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            step_options: ActivityOptions::with_start_to_close(Duration::from_secs(600))
                .task_list(DEFAULT_TASK_LIST),
            cleanup_options: ActivityOptions::with_start_to_close(Duration::from_secs(60))
                .task_list(DEFAULT_TASK_LIST),
            error_alert_options: ActivityOptions::with_start_to_close(Duration::from_secs(10))
                .schedule_to_close(Duration::from_secs(30))
                .retry_policy(RetryPolicy::with_maximum_attempts(5))
                .task_list(DEFAULT_TASK_LIST),
            success_alert_options: ActivityOptions::with_start_to_close(Duration::from_secs(5))
                .schedule_to_close(Duration::from_secs(5))
                .retry_policy(RetryPolicy::with_maximum_attempts(3))
                .task_list(DEFAULT_TASK_LIST),
            session: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = Some(session);
        self
    }

    /// Schedule every invocation of the run on `task_list`.
    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        let task_list = task_list.into();
        for options in [
            &mut self.step_options,
            &mut self.cleanup_options,
            &mut self.error_alert_options,
            &mut self.success_alert_options,
        ] {
            options.task_list = task_list.clone();
        }
        self
    }

    pub fn alert_options(&self, kind: AlertKind) -> &ActivityOptions {
        match kind {
            AlertKind::Error => &self.error_alert_options,
            AlertKind::Success => &self.success_alert_options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets() {
        let config = PipelineConfig::default();
        assert_eq!(config.step_options.deadline(), Some(Duration::from_secs(600)));
        assert_eq!(config.cleanup_options.deadline(), Some(Duration::from_secs(60)));
        assert_eq!(
            config.alert_options(AlertKind::Error).deadline(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            config.alert_options(AlertKind::Success).deadline(),
            Some(Duration::from_secs(5))
        );
        assert!(config.session.is_none());
    }

    #[test]
    fn test_with_task_list_applies_to_all_options() {
        let config = PipelineConfig::default().with_task_list("analytics");
        assert_eq!(config.step_options.task_list, "analytics");
        assert_eq!(config.cleanup_options.task_list, "analytics");
        assert_eq!(config.error_alert_options.task_list, "analytics");
        assert_eq!(config.success_alert_options.task_list, "analytics");
    }
}
