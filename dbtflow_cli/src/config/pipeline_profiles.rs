use dbtflow::core::{ActivityOptions, RetryPolicy, SessionOptions};
use dbtflow::workflow::PipelineConfig;
use std::time::Duration;
use tracing::warn;

/// Get pipeline configuration by profile name
pub fn get_pipeline_profile(profile: &str) -> PipelineConfig {
    match profile {
        "default" => default_profile(),
        "dev" => development_profile(),
        "ci" => ci_profile(),
        _ => {
            warn!(profile, "unknown profile, using 'default' profile");
            default_profile()
        }
    }
}

/// Budgets of the production pipeline:
/// - 600s per step, no retries
/// - 60s for cleanup
/// - 30s for the error alert, 5s for the success alert
pub fn default_profile() -> PipelineConfig {
    PipelineConfig::default()
}

/// Development profile
///
/// Shorter step budget so a hung dbt command surfaces quickly.
pub fn development_profile() -> PipelineConfig {
    let defaults = PipelineConfig::default();
    PipelineConfig {
        step_options: ActivityOptions::with_start_to_close(Duration::from_secs(120))
            .task_list(defaults.step_options.task_list.clone()),
        cleanup_options: ActivityOptions::with_start_to_close(Duration::from_secs(30))
            .task_list(defaults.cleanup_options.task_list.clone()),
        ..defaults
    }
}

/// CI profile
///
/// Runs inside a session and retries infrastructure failures. A dbt command
/// exiting non-zero is an `Application` error and is never retried.
pub fn ci_profile() -> PipelineConfig {
    let defaults = PipelineConfig::default();
    let retry = RetryPolicy {
        initial_interval: Duration::from_secs(10),
        backoff_coefficient: 2.0,
        maximum_interval: Duration::from_secs(60),
        maximum_attempts: 3,
        non_retryable_error_types: vec!["Application".to_string()],
    };
    PipelineConfig {
        step_options: defaults.step_options.clone().retry_policy(retry),
        session: Some(SessionOptions::default()),
        ..defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_profile_falls_back_to_default() {
        assert_eq!(get_pipeline_profile("nightly"), default_profile());
    }

    #[test]
    fn test_ci_profile_uses_session_and_retries() {
        let config = get_pipeline_profile("ci");
        assert!(config.session.is_some());
        let policy = config.step_options.retry_policy.as_ref().unwrap();
        assert_eq!(policy.maximum_attempts, 3);
        // three 600s attempts with 10s and 20s of backoff
        assert_eq!(
            config.step_options.deadline(),
            Some(Duration::from_secs(1830))
        );
    }

    #[test]
    fn test_dev_profile_shortens_budgets() {
        let config = get_pipeline_profile("dev");
        assert_eq!(config.step_options.deadline(), Some(Duration::from_secs(120)));
        assert_eq!(config.cleanup_options.deadline(), Some(Duration::from_secs(30)));
        assert_eq!(config.error_alert_options, default_profile().error_alert_options);
    }
}
