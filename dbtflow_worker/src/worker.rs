//! Worker options.

use dbtflow_workflow::DEFAULT_TASK_LIST;

/// Worker errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Worker options for configuration
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Task list the worker serves
    pub task_list: String,
    /// Maximum concurrent activity executions
    pub max_concurrent_activity_execution_size: usize,
    /// Enable session worker
    pub enable_session_worker: bool,
    /// Max concurrent session execution size
    pub max_concurrent_session_execution_size: usize,
    /// Identity
    pub identity: String,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            task_list: DEFAULT_TASK_LIST.to_string(),
            max_concurrent_activity_execution_size: 1000,
            enable_session_worker: false,
            max_concurrent_session_execution_size: 1000,
            identity: format!(
                "dbtflow-worker@{}-pid-{}",
                std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
                std::process::id()
            ),
        }
    }
}

impl WorkerOptions {
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.task_list.is_empty() {
            return Err(WorkerError::InvalidConfiguration(
                "task_list must not be empty".into(),
            ));
        }
        if self.max_concurrent_activity_execution_size == 0 {
            return Err(WorkerError::InvalidConfiguration(
                "max_concurrent_activity_execution_size must be positive".into(),
            ));
        }
        if self.enable_session_worker && self.max_concurrent_session_execution_size == 0 {
            return Err(WorkerError::InvalidConfiguration(
                "max_concurrent_session_execution_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
