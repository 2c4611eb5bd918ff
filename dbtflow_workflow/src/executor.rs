//! Seams between the coordinator and the runtime executing its activities.

use async_trait::async_trait;
use dbtflow_core::{
    ActivityError, ActivityOptions, AlertKind, RunParams, SessionError, SessionInfo,
    SessionOptions,
};
use tracing::{error, info};

/// Executes pipeline activities on behalf of the coordinator.
///
/// Implementations own dispatch, retries and persistence of in-flight
/// state. The coordinator never retries a failed invocation itself.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Invoke the activity registered under `activity` with the run parameters.
    async fn invoke(
        &self,
        activity: &str,
        params: &RunParams,
        options: &ActivityOptions,
    ) -> Result<bool, ActivityError>;

    /// Open a session that pins the run's invocations to one worker.
    async fn create_session(&self, _options: &SessionOptions) -> Result<SessionInfo, SessionError> {
        Err(SessionError::NotSupported)
    }

    /// Release a session opened by [`StepExecutor::create_session`].
    async fn complete_session(&self, _session: &SessionInfo) {}
}

/// Delivers the one alert sent per run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        kind: AlertKind,
        identifier: &str,
        options: &ActivityOptions,
    ) -> Result<bool, ActivityError>;
}

/// Notifier that only writes the alert to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        kind: AlertKind,
        identifier: &str,
        _options: &ActivityOptions,
    ) -> Result<bool, ActivityError> {
        match kind {
            AlertKind::Error => error!(identifier, "pipeline error alert"),
            AlertKind::Success => info!(identifier, "pipeline success alert"),
        }
        Ok(true)
    }
}
