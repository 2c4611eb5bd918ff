//! Scripted test doubles for [`StepExecutor`] and [`Notifier`].

use async_trait::async_trait;
use dbtflow_core::{
    ActivityError, ActivityOptions, AlertKind, RunParams, SessionError, SessionInfo,
    SessionOptions,
};
use dbtflow_workflow::{ExecutionOutcome, Notifier, PipelineConfig, PipelineWorkflow, StepExecutor};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Scripted answer to an invocation
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    Return(bool),
    Error(ActivityError),
    /// Sleep (on the tokio clock), then return
    Delay(Duration, bool),
    /// Never complete
    Pending,
    /// Panic inside the invocation
    Panic(String),
}

impl MockResponse {
    async fn resolve(self) -> Result<bool, ActivityError> {
        match self {
            MockResponse::Return(value) => Ok(value),
            MockResponse::Error(err) => Err(err),
            MockResponse::Delay(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            MockResponse::Pending => std::future::pending().await,
            MockResponse::Panic(msg) => panic!("{}", msg),
        }
    }
}

/// One call into the executor
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub activity: String,
    pub params: RunParams,
    pub options: ActivityOptions,
}

/// Entry of the journal shared by a [`MockExecutor`] and its notifier
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Invoked(String),
    Alerted(AlertKind, String),
    SessionCreated(SessionInfo),
    SessionCompleted(SessionInfo),
}

type Journal = Arc<Mutex<Vec<MockEvent>>>;

#[derive(Default)]
struct MockState {
    responses: HashMap<String, MockResponse>,
    invocations: Vec<Invocation>,
    session: Option<Result<SessionInfo, SessionError>>,
}

/// Executor answering invocations from a script.
///
/// Activities without a scripted response return `Ok(true)`. Sessions are
/// unsupported until [`MockExecutor::enable_sessions`] or
/// [`MockExecutor::fail_session_creation`] is called.
#[derive(Clone, Default)]
pub struct MockExecutor {
    state: Arc<Mutex<MockState>>,
    journal: Journal,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the response of `activity` for every invocation.
    pub fn on_activity(&self, activity: &str, response: MockResponse) -> &Self {
        self.state
            .lock()
            .responses
            .insert(activity.to_string(), response);
        self
    }

    /// Hand out `session` from `create_session`.
    pub fn enable_sessions(&self, session: SessionInfo) -> &Self {
        self.state.lock().session = Some(Ok(session));
        self
    }

    pub fn fail_session_creation(&self, err: SessionError) -> &Self {
        self.state.lock().session = Some(Err(err));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    /// Names of the invoked activities, in order.
    pub fn invoked_names(&self) -> Vec<String> {
        self.state
            .lock()
            .invocations
            .iter()
            .map(|invocation| invocation.activity.clone())
            .collect()
    }

    pub fn count(&self, activity: &str) -> usize {
        self.state
            .lock()
            .invocations
            .iter()
            .filter(|invocation| invocation.activity == activity)
            .count()
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.journal.lock().clone()
    }

    /// Clear recorded invocations and events, keeping the script.
    pub fn reset(&self) {
        self.state.lock().invocations.clear();
        self.journal.lock().clear();
    }
}

#[async_trait]
impl StepExecutor for MockExecutor {
    async fn invoke(
        &self,
        activity: &str,
        params: &RunParams,
        options: &ActivityOptions,
    ) -> Result<bool, ActivityError> {
        let response = {
            let mut state = self.state.lock();
            state.invocations.push(Invocation {
                activity: activity.to_string(),
                params: params.clone(),
                options: options.clone(),
            });
            state
                .responses
                .get(activity)
                .cloned()
                .unwrap_or(MockResponse::Return(true))
        };
        self.journal
            .lock()
            .push(MockEvent::Invoked(activity.to_string()));
        response.resolve().await
    }

    async fn create_session(&self, _options: &SessionOptions) -> Result<SessionInfo, SessionError> {
        let scripted = self.state.lock().session.clone();
        let result = scripted.unwrap_or(Err(SessionError::NotSupported));
        if let Ok(session) = &result {
            self.journal
                .lock()
                .push(MockEvent::SessionCreated(session.clone()));
        }
        result
    }

    async fn complete_session(&self, session: &SessionInfo) {
        self.journal
            .lock()
            .push(MockEvent::SessionCompleted(session.clone()));
    }
}

/// Notifier recording every alert
#[derive(Clone)]
pub struct RecordingNotifier {
    alerts: Arc<Mutex<Vec<(AlertKind, String, ActivityOptions)>>>,
    response: Arc<Mutex<MockResponse>>,
    journal: Journal,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            alerts: Arc::new(Mutex::new(Vec::new())),
            response: Arc::new(Mutex::new(MockResponse::Return(true))),
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Notifier writing into the executor's journal.
    pub fn sharing_journal(executor: &MockExecutor) -> Self {
        Self {
            journal: Arc::clone(&executor.journal),
            ..Self::new()
        }
    }

    pub fn respond_with(&self, response: MockResponse) -> &Self {
        *self.response.lock() = response;
        self
    }

    pub fn alerts(&self) -> Vec<(AlertKind, String)> {
        self.alerts
            .lock()
            .iter()
            .map(|(kind, identifier, _)| (*kind, identifier.clone()))
            .collect()
    }

    /// Options each alert was sent with, in order.
    pub fn alert_options(&self) -> Vec<ActivityOptions> {
        self.alerts
            .lock()
            .iter()
            .map(|(_, _, options)| options.clone())
            .collect()
    }

    pub fn reset(&self) {
        self.alerts.lock().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        kind: AlertKind,
        identifier: &str,
        options: &ActivityOptions,
    ) -> Result<bool, ActivityError> {
        self.alerts
            .lock()
            .push((kind, identifier.to_string(), options.clone()));
        self.journal
            .lock()
            .push(MockEvent::Alerted(kind, identifier.to_string()));
        let response = self.response.lock().clone();
        response.resolve().await
    }
}

/// Pipeline wired to a [`MockExecutor`] and a [`RecordingNotifier`]
pub struct TestPipelineEnvironment {
    executor: MockExecutor,
    notifier: RecordingNotifier,
    config: PipelineConfig,
}

impl Default for TestPipelineEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPipelineEnvironment {
    pub fn new() -> Self {
        let executor = MockExecutor::new();
        let notifier = RecordingNotifier::sharing_journal(&executor);
        Self {
            executor,
            notifier,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn executor(&self) -> &MockExecutor {
        &self.executor
    }

    pub fn notifier(&self) -> &RecordingNotifier {
        &self.notifier
    }

    pub fn workflow(&self) -> PipelineWorkflow {
        PipelineWorkflow::new(
            Arc::new(self.executor.clone()),
            Arc::new(self.notifier.clone()),
            self.config.clone(),
        )
    }

    pub async fn execute(&self, params: RunParams) -> ExecutionOutcome {
        self.workflow().run(params).await
    }

    /// Clear recorded calls between runs.
    pub fn reset(&self) {
        self.executor.reset();
        self.notifier.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_activities_succeed() {
        let executor = MockExecutor::new();
        let params = RunParams::new("dev", "./test").unwrap();
        let options = ActivityOptions::default();

        assert!(executor.invoke("debug", &params, &options).await.unwrap());
        executor.on_activity("deps", MockResponse::Return(false));
        assert!(!executor.invoke("deps", &params, &options).await.unwrap());
        assert_eq!(executor.invoked_names(), ["debug", "deps"]);
        assert_eq!(executor.count("deps"), 1);
    }

    #[tokio::test]
    async fn test_sessions_unsupported_by_default() {
        let executor = MockExecutor::new();
        let err = executor
            .create_session(&SessionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::NotSupported);
        assert!(executor.events().is_empty());
    }

    #[tokio::test]
    async fn test_notifier_shares_journal() {
        let env = TestPipelineEnvironment::new();
        env.notifier()
            .notify(AlertKind::Success, "dev--./test--completed", &ActivityOptions::default())
            .await
            .unwrap();
        assert_eq!(
            env.executor().events(),
            [MockEvent::Alerted(
                AlertKind::Success,
                "dev--./test--completed".to_string()
            )]
        );
    }
}
