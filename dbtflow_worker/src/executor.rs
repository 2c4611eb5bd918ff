//! Local activity executor.
//!
//! Runs registered activities in-process for the pipeline coordinator.
//! Each attempt is spawned on its own task so a panicking activity is
//! reported as [`ActivityError::Panic`] instead of tearing down the run. The
//! task is aborted when the attempt times out or the caller stops waiting
//! for it, which also kills any child process the activity started.

use crate::registry::Registry;
use crate::session::SessionManager;
use crate::worker::{WorkerError, WorkerOptions};
use async_trait::async_trait;
use dbtflow_activity::{ActivityContext, ActivityInfo};
use dbtflow_core::{
    ActivityError, ActivityOptions, AlertKind, DataConverter, JsonDataConverter, RetryPolicy,
    RunParams, SessionError, SessionInfo, SessionOptions, TimeoutType,
};
use dbtflow_workflow::{Notifier, StepExecutor};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Executes activities from a [`Registry`] on the current runtime
pub struct LocalExecutor {
    registry: Arc<dyn Registry>,
    options: WorkerOptions,
    activity_slots: Arc<Semaphore>,
    sessions: SessionManager,
    converter: JsonDataConverter,
}

impl LocalExecutor {
    pub fn new(registry: Arc<dyn Registry>, options: WorkerOptions) -> Result<Self, WorkerError> {
        options.validate()?;
        Ok(Self {
            activity_slots: Arc::new(Semaphore::new(
                options.max_concurrent_activity_execution_size,
            )),
            sessions: SessionManager::new(&options),
            registry,
            options,
            converter: JsonDataConverter::new(),
        })
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Execute an activity with raw payloads, applying timeouts and retries.
    pub async fn execute_activity(
        &self,
        activity_type: &str,
        input: Option<Vec<u8>>,
        options: &ActivityOptions,
    ) -> Result<Vec<u8>, ActivityError> {
        let session = self
            .sessions
            .resolve(&options.task_list)
            .map_err(|e| ActivityError::NonRetryable(e.to_string()))?;

        let activity_id = Uuid::new_v4().to_string();
        let scheduled_time = chrono::Utc::now();
        let deadline = if options.schedule_to_close_timeout.is_zero() {
            None
        } else {
            Instant::now().checked_add(options.schedule_to_close_timeout)
        };
        let retry_policy = options.retry_policy.as_ref();
        let mut attempt: u32 = 0;

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    activity_type,
                    activity_id = %activity_id,
                    attempt,
                    "activity timed out"
                );
                return Err(ActivityError::Timeout(TimeoutType::ScheduleToClose));
            }

            let mut info = ActivityInfo::new(activity_id.clone(), activity_type);
            info.task_list = options.task_list.clone();
            info.attempt = attempt;
            info.scheduled_time = scheduled_time;
            info.session = session.clone();

            let (budget, timeout_type) = attempt_budget(options, deadline);
            info.deadline = budget.and_then(|b| std::time::Instant::now().checked_add(b));

            match self
                .execute_once(ActivityContext::new(info), input.clone(), budget, timeout_type)
                .await
            {
                Ok(output) => {
                    debug!(
                        activity_type,
                        activity_id = %activity_id,
                        attempt,
                        "activity succeeded"
                    );
                    return Ok(output);
                }
                Err(err) if !should_retry(&err, retry_policy, attempt) => {
                    error!(
                        activity_type,
                        activity_id = %activity_id,
                        error = %err,
                        "activity failed permanently"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let backoff = retry_policy
                        .map(|policy| policy.backoff(attempt))
                        .unwrap_or(Duration::from_secs(1));
                    warn!(
                        activity_type,
                        activity_id = %activity_id,
                        attempt,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "activity failed, retrying after backoff"
                    );

                    if deadline.is_some_and(|d| Instant::now() + backoff >= d) {
                        warn!(
                            backoff_ms = backoff.as_millis() as u64,
                            "no time for backoff, failing activity"
                        );
                        return Err(ActivityError::Timeout(TimeoutType::ScheduleToClose));
                    }

                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Execute a single attempt
    async fn execute_once(
        &self,
        ctx: ActivityContext,
        input: Option<Vec<u8>>,
        budget: Option<Duration>,
        timeout_type: TimeoutType,
    ) -> Result<Vec<u8>, ActivityError> {
        let info = ctx.get_info();
        let activity = self.registry.get_activity(&info.activity_type).ok_or_else(|| {
            ActivityError::ExecutionFailed(format!(
                "Activity '{}' not registered",
                info.activity_type
            ))
        })?;

        let _slot = Arc::clone(&self.activity_slots)
            .acquire_owned()
            .await
            .map_err(|_| ActivityError::Cancelled)?;

        debug!(
            activity_type = %info.activity_type,
            activity_id = %info.activity_id,
            attempt = info.attempt,
            "executing activity"
        );

        let mut attempt = AbortOnDrop(tokio::spawn(activity.execute(&ctx, input)));
        let joined = match budget {
            None => (&mut attempt.0).await,
            Some(budget) => match tokio::time::timeout(budget, &mut attempt.0).await {
                Ok(joined) => joined,
                Err(_) => return Err(ActivityError::Timeout(timeout_type)),
            },
        };

        joined.map_err(join_error)?
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Timeout for one attempt: start-to-close, or what is left of
/// schedule-to-close when that is shorter.
fn attempt_budget(
    options: &ActivityOptions,
    deadline: Option<Instant>,
) -> (Option<Duration>, TimeoutType) {
    let start_to_close =
        Some(options.start_to_close_timeout).filter(|timeout| !timeout.is_zero());
    let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));

    match (start_to_close, remaining) {
        (Some(own), Some(remaining)) if remaining < own => {
            (Some(remaining), TimeoutType::ScheduleToClose)
        }
        (Some(own), _) => (Some(own), TimeoutType::StartToClose),
        (None, Some(remaining)) => (Some(remaining), TimeoutType::ScheduleToClose),
        (None, None) => (None, TimeoutType::StartToClose),
    }
}

fn should_retry(error: &ActivityError, retry_policy: Option<&RetryPolicy>, attempt: u32) -> bool {
    let Some(policy) = retry_policy else {
        return false;
    };

    // Check max attempts (0 means unlimited)
    if policy.maximum_attempts > 0 && i64::from(attempt) + 1 >= i64::from(policy.maximum_attempts) {
        warn!(
            attempt = attempt + 1,
            max_attempts = policy.maximum_attempts,
            "max attempts reached, not retrying"
        );
        return false;
    }

    if policy
        .non_retryable_error_types
        .iter()
        .any(|name| name == error.type_name())
    {
        debug!(error_type = error.type_name(), "error type listed as non-retryable");
        return false;
    }

    match error {
        ActivityError::NonRetryable(_) => {
            debug!("error is explicitly non-retryable");
            false
        }
        ActivityError::Cancelled => {
            debug!("activity was cancelled, not retrying");
            false
        }
        ActivityError::Timeout(_) => {
            debug!("timeout error, not retrying");
            false
        }
        ActivityError::Retryable(_)
        | ActivityError::ExecutionFailed(_)
        | ActivityError::Panic(_)
        | ActivityError::Application(_) => true,
    }
}

fn join_error(err: JoinError) -> ActivityError {
    if err.is_cancelled() {
        return ActivityError::Cancelled;
    }
    ActivityError::Panic(panic_message(err.into_panic()))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl StepExecutor for LocalExecutor {
    async fn invoke(
        &self,
        activity: &str,
        params: &RunParams,
        options: &ActivityOptions,
    ) -> Result<bool, ActivityError> {
        let input = self.converter.encode(params)?;
        let output = self.execute_activity(activity, Some(input), options).await?;
        Ok(self.converter.decode(&output)?)
    }

    async fn create_session(&self, options: &SessionOptions) -> Result<SessionInfo, SessionError> {
        self.sessions.create(&self.options.task_list, options).await
    }

    async fn complete_session(&self, session: &SessionInfo) {
        if !self.sessions.complete(session) {
            warn!(session_id = %session.session_id, "completed a session that was not open");
        }
    }
}

#[async_trait]
impl Notifier for LocalExecutor {
    async fn notify(
        &self,
        kind: AlertKind,
        identifier: &str,
        options: &ActivityOptions,
    ) -> Result<bool, ActivityError> {
        info!(kind = %kind, identifier, "sending alert");
        let input = self.converter.encode(&identifier)?;
        let output = self
            .execute_activity(kind.activity_name(), Some(input), options)
            .await?;
        Ok(self.converter.decode(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{activity_fn, ActivityRegistry};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor_with(registry: ActivityRegistry) -> LocalExecutor {
        LocalExecutor::new(Arc::new(registry), WorkerOptions::default()).unwrap()
    }

    fn quick_retries(maximum_attempts: i32) -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(10),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_millis(100),
            maximum_attempts,
            non_retryable_error_types: vec![],
        }
    }

    #[test]
    fn test_should_retry_rules() {
        let policy = quick_retries(3);
        assert!(should_retry(&ActivityError::application("x"), Some(&policy), 0));
        assert!(!should_retry(&ActivityError::application("x"), Some(&policy), 2));
        assert!(!should_retry(&ActivityError::application("x"), None, 0));
        assert!(!should_retry(&ActivityError::non_retryable("x"), Some(&policy), 0));
        assert!(!should_retry(
            &ActivityError::Timeout(TimeoutType::StartToClose),
            Some(&policy),
            0
        ));

        let listed = RetryPolicy {
            non_retryable_error_types: vec!["Application".into()],
            ..quick_retries(0)
        };
        assert!(!should_retry(&ActivityError::application("x"), Some(&listed), 0));
        assert!(should_retry(&ActivityError::retryable("x"), Some(&listed), 100));
    }

    #[test]
    fn test_attempt_budget_prefers_shorter_bound() {
        let options = ActivityOptions::with_start_to_close(Duration::from_secs(10));
        assert_eq!(
            attempt_budget(&options, None),
            (Some(Duration::from_secs(10)), TimeoutType::StartToClose)
        );
        assert_eq!(
            attempt_budget(&ActivityOptions::default(), None),
            (None, TimeoutType::StartToClose)
        );
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = ActivityRegistry::new();
        let counter = Arc::clone(&calls);
        registry.register_activity(
            "deps",
            activity_fn(move |ctx, _input| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if ctx.get_info().attempt < 2 {
                        Err(ActivityError::retryable("registry unreachable"))
                    } else {
                        Ok(b"true".to_vec())
                    }
                }
            }),
        );

        let executor = executor_with(registry);
        let options = ActivityOptions::with_start_to_close(Duration::from_secs(5))
            .retry_policy(quick_retries(5));
        let params = RunParams::new("dev", "./test").unwrap();
        assert!(executor.invoke("deps", &params, &options).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unregistered_activity() {
        let executor = executor_with(ActivityRegistry::new());
        let params = RunParams::new("dev", "./test").unwrap();
        let err = executor
            .invoke("run", &params, &ActivityOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityError::ExecutionFailed(msg) if msg.contains("not registered")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_attempt_is_aborted() {
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let registry = ActivityRegistry::new();
        registry.register_activity(
            "run",
            activity_fn(move |_ctx, _input| {
                let flag = Arc::clone(&flag);
                async move {
                    tokio::time::sleep(Duration::from_secs(20)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(b"true".to_vec())
                }
            }),
        );
        let executor = executor_with(registry);
        let params = RunParams::new("dev", "./test").unwrap();

        let options = ActivityOptions::default();
        let invocation = executor.invoke("run", &params, &options);
        assert!(tokio::time::timeout(Duration::from_secs(5), invocation)
            .await
            .is_err());
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let registry = ActivityRegistry::new();
        registry.register_activity(
            "run",
            activity_fn(|_ctx, _input| async {
                if true {
                    panic!("boom");
                }
                Ok(vec![])
            }),
        );
        let executor = executor_with(registry);
        let params = RunParams::new("dev", "./test").unwrap();
        let err = executor
            .invoke("run", &params, &ActivityOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, ActivityError::Panic("boom".into()));
    }
}
