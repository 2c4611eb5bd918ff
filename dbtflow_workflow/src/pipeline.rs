//! The pipeline coordinator.
//!
//! A run executes [`Step::SEQUENCE`] in order, stopping at the first step
//! that errors, times out or reports `false`. Exactly one alert follows the
//! decision and the `clean` step runs once on every exit path, including a
//! run whose future is dropped before completion.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, StepFailure};
use crate::executor::{Notifier, StepExecutor};
use crate::outcome::{DeliveryRecord, ExecutionOutcome, RunReport, StepRecord};
use crate::state_machine::{PipelineState, PipelineStateMachine, Termination};
use dbtflow_core::{ActivityError, ActivityOptions, AlertKind, RunParams, SessionInfo, Step};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Coordinates the dbt refresh sequence for one run at a time.
///
/// Cheap to clone; concurrent runs share the executor and notifier.
#[derive(Clone)]
pub struct PipelineWorkflow {
    executor: Arc<dyn StepExecutor>,
    notifier: Arc<dyn Notifier>,
    config: Arc<PipelineConfig>,
}

/// Session a run is scoped to, with the instant it expires
struct RunScope {
    session: Option<SessionInfo>,
    deadline: Option<Instant>,
}

impl RunScope {
    fn unscoped() -> Self {
        Self {
            session: None,
            deadline: None,
        }
    }

    /// Budget for an invocation, clamped to what is left of the session.
    fn budget(&self, options: &ActivityOptions) -> Option<Duration> {
        let remaining = self
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        match (options.deadline(), remaining) {
            (Some(own), Some(remaining)) => Some(own.min(remaining)),
            (own, remaining) => own.or(remaining),
        }
    }
}

impl PipelineWorkflow {
    pub fn new(
        executor: Arc<dyn StepExecutor>,
        notifier: Arc<dyn Notifier>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            executor,
            notifier,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one run of the pipeline.
    pub async fn run(&self, params: RunParams) -> ExecutionOutcome {
        let mut report = RunReport::new(params.clone());
        if let Err(err) = params.validate() {
            return ExecutionOutcome::failed(PipelineError::InvalidParams(err.to_string()), report);
        }

        let params = Arc::new(params);
        let mut machine = PipelineStateMachine::new();
        let mut finalizer = Finalizer::new(
            Arc::clone(&self.executor),
            Arc::clone(&params),
            self.config.cleanup_options.clone(),
        );

        info!(
            env = %params.env,
            project = %params.project_location,
            "starting pipeline run"
        );

        let scope = match &self.config.session {
            None => RunScope::unscoped(),
            Some(options) => match self.executor.create_session(options).await {
                Ok(session) => {
                    info!(
                        session_id = %session.session_id,
                        task_list = %session.task_list,
                        "session created"
                    );
                    finalizer.attach_session(session.clone());
                    RunScope {
                        session: Some(session),
                        deadline: Instant::now().checked_add(options.execution_timeout),
                    }
                }
                Err(err) => {
                    error!(error = %err, "failed to create session");
                    machine.transition_to(PipelineState::CleaningUp);
                    report.cleanup = Some(finalizer.finish().await);
                    machine.transition_to(PipelineState::Terminated(Termination::Failure));
                    report.states = machine.into_history();
                    return ExecutionOutcome::failed(PipelineError::ScopeSetup { source: err }, report);
                }
            },
        };
        report.session = scope.session.clone();

        let failed = self
            .run_sequence(&params, &scope, &mut machine, &mut report)
            .await;

        let outcome = match failed {
            None => {
                machine.transition_to(PipelineState::Alerting(AlertKind::Success));
                let identifier = params.completion_identifier();
                info!(identifier = %identifier, "all steps succeeded");
                report.alert = Some(self.alert(AlertKind::Success, identifier, &scope).await);
                None
            }
            Some((step, failure)) => {
                machine.transition_to(PipelineState::Alerting(AlertKind::Error));
                let identifier = params.step_identifier(step.name());
                error!(identifier = %identifier, error = %failure, "workflow failed at step");
                report.alert = Some(
                    self.alert(AlertKind::Error, identifier.clone(), &scope)
                        .await,
                );
                Some(PipelineError::StepExecution {
                    identifier,
                    step,
                    params: (*params).clone(),
                    source: failure,
                })
            }
        };

        machine.transition_to(PipelineState::CleaningUp);
        report.cleanup = Some(finalizer.finish().await);

        match outcome {
            None => {
                machine.transition_to(PipelineState::Terminated(Termination::Success));
                report.states = machine.into_history();
                ExecutionOutcome::succeeded(report)
            }
            Some(err) => {
                machine.transition_to(PipelineState::Terminated(Termination::Failure));
                report.states = machine.into_history();
                ExecutionOutcome::failed(err, report)
            }
        }
    }

    /// Run the sequence, returning the first failed step.
    async fn run_sequence(
        &self,
        params: &RunParams,
        scope: &RunScope,
        machine: &mut PipelineStateMachine,
        report: &mut RunReport,
    ) -> Option<(Step, StepFailure)> {
        let options = scoped_options(&self.config.step_options, scope.session.as_ref());

        for (index, step) in Step::SEQUENCE.into_iter().enumerate() {
            machine.transition_to(PipelineState::RunningStep(index));
            let identifier = params.step_identifier(step.name());
            debug!(identifier = %identifier, "starting step");

            let started = Instant::now();
            let result = with_budget(
                scope.budget(&options),
                self.executor.invoke(step.name(), params, &options),
            )
            .await;

            let failure = match result {
                Ok(true) => {
                    info!(step = %step, "worker at step {} returned {}", step, true);
                    None
                }
                Ok(false) => {
                    info!(step = %step, "worker at step {} returned {}", step, false);
                    Some(StepFailure::Rejected)
                }
                Err(failure) => Some(failure),
            };

            report.steps.push(StepRecord::new(
                step,
                identifier,
                started.elapsed(),
                failure.as_ref(),
            ));
            if let Some(failure) = failure {
                return Some((step, failure));
            }
        }

        None
    }

    /// Send the run's single alert inside the run's scope. Failures are
    /// logged and recorded only.
    async fn alert(
        &self,
        kind: AlertKind,
        identifier: String,
        scope: &RunScope,
    ) -> DeliveryRecord {
        let options = scoped_options(self.config.alert_options(kind), scope.session.as_ref());
        let result = with_budget(
            scope.budget(&options),
            self.notifier.notify(kind, &identifier, &options),
        )
        .await
        .and_then(accepted);

        if let Err(failure) = &result {
            warn!(
                kind = %kind,
                identifier = %identifier,
                error = %failure,
                "alert delivery failed"
            );
        }
        DeliveryRecord::new(kind.activity_name(), identifier, result)
    }
}

fn accepted(value: bool) -> Result<(), StepFailure> {
    if value {
        Ok(())
    } else {
        Err(StepFailure::Rejected)
    }
}

/// Route an invocation to the session's task list when one is open.
fn scoped_options(options: &ActivityOptions, session: Option<&SessionInfo>) -> ActivityOptions {
    let mut options = options.clone();
    if let Some(session) = session {
        options.task_list = session.task_list.clone();
    }
    options
}

async fn with_budget<F>(budget: Option<Duration>, invocation: F) -> Result<bool, StepFailure>
where
    F: Future<Output = Result<bool, ActivityError>>,
{
    match budget {
        None => invocation.await.map_err(StepFailure::from),
        Some(budget) => match tokio::time::timeout(budget, invocation).await {
            Ok(result) => result.map_err(StepFailure::from),
            Err(_) => Err(StepFailure::TimedOut(budget)),
        },
    }
}

/// Runs `clean` and releases the session exactly once.
///
/// [`Finalizer::finish`] is the normal path. If the run is dropped while the
/// guard is still armed, the same work is spawned on the current runtime.
struct Finalizer {
    executor: Arc<dyn StepExecutor>,
    params: Arc<RunParams>,
    options: ActivityOptions,
    session: Option<SessionInfo>,
    armed: bool,
}

impl Finalizer {
    fn new(executor: Arc<dyn StepExecutor>, params: Arc<RunParams>, options: ActivityOptions) -> Self {
        Self {
            executor,
            params,
            options,
            session: None,
            armed: true,
        }
    }

    fn attach_session(&mut self, session: SessionInfo) {
        self.session = Some(session);
    }

    /// Run cleanup and release the session on a task of their own, so a
    /// run dropped while awaiting this still finishes both.
    async fn finish(mut self) -> DeliveryRecord {
        self.armed = false;
        let identifier = self.params.step_identifier(Step::CLEANUP.name());
        let work = tokio::spawn(finalize(
            Arc::clone(&self.executor),
            Arc::clone(&self.params),
            self.options.clone(),
            self.session.take(),
        ));

        match work.await {
            Ok(record) => record,
            Err(err) => {
                error!(identifier = %identifier, error = %err, "cleanup task failed");
                let failure = if err.is_panic() {
                    ActivityError::Panic(err.to_string())
                } else {
                    ActivityError::Cancelled
                };
                DeliveryRecord::new(Step::CLEANUP.name(), identifier, Err(failure.into()))
            }
        }
    }
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        let work = finalize(
            Arc::clone(&self.executor),
            Arc::clone(&self.params),
            self.options.clone(),
            self.session.take(),
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    env = %self.params.env,
                    project = %self.params.project_location,
                    "pipeline run interrupted, cleaning up in background"
                );
                handle.spawn(work);
            }
            Err(_) => error!(
                env = %self.params.env,
                project = %self.params.project_location,
                "pipeline run interrupted outside a runtime, cleanup skipped"
            ),
        }
    }
}

async fn finalize(
    executor: Arc<dyn StepExecutor>,
    params: Arc<RunParams>,
    options: ActivityOptions,
    session: Option<SessionInfo>,
) -> DeliveryRecord {
    let step = Step::CLEANUP;
    let options = scoped_options(&options, session.as_ref());
    let identifier = params.step_identifier(step.name());

    let result = with_budget(
        options.deadline(),
        executor.invoke(step.name(), &params, &options),
    )
    .await
    .and_then(accepted);

    match &result {
        Ok(()) => debug!(identifier = %identifier, "cleanup finished"),
        Err(failure) => warn!(identifier = %identifier, error = %failure, "cleanup failed"),
    }

    if let Some(session) = session {
        executor.complete_session(&session).await;
        info!(session_id = %session.session_id, "session completed");
    }

    DeliveryRecord::new(step.name(), identifier, result)
}
