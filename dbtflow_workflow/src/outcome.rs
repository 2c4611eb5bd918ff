//! Result of a pipeline run.

use crate::error::{PipelineError, StepFailure};
use crate::state_machine::PipelineState;
use dbtflow_core::{RunParams, SessionInfo, Step};
use serde::Serialize;
use std::time::Duration;

/// Execution of one sequence step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub identifier: String,
    pub succeeded: bool,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl StepRecord {
    pub(crate) fn new(
        step: Step,
        identifier: String,
        elapsed: Duration,
        failure: Option<&StepFailure>,
    ) -> Self {
        Self {
            step,
            identifier,
            succeeded: failure.is_none(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            error: failure.map(ToString::to_string),
        }
    }
}

/// Delivery of a best-effort invocation (alert or cleanup)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryRecord {
    /// Activity that was invoked
    pub activity: String,
    pub identifier: String,
    pub delivered: bool,
    pub error: Option<String>,
}

impl DeliveryRecord {
    pub(crate) fn new(
        activity: impl Into<String>,
        identifier: String,
        result: Result<(), StepFailure>,
    ) -> Self {
        Self {
            activity: activity.into(),
            identifier,
            delivered: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        }
    }
}

/// What happened during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub params: RunParams,
    pub session: Option<SessionInfo>,
    pub states: Vec<PipelineState>,
    pub steps: Vec<StepRecord>,
    pub alert: Option<DeliveryRecord>,
    pub cleanup: Option<DeliveryRecord>,
}

impl RunReport {
    pub(crate) fn new(params: RunParams) -> Self {
        Self {
            params,
            session: None,
            states: Vec::new(),
            steps: Vec::new(),
            alert: None,
            cleanup: None,
        }
    }
}

/// Outcome of [`crate::PipelineWorkflow::run`]
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub error: Option<PipelineError>,
    pub report: RunReport,
}

impl ExecutionOutcome {
    pub(crate) fn succeeded(report: RunReport) -> Self {
        Self {
            success: true,
            error: None,
            report,
        }
    }

    pub(crate) fn failed(error: PipelineError, report: RunReport) -> Self {
        Self {
            success: false,
            error: Some(error),
            report,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// `Ok(true)` on success, the pipeline error otherwise.
    pub fn into_result(self) -> Result<bool, PipelineError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.success),
        }
    }
}
