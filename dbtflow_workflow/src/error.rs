//! Error types for the pipeline coordinator.

use dbtflow_core::{ActivityError, RunParams, SessionError, Step};
use std::time::Duration;
use thiserror::Error;

/// Why a single step invocation did not succeed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Executor(#[from] ActivityError),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("step reported failure")]
    Rejected,
}

/// Failure outcome of a pipeline run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("invalid run parameters: {0}")]
    InvalidParams(String),

    #[error("failed to establish execution session: {source}")]
    ScopeSetup {
        #[source]
        source: SessionError,
    },

    #[error("workflow failed at step {identifier}: {source}")]
    StepExecution {
        identifier: String,
        step: Step,
        params: RunParams,
        #[source]
        source: StepFailure,
    },
}

impl PipelineError {
    /// `env--project--step` of the failed step, if a step failed.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            PipelineError::StepExecution { identifier, .. } => Some(identifier),
            _ => None,
        }
    }

    pub fn step(&self) -> Option<Step> {
        match self {
            PipelineError::StepExecution { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn is_scope_setup(&self) -> bool {
        matches!(self, PipelineError::ScopeSetup { .. })
    }
}
