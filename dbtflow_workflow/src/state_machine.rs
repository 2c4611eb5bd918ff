//! Lifecycle of a single pipeline run.

use dbtflow_core::{AlertKind, Step};
use serde::Serialize;
use tracing::error;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Success,
    Failure,
}

/// States a run moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Initializing,
    /// Executing the step at this index of [`Step::SEQUENCE`]
    RunningStep(usize),
    Alerting(AlertKind),
    CleaningUp,
    Terminated(Termination),
}

impl PipelineState {
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;

        let last = Step::SEQUENCE.len() - 1;
        match (self, next) {
            (Initializing, RunningStep(0)) => true,
            (Initializing, CleaningUp) => true,
            (RunningStep(i), RunningStep(j)) => *j == i + 1 && *j <= last,
            (RunningStep(_), Alerting(AlertKind::Error)) => true,
            (RunningStep(i), Alerting(AlertKind::Success)) => *i == last,
            (Alerting(_), CleaningUp) => true,
            (CleaningUp, Terminated(_)) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Terminated(_))
    }
}

/// Records the states visited by a run
#[derive(Debug, Clone)]
pub struct PipelineStateMachine {
    history: Vec<PipelineState>,
}

impl Default for PipelineStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStateMachine {
    pub fn new() -> Self {
        Self {
            history: vec![PipelineState::Initializing],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineState::Initializing)
    }

    pub fn transition_to(&mut self, next: PipelineState) {
        let current = self.state();
        if !current.can_transition_to(&next) {
            error!(?current, ?next, "invalid pipeline state transition");
            debug_assert!(false, "invalid transition {:?} -> {:?}", current, next);
        }
        self.history.push(next);
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn into_history(self) -> Vec<PipelineState> {
        self.history
    }
}
