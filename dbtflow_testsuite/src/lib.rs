//! Testing utilities for the dbtflow pipeline.
//!
//! This crate provides a scripted executor and a recording notifier so the
//! coordinator can be tested without dbt or a worker.

pub mod suite;

pub use suite::*;

// Re-export for convenience
pub use dbtflow_workflow::{ExecutionOutcome, PipelineConfig, PipelineError};
