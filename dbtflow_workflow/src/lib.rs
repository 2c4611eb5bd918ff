//! Pipeline coordinator for the dbt refresh workflow.
//!
//! [`PipelineWorkflow`] runs the fixed step sequence against a
//! [`StepExecutor`], alerts once on the outcome and guarantees the `clean`
//! step runs exactly once per run. The durable runtime that actually
//! schedules, retries and persists activities stays behind the executor
//! trait.

pub mod config;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod pipeline;
pub mod state_machine;

pub use config::*;
pub use error::*;
pub use executor::*;
pub use outcome::*;
pub use pipeline::*;
pub use state_machine::*;
