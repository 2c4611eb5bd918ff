//! # dbtflow - durable dbt refresh pipeline
//!
//! This is a meta-crate that re-exports all dbtflow crates for convenient access.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dbtflow::core::RunParams;
//! use dbtflow::worker::{activities, ActivityRegistry, LocalExecutor, WorkerOptions};
//! use dbtflow::workflow::{PipelineConfig, PipelineWorkflow};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ActivityRegistry::new();
//! activities::register_dbt_activities(&registry, Default::default());
//! activities::register_log_alerts(&registry);
//!
//! let executor = Arc::new(LocalExecutor::new(Arc::new(registry), WorkerOptions::default())?);
//! let workflow = PipelineWorkflow::new(executor.clone(), executor, PipelineConfig::default());
//! let outcome = workflow.run(RunParams::new("dev", "./analytics")?).await;
//! println!("success: {}", outcome.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Re-exported Crates
//!
//! - [`core`] - Run parameters, steps, options and errors
//! - [`activity`] - Activity context
//! - [`workflow`] - Pipeline coordinator
//! - [`worker`] - Local executor and dbt activities
//! - [`testsuite`] - Testing utilities

pub use dbtflow_activity as activity;
pub use dbtflow_core as core;
pub use dbtflow_testsuite as testsuite;
pub use dbtflow_worker as worker;
pub use dbtflow_workflow as workflow;
pub use serde_json;
