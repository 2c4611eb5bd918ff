//! Worker wiring for a single local run.
//!
//! The pipeline executes in-process: every dbt command and both alerts are
//! activities of a [`LocalExecutor`] built here.

use std::sync::Arc;

use anyhow::Result;
use dbtflow::core::{RunParams, SessionOptions};
use dbtflow::worker::activities::{register_dbt_activities, register_log_alerts, DbtSettings};
use dbtflow::worker::{ActivityRegistry, LocalExecutor, WorkerOptions};
use dbtflow::workflow::{ExecutionOutcome, PipelineWorkflow};
use tracing::info;

use crate::cli::RunArgs;
use crate::config;

/// Registry with every dbt step and the log alerts.
pub fn build_registry(settings: DbtSettings) -> ActivityRegistry {
    let registry = ActivityRegistry::new();
    register_dbt_activities(&registry, settings);
    register_log_alerts(&registry);
    registry
}

/// Run the pipeline once with the given arguments.
pub async fn run_pipeline(args: &RunArgs) -> Result<ExecutionOutcome> {
    let mut params = RunParams::new(&args.env, &args.project_dir)?;
    if let Some(profiles_dir) = &args.profiles_dir {
        params = params.with_profile_location(profiles_dir);
    }

    let mut pipeline = config::get_pipeline_profile(&args.profile).with_task_list(&args.task_list);
    if args.session && pipeline.session.is_none() {
        pipeline = pipeline.with_session(SessionOptions::default());
    }

    let registry = build_registry(DbtSettings {
        dbt_bin: args.dbt_bin.clone(),
        prevent_writes: args.prevent_writes,
        artifact_sink: None,
    });
    let worker_options = WorkerOptions {
        task_list: args.task_list.clone(),
        enable_session_worker: pipeline.session.is_some(),
        ..Default::default()
    };

    info!(
        env = %params.env,
        project = %params.project_location,
        profile = %args.profile,
        task_list = %args.task_list,
        session = pipeline.session.is_some(),
        identity = %worker_options.identity,
        "starting local worker"
    );

    let executor = Arc::new(LocalExecutor::new(Arc::new(registry), worker_options)?);
    let workflow = PipelineWorkflow::new(executor.clone(), executor, pipeline);
    Ok(workflow.run(params).await)
}
