use clap::{Args, Parser, Subcommand};
use dbtflow::workflow::DEFAULT_TASK_LIST;
use std::path::PathBuf;

/// dbt refresh pipeline runner
#[derive(Parser, Debug)]
#[command(name = "dbtflow")]
#[command(about = "Run the dbt refresh pipeline with guaranteed cleanup and alerting")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the pipeline once against a dbt project
    Run(RunArgs),

    /// Print the step sequence
    Steps,

    /// List the activities registered by the worker
    Activities,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// dbt target to run against
    #[arg(long, env = "DBTFLOW_ENV")]
    pub env: String,

    /// Path of the dbt project
    #[arg(long, env = "DBTFLOW_PROJECT_DIR")]
    pub project_dir: String,

    /// Directory holding profiles.yml
    #[arg(long, env = "DBTFLOW_PROFILES_DIR")]
    pub profiles_dir: Option<String>,

    /// Pipeline profile: default, dev, ci
    #[arg(long, default_value = "default", env = "DBTFLOW_PROFILE")]
    pub profile: String,

    /// Pin every step of the run to one worker session
    #[arg(long)]
    pub session: bool,

    /// dbt executable
    #[arg(long, default_value = "dbt", env = "DBTFLOW_DBT_BIN")]
    pub dbt_bin: PathBuf,

    /// Task list name
    #[arg(long, default_value = DEFAULT_TASK_LIST, env = "DBTFLOW_TASK_LIST")]
    pub task_list: String,

    /// Keep dbt from writing its target directory into the project
    #[arg(long)]
    pub prevent_writes: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}
