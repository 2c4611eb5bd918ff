use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use dbtflow::core::Step;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod report;
mod worker;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays parseable
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Run(args) => {
            let outcome = worker::run_pipeline(&args).await?;
            report::print_report(&outcome, args.json)?;

            if outcome.is_success() {
                tracing::info!("pipeline completed");
                return Ok(ExitCode::SUCCESS);
            }
            tracing::error!("pipeline failed");
            Ok(ExitCode::FAILURE)
        }

        Command::Steps => {
            for (index, step) in Step::SEQUENCE.iter().enumerate() {
                println!("{}. {}", index + 1, step);
            }
            println!("cleanup: {}", Step::CLEANUP);
            Ok(ExitCode::SUCCESS)
        }

        Command::Activities => {
            use dbtflow::worker::Registry;

            let registry = worker::build_registry(Default::default());
            for info in registry.get_registered_activities() {
                println!("{}", info.name);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
