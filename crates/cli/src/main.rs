//! # SideCar Sync CLI
//!
//! Runs mock PRI sources through the channel sync engine, and validates or
//! describes pipeline configuration files.

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_pipeline, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Metrics are installed by `run` only, once the port is known
    observability::init_with_config(
        ObservabilityConfig::from_verbosity(cli.verbose, cli.quiet)
            .with_log_format(cli.log_format.clone().into()),
    )?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "SideCar sync CLI starting"
    );

    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
