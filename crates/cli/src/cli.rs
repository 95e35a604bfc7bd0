//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// SideCar Sync - PRI stream synchronization for hosted radar algorithms
#[derive(Parser, Debug)]
#[command(
    name = "sidecar-sync",
    author,
    version,
    about = "Multi-channel PRI synchronization engine",
    long_about = "Aligns sequence-numbered PRI streams from several input channels.\n\n\
                  Feeds mock PRI sources through the sync engine, aligning channels by \n\
                  sequence counter or assembling complete CPIs, and reports buffer status."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SIDECAR_SYNC_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SIDECAR_SYNC_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run mock sources through the sync engine
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "sidecar.toml",
        env = "SIDECAR_SYNC_CONFIG"
    )]
    pub config: PathBuf,

    /// Stop after this many outputs (aligned PRIs or CPIs, 0 = unlimited)
    #[arg(long, default_value = "0", env = "SIDECAR_SYNC_MAX_OUTPUTS")]
    pub max_outputs: u64,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "SIDECAR_SYNC_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Delivery queue capacity between sources and the engine
    #[arg(long, default_value = "1024", env = "SIDECAR_SYNC_QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    /// Block sources when the delivery queue is full instead of dropping
    #[arg(long, env = "SIDECAR_SYNC_BLOCK_ON_FULL")]
    pub block_on_full: bool,

    /// Override the engine's default per-channel buffer size
    #[arg(long, env = "SIDECAR_SYNC_MAX_BUFFER_SIZE")]
    pub max_buffer_size: Option<usize>,

    /// Override the CPI span (switches the engine to CPI assembly)
    #[arg(long, env = "SIDECAR_SYNC_CPI_SPAN")]
    pub cpi_span: Option<usize>,

    /// Start with the algorithm disabled (first enabled channel passes through)
    #[arg(long)]
    pub disabled: bool,

    /// Status report interval in milliseconds (0 = disabled)
    #[arg(long, default_value = "1000", env = "SIDECAR_SYNC_STATUS_INTERVAL_MS")]
    pub status_interval_ms: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "SIDECAR_SYNC_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "sidecar.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "sidecar.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show source configuration
    #[arg(long)]
    pub sources: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "sidecar-sync",
            "run",
            "--config",
            "radar.toml",
            "--cpi-span",
            "32",
            "--max-outputs",
            "10",
            "--disabled",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.config, PathBuf::from("radar.toml"));
        assert_eq!(args.cpi_span, Some(32));
        assert_eq!(args.max_outputs, 10);
        assert!(args.disabled);
        assert!(!args.block_on_full);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["sidecar-sync", "-q", "-v", "validate"]);
        assert!(result.is_err());
    }
}
