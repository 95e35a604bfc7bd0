//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{CpiConfig, PipelineBlueprint};
use ingestion::DropPolicy;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::{ensure_config_exists, CliError};
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    ensure_config_exists(&args.config)?;

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args)?;

    info!(
        algorithm = %blueprint.algorithm.name,
        channels = blueprint.engine.channel_count(),
        sources = blueprint.sources.len(),
        cpi_span = ?blueprint.engine.cpi_span(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    if blueprint.sources.is_empty() {
        return Err(CliError::pipeline_execution("no sources configured").into());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        max_outputs: (args.max_outputs > 0).then_some(args.max_outputs),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        queue_capacity: args.queue_capacity,
        drop_policy: if args.block_on_full {
            DropPolicy::Block
        } else {
            DropPolicy::DropNewest
        },
        status_interval: (args.status_interval_ms > 0)
            .then(|| Duration::from_millis(args.status_interval_ms)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    let pipeline = Pipeline::new(pipeline_config);
    let shutdown_signal = setup_shutdown_signal();

    info!("Starting pipeline...");

    tokio::select! {
        result = pipeline.run() => {
            match result {
                Ok(stats) => {
                    info!(
                        outputs = stats.outputs,
                        messages = stats.messages_received,
                        duration_secs = stats.duration.as_secs_f64(),
                        rate = format!("{:.2}", stats.output_rate()),
                        "Pipeline completed successfully"
                    );
                    stats.print_summary();
                }
                Err(e) => {
                    return Err(e).context("Pipeline execution failed");
                }
            }
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping pipeline...");
        }
    }

    info!("SideCar sync finished");
    Ok(())
}

/// Apply command-line overrides on top of the loaded blueprint
fn apply_overrides(blueprint: &mut PipelineBlueprint, args: &RunArgs) -> Result<(), CliError> {
    if let Some(size) = args.max_buffer_size {
        if size == 0 {
            return Err(CliError::invalid_override("max-buffer-size", "must be > 0"));
        }
        info!(max_buffer_size = size, "Overriding buffer size from CLI");
        blueprint.engine.max_buffer_size = size;
    }

    if let Some(cpi_span) = args.cpi_span {
        if cpi_span == 0 {
            return Err(CliError::invalid_override("cpi-span", "must be > 0"));
        }
        info!(cpi_span, "Overriding CPI span from CLI");
        let drop_incomplete_cpi = blueprint
            .engine
            .cpi
            .as_ref()
            .is_some_and(|cpi| cpi.drop_incomplete_cpi);
        blueprint.engine.cpi = Some(CpiConfig {
            cpi_span,
            drop_incomplete_cpi,
        });
    }

    if args.disabled {
        info!("Starting with the algorithm disabled");
        blueprint.engine.enabled = false;
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &PipelineBlueprint) {
    let engine = &blueprint.engine;

    println!("\n=== Configuration Summary ===\n");
    println!("Algorithm: {}", blueprint.algorithm.name);
    println!("  Enabled: {}", engine.enabled);
    println!("  Max buffer size: {}", engine.max_buffer_size);
    match &engine.cpi {
        Some(cpi) => println!(
            "  CPI span: {} (drop incomplete: {})",
            cpi.cpi_span, cpi.drop_incomplete_cpi
        ),
        None => println!("  CPI span: none (aligned mode)"),
    }

    println!("\nChannels ({}):", engine.channels.len());
    for (index, channel) in engine.channels.iter().enumerate() {
        println!(
            "  - C{} {} ({:?}, max {}){}",
            index,
            channel.name,
            channel.message_type,
            engine.channel_max_size(index),
            if channel.enabled { "" } else { " [disabled]" }
        );
    }

    if !blueprint.sources.is_empty() {
        println!("\nSources ({}):", blueprint.sources.len());
        for source in &blueprint.sources {
            println!(
                "  - {} @ {} Hz, {} PRIs/CPI",
                source.channel, source.prf_hz, source.pulses_per_cpi
            );
        }
    }

    println!();
}
