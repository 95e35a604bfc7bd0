//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::PipelineBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    algorithm: String,
    channel_count: usize,
    enabled_channel_count: usize,
    source_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpi_span: Option<usize>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    algorithm: blueprint.algorithm.name.clone(),
                    channel_count: blueprint.engine.channels.len(),
                    enabled_channel_count: blueprint
                        .engine
                        .channels
                        .iter()
                        .filter(|c| c.enabled)
                        .count(),
                    source_count: blueprint.sources.len(),
                    cpi_span: blueprint.engine.cpi_span(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &PipelineBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let engine = &blueprint.engine;

    if blueprint.sources.is_empty() {
        warnings.push("No sources configured - `run` has nothing to feed the engine".to_string());
    }

    if !engine.channels.iter().any(|c| c.enabled) {
        warnings.push("No channel is enabled - the engine never aligns".to_string());
    }

    for channel in &engine.channels {
        if !blueprint.sources.iter().any(|s| s.channel == channel.name) {
            warnings.push(format!("Channel '{}' has no source", channel.name));
        }
    }

    if let Some(span) = engine.cpi_span() {
        for (index, channel) in engine.channels.iter().enumerate() {
            if engine.channel_max_size(index) < span {
                warnings.push(format!(
                    "Channel '{}' buffer ({}) is smaller than the CPI span ({}) - no CPI can complete",
                    channel.name,
                    engine.channel_max_size(index),
                    span
                ));
            }
        }

        for source in &blueprint.sources {
            if source.pulses_per_cpi != span {
                warnings.push(format!(
                    "Source '{}' emits {} PRIs per code but the CPI span is {}",
                    source.channel, source.pulses_per_cpi, span
                ));
            }
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("OK  Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Algorithm: {}", summary.algorithm);
            println!(
                "  Channels: {} ({} enabled)",
                summary.channel_count, summary.enabled_channel_count
            );
            println!("  Sources: {}", summary.source_count);
            if let Some(span) = summary.cpi_span {
                println!("  CPI span: {}", span);
            }
        }

        if let Some(ref warnings) = result.warnings {
            println!("\nWarnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("ERR Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
