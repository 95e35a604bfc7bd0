//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::PipelineBlueprint;
use serde::Serialize;
use sync_engine::ChannelBuffer;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::ensure_config_exists;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    algorithm: String,
    engine: EngineInfo,
    channels: Vec<ChannelInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<SourceInfo>,
}

#[derive(Serialize)]
struct EngineInfo {
    enabled: bool,
    max_buffer_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpi_span: Option<usize>,
    drop_incomplete_cpi: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    wrap_threshold: Option<u32>,
}

#[derive(Serialize)]
struct ChannelInfo {
    index: usize,
    name: String,
    message_type: String,
    enabled: bool,
    enable_parameter: String,
    max_buffer_size: usize,
}

#[derive(Serialize)]
struct SourceInfo {
    channel: String,
    prf_hz: f64,
    start_sequence: u32,
    pulses_per_cpi: usize,
    waveform_codes: Vec<u32>,
    drop_probability: f64,
    samples: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    ensure_config_exists(&args.config)?;

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &PipelineBlueprint, args: &InfoArgs) -> ConfigInfo {
    let engine = &blueprint.engine;

    let channels = engine
        .channels
        .iter()
        .enumerate()
        .map(|(index, c)| ChannelInfo {
            index,
            name: c.name.clone(),
            message_type: format!("{:?}", c.message_type),
            enabled: c.enabled,
            enable_parameter: ChannelBuffer::generic_short_name(index),
            max_buffer_size: engine.channel_max_size(index),
        })
        .collect();

    let sources = if args.sources {
        blueprint
            .sources
            .iter()
            .map(|s| SourceInfo {
                channel: s.channel.clone(),
                prf_hz: s.prf_hz,
                start_sequence: s.start_sequence,
                pulses_per_cpi: s.pulses_per_cpi,
                waveform_codes: s.waveform_codes.clone(),
                drop_probability: s.drop_probability,
                samples: s.samples,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        algorithm: blueprint.algorithm.name.clone(),
        engine: EngineInfo {
            enabled: engine.enabled,
            max_buffer_size: engine.max_buffer_size,
            cpi_span: engine.cpi_span(),
            drop_incomplete_cpi: engine.cpi.as_ref().is_some_and(|c| c.drop_incomplete_cpi),
            wrap_threshold: engine.wrap_threshold,
        },
        channels,
        sources,
    }
}

fn print_config_info(blueprint: &PipelineBlueprint, args: &InfoArgs) {
    let engine = &blueprint.engine;

    println!("=== SideCar Sync Configuration ===\n");

    println!("Algorithm");
    println!("   |- Version: {:?}", blueprint.version);
    println!("   |- Name: {}", blueprint.algorithm.name);
    println!("   `- Enabled: {}", engine.enabled);

    println!("\nEngine");
    println!("   |- Default buffer size: {}", engine.max_buffer_size);
    match &engine.cpi {
        Some(cpi) => {
            println!("   |- CPI span: {}", cpi.cpi_span);
            println!("   |- Drop incomplete CPI: {}", cpi.drop_incomplete_cpi);
        }
        None => println!("   |- Mode: aligned (no CPI span)"),
    }
    match engine.wrap_threshold {
        Some(threshold) => println!("   `- Wrap threshold: {}", threshold),
        None => println!("   `- Wrap threshold: (default)"),
    }

    println!("\nChannels ({})", engine.channels.len());
    for (index, channel) in engine.channels.iter().enumerate() {
        let prefix = if index + 1 == engine.channels.len() {
            "`-"
        } else {
            "|-"
        };
        println!(
            "   {} C{} {} ({:?}, max {}) {} = {}",
            prefix,
            index,
            channel.name,
            channel.message_type,
            engine.channel_max_size(index),
            ChannelBuffer::generic_long_name(index),
            channel.enabled
        );
    }

    if args.sources && !blueprint.sources.is_empty() {
        println!("\nSources ({})", blueprint.sources.len());
        for (i, source) in blueprint.sources.iter().enumerate() {
            let prefix = if i + 1 == blueprint.sources.len() {
                "`-"
            } else {
                "|-"
            };
            println!(
                "   {} {} @ {} Hz, {} PRIs per code {:?}, loss {:.1}%, {} samples",
                prefix,
                source.channel,
                source.prf_hz,
                source.pulses_per_cpi,
                source.waveform_codes,
                source.drop_probability * 100.0,
                source.samples
            );
        }
    } else {
        println!("\n{} sources", blueprint.sources.len());
    }

    println!();
}
