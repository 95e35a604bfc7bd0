//! Pipeline orchestrator - coordinates all components.
//!
//! Mock PRI sources feed one delivery queue; every delivered message goes
//! through the sync engine. Engines with a CPI span assemble complete CPIs,
//! all others align channels message by message.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{PipelineBlueprint, PriRef, SyncStatus};
use ingestion::{
    BackpressureConfig, ChannelMessage, CpiBatcher, DropPolicy, IngestionPipeline,
    PassThroughSummer,
};
use observability::{
    record_output, record_processing_latency_ms, StatusReporter, SyncMetricsAggregator,
};
use sync_engine::{ChannelSet, CpiAssembler, SyncController, SyncError};
use tracing::{debug, info, warn};

use super::PipelineStats;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The pipeline blueprint
    pub blueprint: PipelineBlueprint,

    /// Maximum number of outputs to produce (None = unlimited)
    pub max_outputs: Option<u64>,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Delivery queue capacity
    pub queue_capacity: usize,

    /// Queue-full behaviour of the sources
    pub drop_policy: DropPolicy,

    /// Status report interval (None = disabled)
    pub status_interval: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// How the engine consumes aligned channels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineMode {
    /// One output per aligned sequence counter
    #[default]
    Aligned,
    /// One output per complete CPI
    Cpi,
}

impl EngineMode {
    fn as_str(self) -> &'static str {
        match self {
            EngineMode::Aligned => "aligned",
            EngineMode::Cpi => "cpi",
        }
    }
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The engine variant selected by the blueprint
enum Engine {
    Aligned(SyncController<PassThroughSummer>),
    Cpi(CpiAssembler<CpiBatcher>),
}

impl Engine {
    fn from_blueprint(blueprint: &PipelineBlueprint) -> Self {
        let channels = Arc::new(ChannelSet::from_config(&blueprint.engine));
        if blueprint.engine.cpi_span().is_some() {
            Engine::Cpi(CpiAssembler::with_channels(channels, CpiBatcher::new()))
        } else {
            Engine::Aligned(SyncController::with_channels(channels, PassThroughSummer::new()))
        }
    }

    fn mode(&self) -> EngineMode {
        match self {
            Engine::Aligned(_) => EngineMode::Aligned,
            Engine::Cpi(_) => EngineMode::Cpi,
        }
    }

    fn add_data(&mut self, channel_index: usize, msg: PriRef) -> sync_engine::Result<()> {
        match self {
            Engine::Aligned(controller) => controller.add_data(channel_index, msg),
            Engine::Cpi(assembler) => assembler.add_data(channel_index, msg),
        }
    }

    fn channels(&self) -> &Arc<ChannelSet> {
        match self {
            Engine::Aligned(controller) => controller.channels(),
            Engine::Cpi(assembler) => assembler.channels(),
        }
    }

    /// Outputs the consumer has accepted so far
    fn outputs(&self) -> u64 {
        match self {
            Engine::Aligned(controller) => controller.consumer().emitted(),
            Engine::Cpi(assembler) => assembler.consumer().batches(),
        }
    }

    fn rejected_cpis(&self) -> u64 {
        match self {
            Engine::Aligned(_) => 0,
            Engine::Cpi(assembler) => assembler.rejected_count(),
        }
    }

    fn status(&self) -> SyncStatus {
        self.channels().status()
    }
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline to completion
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;
        let algorithm = blueprint.algorithm.name.clone();

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Setup Ingestion Pipeline
        info!("Setting up ingestion pipeline...");
        let backpressure =
            BackpressureConfig::new(self.config.queue_capacity, self.config.drop_policy);
        let mut ingestion = IngestionPipeline::from_blueprint(blueprint, backpressure)
            .context("Failed to build mock sources")?;
        let rx = ingestion
            .take_receiver()
            .context("Failed to get ingestion receiver")?;

        // Setup Sync Engine
        let mut engine = Engine::from_blueprint(blueprint);
        let mode = engine.mode();
        info!(
            algorithm = %algorithm,
            mode = %mode,
            channels = blueprint.engine.channel_count(),
            max_buffer_size = blueprint.engine.max_buffer_size,
            cpi_span = ?blueprint.engine.cpi_span(),
            enabled = blueprint.engine.enabled,
            "Sync engine configured"
        );

        let aggregator = Arc::new(Mutex::new(SyncMetricsAggregator::new()));
        let reporter = self.config.status_interval.map(|interval| {
            let channels = engine.channels().clone();
            StatusReporter::new(algorithm.clone(), interval, move || channels.status())
                .with_aggregator(aggregator.clone())
                .spawn()
        });

        // Start Pipeline
        let active_sources = ingestion
            .start_all()
            .context("Failed to start mock sources")?;
        info!(active_sources, max_outputs = ?self.config.max_outputs, "Pipeline running");

        let mut stats = PipelineStats {
            mode,
            active_sources,
            ..Default::default()
        };

        let deadline = async {
            match self.config.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            let ChannelMessage {
                channel_index,
                message,
            } = tokio::select! {
                received = rx.recv() => match received {
                    Ok(delivered) => delivered,
                    Err(_) => {
                        info!("All sources finished");
                        break;
                    }
                },
                _ = &mut deadline => {
                    warn!(timeout = ?self.config.timeout, "Pipeline timed out");
                    break;
                }
            };
            stats.messages_received += 1;

            let before = engine.outputs();
            let cycle_start = Instant::now();
            match engine.add_data(channel_index, message) {
                Ok(()) => {}
                Err(SyncError::ConsumerFailed { sequence_counter }) => {
                    stats.consumer_failures += 1;
                    record_output(&algorithm, mode.as_str(), false);
                    lock(&aggregator).record_output(false, None);
                    warn!(sequence_counter, "Consumer rejected output");
                }
                Err(e) => {
                    stats.messages_rejected += 1;
                    warn!(channel_index, error = %e, "Message rejected by engine");
                }
            }

            let produced = engine.outputs() - before;
            if produced > 0 {
                let latency_ms = cycle_start.elapsed().as_secs_f64() * 1000.0;
                record_processing_latency_ms(latency_ms);
                let mut aggregator = lock(&aggregator);
                for _ in 0..produced {
                    record_output(&algorithm, mode.as_str(), true);
                    aggregator.record_output(true, Some(latency_ms));
                }
                stats.outputs += produced;
                debug!(outputs = stats.outputs, status = %engine.status(), "Output produced");

                if let Some(max) = self.config.max_outputs {
                    if stats.outputs >= max {
                        info!(outputs = stats.outputs, "Reached max outputs limit");
                        break;
                    }
                }
            }
        }

        // Shutdown
        info!("Shutting down pipeline...");
        ingestion.stop_all();
        ingestion.join().await;
        if let Some(handle) = reporter {
            handle.abort();
        }

        let final_status = engine.status();
        lock(&aggregator).update(&final_status);

        stats.final_status = final_status.to_string();
        stats.cpis_rejected = engine.rejected_cpis();
        stats.ingestion = ingestion.metrics().snapshot();
        stats.sync_metrics = lock(&aggregator).clone();
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            rate = format!("{:.2}", stats.output_rate()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

fn lock(aggregator: &Mutex<SyncMetricsAggregator>) -> MutexGuard<'_, SyncMetricsAggregator> {
    aggregator.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{AlgorithmConfig, ConfigVersion, SourceConfig, SyncEngineConfig};

    fn blueprint(engine: SyncEngineConfig) -> PipelineBlueprint {
        PipelineBlueprint {
            version: ConfigVersion::V1,
            algorithm: AlgorithmConfig {
                name: "summer".into(),
            },
            engine,
            sources: ["input1", "input2"]
                .iter()
                .map(|channel| SourceConfig {
                    channel: channel.to_string(),
                    prf_hz: 2000.0,
                    start_sequence: 65530,
                    pulses_per_cpi: 4,
                    waveform_codes: vec![1, 2],
                    drop_probability: 0.0,
                    samples: 8,
                })
                .collect(),
        }
    }

    fn config(blueprint: PipelineBlueprint, max_outputs: u64) -> PipelineConfig {
        PipelineConfig {
            blueprint,
            max_outputs: Some(max_outputs),
            timeout: Some(Duration::from_secs(10)),
            queue_capacity: 256,
            drop_policy: DropPolicy::Block,
            status_interval: Some(Duration::from_millis(5)),
            metrics_port: None,
        }
    }

    #[tokio::test]
    async fn test_aligned_run_reaches_limit() {
        let bp = blueprint(SyncEngineConfig::uniform(2, 64, true));
        let stats = Pipeline::new(config(bp, 20)).run().await.unwrap();

        assert_eq!(stats.mode, EngineMode::Aligned);
        assert!(stats.outputs >= 20);
        assert_eq!(stats.messages_rejected, 0);
        assert_eq!(stats.active_sources, 2);
    }

    #[tokio::test]
    async fn test_cpi_run_reaches_limit() {
        let bp = blueprint(SyncEngineConfig::uniform(2, 64, true).with_cpi(4));
        let stats = Pipeline::new(config(bp, 3)).run().await.unwrap();

        assert_eq!(stats.mode, EngineMode::Cpi);
        assert!(stats.outputs >= 3);
        assert!(stats.sync_metrics.snapshots >= 1);
    }

    #[tokio::test]
    async fn test_timeout_stops_run() {
        let bp = blueprint(SyncEngineConfig::uniform(2, 64, true));
        let mut cfg = config(bp, u64::MAX);
        cfg.timeout = Some(Duration::from_millis(50));

        let stats = Pipeline::new(cfg).run().await.unwrap();
        assert!(stats.duration >= Duration::from_millis(50));
    }
}
