//! Ingestion Pipeline main entry

use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender};
use contracts::PipelineBlueprint;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::{BackpressureConfig, IngestionMetrics};
use crate::error::{IngestionError, Result};
use crate::mock::{ChannelMessage, MockPriConfig, MockPriSource};

/// Ingestion Pipeline
///
/// Owns the PRI sources of one algorithm and merges them into a single
/// bounded delivery queue.
pub struct IngestionPipeline {
    /// Registered sources, in registration order
    sources: Vec<MockPriSource>,

    /// Shared metrics
    metrics: Arc<IngestionMetrics>,

    /// Data sender (cloned into each source; dropped once started)
    tx: Option<Sender<ChannelMessage>>,

    /// Data receiver
    rx: Option<Receiver<ChannelMessage>>,

    /// Backpressure configuration
    backpressure: BackpressureConfig,

    /// Running source tasks
    handles: Vec<JoinHandle<()>>,
}

impl IngestionPipeline {
    /// Create new Ingestion Pipeline
    ///
    /// # Arguments
    /// * `channel_capacity` - Delivery queue capacity
    pub fn new(channel_capacity: usize) -> Self {
        Self::with_config(BackpressureConfig {
            channel_capacity,
            ..Default::default()
        })
    }

    /// Create with custom backpressure configuration
    pub fn with_config(config: BackpressureConfig) -> Self {
        let (tx, rx) = bounded(config.channel_capacity.max(1));

        Self {
            sources: Vec::new(),
            metrics: Arc::new(IngestionMetrics::new()),
            tx: Some(tx),
            rx: Some(rx),
            backpressure: config,
            handles: Vec::new(),
        }
    }

    /// Register one source per blueprint `sources` entry
    pub fn from_blueprint(blueprint: &PipelineBlueprint, config: BackpressureConfig) -> Result<Self> {
        let mut pipeline = Self::with_config(config);
        for source in &blueprint.sources {
            let index = blueprint.engine.channel_index(&source.channel).ok_or_else(|| {
                IngestionError::UnknownChannel {
                    channel: source.channel.clone(),
                }
            })?;
            let channel_type = blueprint.engine.channels[index].message_type;
            pipeline.register_source(MockPriSource::new(MockPriConfig::from_source(
                source,
                index,
                channel_type,
            )));
        }
        Ok(pipeline)
    }

    /// Register a PRI source
    #[instrument(
        name = "ingestion_register_source",
        skip(self, source),
        fields(channel = %source.config().channel)
    )]
    pub fn register_source(&mut self, source: MockPriSource) {
        debug!(
            channel_index = source.config().channel_index,
            "registered pri source"
        );
        self.sources.push(source);
    }

    /// Start all registered sources.
    ///
    /// The pipeline's own sender is released so the receiver closes once
    /// every source has stopped. Returns the number of sources started.
    #[instrument(name = "ingestion_start_all", skip(self))]
    pub fn start_all(&mut self) -> Result<usize> {
        let Some(tx) = self.tx.take() else {
            warn!("ingestion pipeline already started");
            return Ok(0);
        };

        info!(count = self.sources.len(), "starting all pri sources");
        for source in &self.sources {
            let handle = source.start(
                tx.clone(),
                self.backpressure.drop_policy,
                self.metrics.clone(),
            )?;
            self.handles.push(handle);
        }
        Ok(self.sources.len())
    }

    /// Stop all sources
    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub fn stop_all(&self) {
        info!(count = self.sources.len(), "stopping all pri sources");
        for source in &self.sources {
            if source.is_running() {
                debug!(channel = %source.config().channel, "stopping source");
                source.stop();
            }
        }
    }

    /// Wait for every started source task to finish
    pub async fn join(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "pri source task failed");
            }
        }
    }

    /// Get data stream receiver
    ///
    /// Note: Can only be called once, subsequent calls return None
    pub fn take_receiver(&mut self) -> Option<Receiver<ChannelMessage>> {
        self.rx.take()
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Get registered source count
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Check if the source feeding `channel` is running
    pub fn is_source_running(&self, channel: &str) -> bool {
        self.sources
            .iter()
            .any(|s| s.config().channel == channel && s.is_running())
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}
