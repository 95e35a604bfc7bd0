//! # Observability
//!
//! Tracing + Prometheus metrics for the SideCar sync engine.
//!
//! ## Features
//!
//! - Tracing initialization (JSON/Pretty/Compact)
//! - Prometheus metrics export
//! - Status snapshot metrics, aggregation and periodic reporting
//!
//! ## Usage
//!
//! ```ignore
//! use observability::{init, metrics, StatusReporter};
//!
//! observability::init()?;
//!
//! let channels = controller.channels().clone();
//! let reporter = StatusReporter::new("summer", Duration::from_secs(1), move || channels.status());
//! let handle = reporter.spawn();
//! ```

pub mod metrics;
mod status;

use ::metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{
    record_buffer_depth, record_output, record_processing_latency_ms, record_status,
    MetricsSummary, RunningStats, StatsSummary, SyncMetricsAggregator,
};
pub use crate::status::StatusReporter;

/// Initialize observability (Tracing + Prometheus)
///
/// - Tracing: JSON format, honours RUST_LOG
/// - Prometheus: listens on 0.0.0.0:9000
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Log format
    pub log_format: LogFormat,
    /// Prometheus port (None = disabled)
    pub metrics_port: Option<u16>,
    /// Filter used when RUST_LOG is unset
    pub default_log_level: String,
    /// Ignore RUST_LOG and log warnings and errors only
    pub quiet: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: Some(9000),
            default_log_level: "info".to_string(),
            quiet: false,
        }
    }
}

impl ObservabilityConfig {
    /// Logging only, with the level picked from a `-v` count
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        Self {
            metrics_port: None,
            default_log_level: level.to_string(),
            quiet,
            ..Default::default()
        }
    }

    pub fn with_log_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }

    pub fn with_metrics_port(mut self, port: Option<u16>) -> Self {
        self.metrics_port = port;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        if self.quiet {
            return EnvFilter::new("warn");
        }
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.default_log_level))
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs
    #[default]
    Json,
    /// Human readable
    Pretty,
    /// Compact single line
    Compact,
}

/// Initialize with a custom configuration
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// Install the Prometheus exporter and describe the engine's metrics
///
/// Tracing is left untouched, for hosts with their own subscriber.
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;
    describe_metrics();

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}

/// Register units and help text for every metric the workspace emits
pub fn describe_metrics() {
    describe_counter!(
        "sidecar_sync_messages_received_total",
        Unit::Count,
        "PRI messages stored in a channel buffer"
    );
    describe_counter!(
        "sidecar_sync_messages_evicted_total",
        Unit::Count,
        "Oldest messages evicted by a full channel buffer"
    );
    describe_counter!(
        "sidecar_sync_messages_pruned_total",
        Unit::Count,
        "Messages discarded while aligning to a sequence counter"
    );
    describe_counter!(
        "sidecar_sync_aligned_total",
        Unit::Count,
        "Cycles where every enabled channel led with the same counter"
    );
    describe_counter!("sidecar_sync_cpi_total", Unit::Count, "Complete CPIs delivered");
    describe_counter!(
        "sidecar_sync_cpi_rejected_total",
        Unit::Count,
        "Leading runs discarded as short or gapped"
    );
    describe_counter!(
        "sidecar_sync_outputs_total",
        Unit::Count,
        "Consumer outputs by algorithm, kind and status"
    );
    describe_gauge!("sidecar_sync_enabled", "1 when the algorithm is enabled");
    describe_gauge!(
        "sidecar_sync_enabled_channels",
        Unit::Count,
        "Channels currently enabled"
    );
    describe_gauge!(
        "sidecar_sync_buffer_depth",
        Unit::Count,
        "Messages buffered per channel"
    );
    describe_histogram!(
        "sidecar_sync_processing_latency_ms",
        Unit::Milliseconds,
        "Time from message delivery to consumer output"
    );
    describe_counter!(
        "sidecar_ingestion_pulses_lost_total",
        Unit::Count,
        "Pulses lost in simulated transport"
    );
    describe_counter!(
        "sidecar_ingestion_pulses_dropped_total",
        Unit::Count,
        "Pulses dropped on a full delivery queue"
    );
}
