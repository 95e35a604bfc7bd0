//! Sync engine metric collection
//!
//! Records engine status snapshots and consumer output as Prometheus
//! metrics, and aggregates them in memory for end-of-run summaries.

use std::collections::BTreeMap;

use contracts::SyncStatus;
use metrics::{counter, gauge, histogram};

/// Record a status snapshot
///
/// Call periodically from the status path; sizes may be slightly stale.
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_status;
///
/// record_status("summer", &controller.status());
/// ```
pub fn record_status(algorithm: &str, status: &SyncStatus) {
    gauge!("sidecar_sync_enabled", "algorithm" => algorithm.to_string())
        .set(if status.enabled { 1.0 } else { 0.0 });

    gauge!("sidecar_sync_enabled_channels", "algorithm" => algorithm.to_string())
        .set(status.channels.len() as f64);

    for channel in &status.channels {
        record_buffer_depth(algorithm, channel.index, channel.size);
    }
}

/// Record one channel's buffer depth
pub fn record_buffer_depth(algorithm: &str, channel: usize, depth: usize) {
    gauge!(
        "sidecar_sync_buffer_depth",
        "algorithm" => algorithm.to_string(),
        "channel" => channel.to_string()
    )
    .set(depth as f64);
}

/// Record consumer output
pub fn record_output(algorithm: &str, kind: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "sidecar_sync_outputs_total",
        "algorithm" => algorithm.to_string(),
        "kind" => kind.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record delivery-to-output latency
pub fn record_processing_latency_ms(latency_ms: f64) {
    histogram!("sidecar_sync_processing_latency_ms").record(latency_ms);
}

/// Sync metrics aggregator
///
/// Aggregates status snapshots and outputs in memory.
#[derive(Debug, Clone, Default)]
pub struct SyncMetricsAggregator {
    /// Status snapshots seen
    pub snapshots: u64,

    /// Snapshots taken while the algorithm was disabled
    pub disabled_snapshots: u64,

    /// Outputs produced (aligned messages or CPIs)
    pub outputs: u64,

    /// Outputs the consumer reported as failed
    pub failed_outputs: u64,

    /// Total buffered messages per snapshot
    pub buffered_stats: RunningStats,

    /// Processing latency (ms)
    pub latency_stats: RunningStats,

    /// Buffer depth per channel index
    pub depth_stats: BTreeMap<usize, RunningStats>,
}

impl SyncMetricsAggregator {
    /// Create new aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a status snapshot
    pub fn update(&mut self, status: &SyncStatus) {
        self.snapshots += 1;
        if !status.enabled {
            self.disabled_snapshots += 1;
        }

        self.buffered_stats.push(status.total_buffered() as f64);
        for channel in &status.channels {
            self.depth_stats
                .entry(channel.index)
                .or_default()
                .push(channel.size as f64);
        }
    }

    /// Count one output
    pub fn record_output(&mut self, success: bool, latency_ms: Option<f64>) {
        self.outputs += 1;
        if !success {
            self.failed_outputs += 1;
        }
        if let Some(latency) = latency_ms {
            self.latency_stats.push(latency);
        }
    }

    /// Build summary report
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            snapshots: self.snapshots,
            disabled_snapshots: self.disabled_snapshots,
            outputs: self.outputs,
            failed_outputs: self.failed_outputs,
            failure_rate: if self.outputs > 0 {
                self.failed_outputs as f64 / self.outputs as f64 * 100.0
            } else {
                0.0
            },
            buffered: StatsSummary::from(&self.buffered_stats),
            latency_ms: StatsSummary::from(&self.latency_stats),
            channel_depths: self
                .depth_stats
                .iter()
                .map(|(index, stats)| (*index, StatsSummary::from(stats)))
                .collect(),
        }
    }

    /// Reset statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Metrics summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub snapshots: u64,
    pub disabled_snapshots: u64,
    pub outputs: u64,
    pub failed_outputs: u64,
    pub failure_rate: f64,
    pub buffered: StatsSummary,
    pub latency_ms: StatsSummary,
    pub channel_depths: BTreeMap<usize, StatsSummary>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Sync Metrics Summary ===")?;
        writeln!(f, "Outputs: {}", self.outputs)?;
        writeln!(
            f,
            "Failed outputs: {} ({:.2}%)",
            self.failed_outputs, self.failure_rate
        )?;
        writeln!(
            f,
            "Status snapshots: {} ({} disabled)",
            self.snapshots, self.disabled_snapshots
        )?;
        writeln!(f, "Buffered messages: {}", self.buffered)?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;

        if !self.channel_depths.is_empty() {
            writeln!(f, "Channel depths:")?;
            for (index, depth) in &self.channel_depths {
                writeln!(f, "  C{}: {}", index, depth)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a value
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// Sample count
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Minimum
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Maximum
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ChannelStatus;

    fn status(sizes: &[(usize, usize)]) -> SyncStatus {
        SyncStatus {
            enabled: true,
            channels: sizes
                .iter()
                .map(|&(index, size)| ChannelStatus { index, size })
                .collect(),
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = SyncMetricsAggregator::new();
        aggregator.update(&status(&[(0, 2), (2, 4)]));
        aggregator.update(&SyncStatus::default());
        aggregator.record_output(true, Some(0.5));
        aggregator.record_output(false, None);

        assert_eq!(aggregator.snapshots, 2);
        assert_eq!(aggregator.disabled_snapshots, 1);
        assert_eq!(aggregator.outputs, 2);
        assert_eq!(aggregator.failed_outputs, 1);
        assert_eq!(aggregator.depth_stats[&2].count(), 1);
        assert!((aggregator.buffered_stats.max() - 6.0).abs() < 1e-10);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = SyncMetricsAggregator::new();
        aggregator.update(&status(&[(1, 3)]));
        for _ in 0..3 {
            aggregator.record_output(true, Some(1.0));
        }
        aggregator.record_output(false, Some(2.0));

        let output = aggregator.summary().to_string();
        assert!(output.contains("Outputs: 4"));
        assert!(output.contains("25.00%"));
        assert!(output.contains("C1:"));
    }

    #[test]
    fn test_record_without_recorder() {
        // metrics facade is a no-op without an installed recorder
        record_status("test", &status(&[(0, 1)]));
        record_output("test", "cpi", true);
        record_processing_latency_ms(1.0);
    }
}
