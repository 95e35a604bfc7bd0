//! Pipeline statistics and metrics.

use std::time::Duration;

use ingestion::MetricsSnapshot;
use observability::SyncMetricsAggregator;

use super::EngineMode;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Engine mode the run used
    pub mode: EngineMode,

    /// Outputs produced (aligned PRIs or complete CPIs)
    pub outputs: u64,

    /// Messages received from the delivery queue
    pub messages_received: u64,

    /// Messages the engine refused (unknown channel, type mismatch)
    pub messages_rejected: u64,

    /// Cycles where the consumer reported failure
    pub consumer_failures: u64,

    /// CPI candidates dropped as short or gapped
    pub cpis_rejected: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Number of sources started
    pub active_sources: usize,

    /// Final `SyncStatus` line
    pub final_status: String,

    /// Source-side counters
    pub ingestion: MetricsSnapshot,

    /// Status and output aggregation
    pub sync_metrics: SyncMetricsAggregator,
}

impl PipelineStats {
    /// Outputs per second
    pub fn output_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.outputs as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of generated pulses that never reached the engine, in percent
    pub fn loss_rate(&self) -> f64 {
        let generated = self.ingestion.pulses_generated;
        if generated > 0 {
            let lost = self.ingestion.pulses_lost + self.ingestion.pulses_dropped;
            (lost as f64 / generated as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Pipeline Statistics ===\n");

        println!("Overview");
        println!("   |- Mode: {}", self.mode);
        println!("   |- Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   |- Outputs: {}", self.outputs);
        println!("   |- Output rate: {:.2}/s", self.output_rate());
        println!("   |- Messages received: {}", self.messages_received);
        println!("   |- Messages rejected: {}", self.messages_rejected);
        println!("   |- Consumer failures: {}", self.consumer_failures);
        if self.mode == EngineMode::Cpi {
            println!("   |- CPIs rejected: {}", self.cpis_rejected);
        }
        println!("   `- Active sources: {}", self.active_sources);

        println!("\nIngestion");
        println!("   |- Pulses generated: {}", self.ingestion.pulses_generated);
        println!("   |- Pulses lost: {}", self.ingestion.pulses_lost);
        println!("   |- Pulses dropped (queue full): {}", self.ingestion.pulses_dropped);
        println!("   `- Loss rate: {:.2}%", self.loss_rate());

        println!("\nFinal status: {}", self.final_status);
        println!("\n{}", self.sync_metrics.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let stats = PipelineStats {
            outputs: 50,
            duration: Duration::from_secs(2),
            ingestion: MetricsSnapshot {
                pulses_generated: 200,
                pulses_lost: 10,
                pulses_dropped: 10,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!((stats.output_rate() - 25.0).abs() < 1e-10);
        assert!((stats.loss_rate() - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_empty_rates() {
        let stats = PipelineStats::default();
        assert_eq!(stats.output_rate(), 0.0);
        assert_eq!(stats.loss_rate(), 0.0);
    }
}
