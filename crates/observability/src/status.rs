//! Periodic status reporting
//!
//! Emits each algorithm's formatted channel statistics (`C0[3]  C1[2]  ` or
//! `Disabled  `) on a fixed interval, the way the host's status line shows
//! buffer fill levels. Reads are lock-free snapshots and may be stale.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use contracts::SyncStatus;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::metrics::{record_status, SyncMetricsAggregator};

/// Periodic status reporter for one algorithm
pub struct StatusReporter<F> {
    algorithm: String,
    interval: Duration,
    source: F,
    aggregator: Arc<Mutex<SyncMetricsAggregator>>,
}

impl<F> StatusReporter<F>
where
    F: Fn() -> SyncStatus + Send + 'static,
{
    /// Create a reporter reading snapshots from `source`
    pub fn new(algorithm: impl Into<String>, interval: Duration, source: F) -> Self {
        Self {
            algorithm: algorithm.into(),
            interval,
            source,
            aggregator: Arc::new(Mutex::new(SyncMetricsAggregator::new())),
        }
    }

    /// Share an aggregator with other reporters or the output path
    pub fn with_aggregator(mut self, aggregator: Arc<Mutex<SyncMetricsAggregator>>) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Aggregator fed by this reporter
    pub fn aggregator(&self) -> Arc<Mutex<SyncMetricsAggregator>> {
        self.aggregator.clone()
    }

    /// Take one snapshot, log it and record it
    pub fn report_once(&self) -> SyncStatus {
        let status = (self.source)();
        record_status(&self.algorithm, &status);
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(&status);

        info!(
            algorithm = %self.algorithm,
            status = %status,
            buffered = status.total_buffered(),
            "sync status"
        );
        status
    }

    /// Report on the configured interval until the task is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.report_once();
            }
        })
    }
}
