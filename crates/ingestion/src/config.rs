//! Backpressure configuration and metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// What a source does when the delivery queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DropPolicy {
    /// Drop the pulse being sent; the source keeps its PRF timing
    #[default]
    DropNewest,
    /// Wait for queue space (the source falls behind its PRF)
    Block,
}

/// Backpressure configuration
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    /// Channel capacity
    pub channel_capacity: usize,

    /// Drop policy when full
    pub drop_policy: DropPolicy,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            drop_policy: DropPolicy::DropNewest,
        }
    }
}

impl BackpressureConfig {
    /// Create new backpressure configuration
    pub fn new(channel_capacity: usize, drop_policy: DropPolicy) -> Self {
        Self {
            channel_capacity,
            drop_policy,
        }
    }
}

/// Ingestion metrics, shared by every source of a pipeline
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Pulses generated (including simulated losses)
    pub pulses_generated: AtomicU64,

    /// Pulses lost in simulated transport
    pub pulses_lost: AtomicU64,

    /// Pulses dropped because the delivery queue was full
    pub pulses_dropped: AtomicU64,

    /// Pulses delivered to the queue
    pub pulses_sent: AtomicU64,

    /// Current queue length
    pub queue_len: AtomicUsize,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record pulse generated
    pub fn record_generated(&self) {
        self.pulses_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record simulated transport loss
    pub fn record_lost(&self) {
        self.pulses_lost.fetch_add(1, Ordering::Relaxed);
    }

    /// Record backpressure drop
    pub fn record_dropped(&self) {
        self.pulses_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record pulse delivered
    pub fn record_sent(&self) {
        self.pulses_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Update queue length
    pub fn update_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pulses_generated: self.pulses_generated.load(Ordering::Relaxed),
            pulses_lost: self.pulses_lost.load(Ordering::Relaxed),
            pulses_dropped: self.pulses_dropped.load(Ordering::Relaxed),
            pulses_sent: self.pulses_sent.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Pulses generated (including simulated losses)
    pub pulses_generated: u64,

    /// Pulses lost in simulated transport
    pub pulses_lost: u64,

    /// Pulses dropped because the delivery queue was full
    pub pulses_dropped: u64,

    /// Pulses delivered to the queue
    pub pulses_sent: u64,

    /// Current queue length
    pub queue_len: usize,
}
