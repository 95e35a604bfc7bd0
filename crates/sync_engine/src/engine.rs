//! Cross-channel alignment controller.

use std::sync::Arc;

use contracts::{PriRef, SyncEngineConfig, SyncStatus};
use metrics::counter;
use tracing::{debug, instrument, trace};

use crate::buffer::{AddOutcome, ChannelBuffer};
use crate::channels::{ChannelSet, LockedChannels};
use crate::consumer::AlignedConsumer;
use crate::error::{Result, SyncError};

/// Aligns every enabled channel on one sequence counter and hands the
/// aligned fronts to an [`AlignedConsumer`].
///
/// All work happens on the calling thread inside [`add_data`](Self::add_data).
/// Configuration and status go through the shared [`ChannelSet`] returned by
/// [`channels`](Self::channels), which may live on another thread.
#[derive(Debug)]
pub struct SyncController<C> {
    channels: Arc<ChannelSet>,
    consumer: C,
    aligned_count: u64,
}

impl<C: AlignedConsumer> SyncController<C> {
    /// Create a controller with its own channel set
    pub fn new(config: &SyncEngineConfig, consumer: C) -> Self {
        Self::with_channels(Arc::new(ChannelSet::from_config(config)), consumer)
    }

    /// Create a controller over an existing channel set
    pub fn with_channels(channels: Arc<ChannelSet>, consumer: C) -> Self {
        debug!(
            channels = channels.channel_count(),
            max_buffer_size = channels.max_buffer_size(),
            "sync controller created"
        );
        Self {
            channels,
            consumer,
            aligned_count: 0,
        }
    }

    /// Store a message and run one alignment cycle.
    ///
    /// Messages for a disabled channel are dropped without running a cycle.
    #[instrument(
        level = "trace",
        name = "sync_controller_add_data",
        skip(self, msg),
        fields(sequence_counter = msg.sequence_counter)
    )]
    pub fn add_data(&mut self, channel_index: usize, msg: PriRef) -> Result<()> {
        self.deliver_enable_changes();

        let channels = Arc::clone(&self.channels);
        let mut locked = channels.lock();
        if store(&mut locked, channel_index, msg)? {
            self.run_cycle(&mut locked)?;
        }
        Ok(())
    }

    /// Run one alignment cycle without new data.
    ///
    /// Returns true if the consumer was invoked.
    pub fn on_message_received(&mut self) -> Result<bool> {
        self.deliver_enable_changes();

        let channels = Arc::clone(&self.channels);
        let mut locked = channels.lock();
        self.run_cycle(&mut locked)
    }

    /// Discard every buffered message
    pub fn reset(&mut self) {
        self.channels.reset();
        debug!("sync controller reset");
    }

    /// Shared channel set (configuration and status handle)
    pub fn channels(&self) -> &Arc<ChannelSet> {
        &self.channels
    }

    /// Status snapshot
    pub fn status(&self) -> SyncStatus {
        self.channels.status()
    }

    /// Number of completed alignments
    pub fn aligned_count(&self) -> u64 {
        self.aligned_count
    }

    /// Borrow the consumer
    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    /// Mutably borrow the consumer
    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    /// Consume the controller, returning its consumer
    pub fn into_consumer(self) -> C {
        self.consumer
    }

    fn run_cycle(&mut self, locked: &mut LockedChannels<'_>) -> Result<bool> {
        let Some(sequence_counter) = align(locked) else {
            return Ok(false);
        };

        self.aligned_count += 1;
        counter!("sidecar_sync_aligned_total").increment(1);
        trace!(sequence_counter, "channels aligned");

        if self.consumer.process_aligned(locked) {
            Ok(true)
        } else {
            Err(SyncError::ConsumerFailed { sequence_counter })
        }
    }

    fn deliver_enable_changes(&mut self) {
        for (index, enabled) in self.channels.take_enable_changes() {
            self.consumer.channel_enabled_changed(index, enabled);
        }
    }
}

/// Store a message, recording metrics.
///
/// Returns false if the channel ignored it (disabled).
pub(crate) fn store(
    locked: &mut LockedChannels<'_>,
    channel_index: usize,
    msg: PriRef,
) -> Result<bool> {
    counter!("sidecar_sync_messages_received_total").increment(1);
    match locked.add_data(channel_index, msg)? {
        AddOutcome::Ignored => Ok(false),
        AddOutcome::Stored { evicted } => {
            if evicted > 0 {
                counter!("sidecar_sync_messages_evicted_total").increment(evicted as u64);
                trace!(channel = channel_index, evicted, "buffer full, evicted oldest");
            }
            Ok(true)
        }
    }
}

/// Running maximum of the enabled, non-empty fronts under the wraparound rule
pub(crate) fn max_sequence_counter(locked: &LockedChannels<'_>) -> Option<u32> {
    let wrap = locked.wrap();
    locked
        .buffers()
        .filter(|b| b.is_enabled() && !b.is_empty())
        .map(ChannelBuffer::next_sequence_counter)
        .reduce(|max, seq| if wrap.advances(max, seq) { seq } else { max })
}

/// Prune every enabled channel to the newest front.
///
/// Returns the common sequence counter if every enabled channel now leads
/// with it, `None` if there is nothing to align or some channel is behind.
pub(crate) fn align(locked: &mut LockedChannels<'_>) -> Option<u32> {
    let target = max_sequence_counter(locked)?;

    let mut any_enabled = false;
    let mut aligned = true;
    let mut pruned = 0;
    for buffer in locked.buffers_mut().filter(|b| b.is_enabled()) {
        any_enabled = true;
        let before = buffer.pruned_count();
        aligned &= buffer.prune_to_sequence_counter(target);
        pruned += buffer.pruned_count() - before;
    }

    if pruned > 0 {
        counter!("sidecar_sync_messages_pruned_total").increment(pruned);
        trace!(target_sequence = target, pruned, "pruned stale messages");
    }

    (any_enabled && aligned).then_some(target)
}
