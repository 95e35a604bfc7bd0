//! Shared channel collection and runtime parameters.
//!
//! The delivery path (owning a [`SyncController`](crate::SyncController) or
//! [`CpiAssembler`](crate::CpiAssembler)) and the configuration/status path
//! share one `Arc<ChannelSet>`. Each buffer sits behind its own mutex; a sync
//! cycle locks every buffer in index order and holds them as one
//! [`LockedChannels`] snapshot. Scalar mirrors are refreshed whenever a lock
//! is released so status reads never take a buffer lock.
//!
//! Consumer callbacks run while the snapshot is held and must reconfigure
//! through [`LockedChannels`], never through the `ChannelSet` mutators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{ChannelStatus, ChannelType, PriRef, SyncEngineConfig, SyncStatus};
use tracing::debug;

use crate::buffer::{AddOutcome, ChannelBuffer};
use crate::error::{Result, SyncError};
use crate::wrap::SequenceWrap;

/// Callback invoked synchronously when a channel's enabled state changes.
///
/// Receives the channel index and the new state.
pub type EnabledCallback = Arc<dyn Fn(usize, bool) + Send + Sync>;

/// One channel plus lock-free mirrors of its scalar state
#[derive(Debug)]
struct SharedChannel {
    name: String,
    channel_type: ChannelType,
    buffer: Mutex<ChannelBuffer>,
    len: AtomicUsize,
    enabled: AtomicBool,
    max_size: AtomicUsize,
}

impl SharedChannel {
    fn lock(&self) -> MutexGuard<'_, ChannelBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, buffer: &ChannelBuffer) {
        self.len.store(buffer.len(), Ordering::Relaxed);
        self.enabled.store(buffer.is_enabled(), Ordering::Relaxed);
        self.max_size.store(buffer.max_size(), Ordering::Relaxed);
    }
}

/// Fixed-size collection of channel buffers with runtime parameters
pub struct ChannelSet {
    channels: Vec<SharedChannel>,
    wrap: SequenceWrap,
    enabled: AtomicBool,
    max_buffer_size: AtomicUsize,
    cpi_span: AtomicUsize,
    drop_incomplete_cpi: AtomicBool,
    enabled_observer: Mutex<Option<EnabledCallback>>,
    pending_enable_changes: Mutex<Vec<(usize, bool)>>,
}

impl std::fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSet")
            .field("channels", &self.channels.len())
            .field("enabled", &self.is_enabled())
            .field("max_buffer_size", &self.max_buffer_size())
            .field("cpi_span", &self.cpi_span())
            .finish()
    }
}

impl ChannelSet {
    /// Build the channel set described by `config`
    pub fn from_config(config: &SyncEngineConfig) -> Self {
        let wrap = config
            .wrap_threshold
            .map(SequenceWrap::with_threshold)
            .unwrap_or_default();

        let channels = config
            .channels
            .iter()
            .enumerate()
            .map(|(index, channel)| {
                let max_size = config.channel_max_size(index).max(1);
                let buffer = ChannelBuffer::with_wrap(index, max_size, channel.enabled, wrap);
                SharedChannel {
                    name: channel.name.clone(),
                    channel_type: channel.message_type,
                    len: AtomicUsize::new(0),
                    enabled: AtomicBool::new(buffer.is_enabled()),
                    max_size: AtomicUsize::new(max_size),
                    buffer: Mutex::new(buffer),
                }
            })
            .collect();

        let cpi = config.cpi.as_ref();
        Self {
            channels,
            wrap,
            enabled: AtomicBool::new(config.enabled),
            max_buffer_size: AtomicUsize::new(config.max_buffer_size.max(1)),
            cpi_span: AtomicUsize::new(cpi.map_or(1, |c| c.cpi_span.max(1))),
            drop_incomplete_cpi: AtomicBool::new(cpi.is_some_and(|c| c.drop_incomplete_cpi)),
            enabled_observer: Mutex::new(None),
            pending_enable_changes: Mutex::new(Vec::new()),
        }
    }

    /// `channel_count` video channels sharing one bound and enabled state
    pub fn uniform(channel_count: usize, max_buffer_size: usize, enabled: bool) -> Self {
        Self::from_config(&SyncEngineConfig::uniform(
            channel_count,
            max_buffer_size,
            enabled,
        ))
    }

    /// Number of channels (fixed for the lifetime of the set)
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Channel name
    pub fn channel_name(&self, index: usize) -> Option<&str> {
        self.channels.get(index).map(|c| c.name.as_str())
    }

    /// Message type bound to the channel
    pub fn channel_type(&self, index: usize) -> Option<ChannelType> {
        self.channels.get(index).map(|c| c.channel_type)
    }

    /// Look up a channel index by name
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    /// Wraparound rule shared by every channel
    pub fn wrap(&self) -> SequenceWrap {
        self.wrap
    }

    // ===== Algorithm-level parameters =====

    /// Algorithm enabled state
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Change the algorithm enabled state
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Current global buffer bound
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size.load(Ordering::Relaxed)
    }

    /// Change the bound of every channel, trimming immediately
    pub fn set_max_buffer_size(&self, max_buffer_size: usize) {
        let max_buffer_size = max_buffer_size.max(1);
        self.max_buffer_size.store(max_buffer_size, Ordering::Relaxed);

        for channel in &self.channels {
            let mut buffer = channel.lock();
            buffer.set_max_size(max_buffer_size);
            channel.publish(&buffer);
        }
        debug!(max_buffer_size, "channel buffer bound changed");
    }

    /// Change the bound of one channel, trimming immediately
    pub fn set_channel_max_size(&self, index: usize, max_size: usize) -> Result<()> {
        let channel = self.channel(index)?;
        let mut buffer = channel.lock();
        buffer.set_max_size(max_size);
        channel.publish(&buffer);
        Ok(())
    }

    /// Number of PRIs in a CPI
    pub fn cpi_span(&self) -> usize {
        self.cpi_span.load(Ordering::Relaxed)
    }

    /// Change the CPI span (zero is raised to one)
    pub fn set_cpi_span(&self, cpi_span: usize) {
        self.cpi_span.store(cpi_span.max(1), Ordering::Relaxed);
        debug!(cpi_span, "cpi span changed");
    }

    /// Whether CPIs with missing PRIs are dropped
    pub fn drop_incomplete_cpi(&self) -> bool {
        self.drop_incomplete_cpi.load(Ordering::Relaxed)
    }

    /// Change the incomplete-CPI policy
    pub fn set_drop_incomplete_cpi(&self, drop: bool) {
        self.drop_incomplete_cpi.store(drop, Ordering::Relaxed);
    }

    // ===== Channel-level parameters =====

    /// Channel enabled state (lock-free, may be momentarily stale)
    pub fn is_channel_enabled(&self, index: usize) -> bool {
        self.channels
            .get(index)
            .is_some_and(|c| c.enabled.load(Ordering::Relaxed))
    }

    /// Buffered message count (lock-free, may be momentarily stale)
    pub fn channel_len(&self, index: usize) -> usize {
        self.channels
            .get(index)
            .map_or(0, |c| c.len.load(Ordering::Relaxed))
    }

    /// Channel bound (lock-free, may be momentarily stale)
    pub fn channel_max_size(&self, index: usize) -> usize {
        self.channels
            .get(index)
            .map_or(0, |c| c.max_size.load(Ordering::Relaxed))
    }

    /// Enable or disable one channel.
    ///
    /// A transition discards the channel's buffered messages, invokes the
    /// registered observer and queues the change for the consumer. Returns
    /// true if the state changed.
    pub fn set_channel_enabled(&self, index: usize, enabled: bool) -> Result<bool> {
        let channel = self.channel(index)?;
        let changed = {
            let mut buffer = channel.lock();
            let changed = buffer.set_enabled(enabled);
            channel.publish(&buffer);
            changed
        };

        if changed {
            self.notify_enabled(index, enabled);
        }
        Ok(changed)
    }

    fn notify_enabled(&self, index: usize, enabled: bool) {
        debug!(channel = index, enabled, "channel enabled state changed");
        self.pending_enable_changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((index, enabled));

        let observer = self
            .enabled_observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer(index, enabled);
        }
    }

    /// Register the callback invoked on channel enable transitions
    pub fn on_channel_enabled_changed(&self, callback: EnabledCallback) {
        *self
            .enabled_observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Drain enable transitions not yet delivered to the consumer
    pub fn take_enable_changes(&self) -> Vec<(usize, bool)> {
        std::mem::take(
            &mut *self
                .pending_enable_changes
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Forget every buffered message, keeping enablement
    pub fn reset(&self) {
        let mut locked = self.lock();
        for buffer in locked.buffers_mut() {
            buffer.reset();
        }
    }

    /// Status snapshot for external reporting.
    ///
    /// Reads only the atomic mirrors, so a size may lag the buffer slightly.
    pub fn status(&self) -> SyncStatus {
        let channels = self
            .channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.enabled.load(Ordering::Relaxed))
            .map(|(index, c)| ChannelStatus {
                index,
                size: c.len.load(Ordering::Relaxed),
            })
            .collect();

        SyncStatus {
            enabled: self.is_enabled(),
            channels,
        }
    }

    /// Lock every channel in index order
    pub fn lock(&self) -> LockedChannels<'_> {
        LockedChannels {
            set: self,
            guards: self.channels.iter().map(SharedChannel::lock).collect(),
            enable_changes: Vec::new(),
        }
    }

    fn channel(&self, index: usize) -> Result<&SharedChannel> {
        self.channels.get(index).ok_or(SyncError::UnknownChannel {
            index,
            count: self.channels.len(),
        })
    }
}

/// Consistent snapshot of every channel, held for one sync cycle.
///
/// Consumers receive this during their callback and pop the messages they
/// use through it. Enable transitions made through the snapshot are reported
/// to the observer once every lock has been released.
pub struct LockedChannels<'a> {
    set: &'a ChannelSet,
    guards: Vec<MutexGuard<'a, ChannelBuffer>>,
    enable_changes: Vec<(usize, bool)>,
}

impl Drop for LockedChannels<'_> {
    fn drop(&mut self) {
        for (channel, guard) in self.set.channels.iter().zip(self.guards.drain(..)) {
            channel.publish(&guard);
        }
        for (index, enabled) in std::mem::take(&mut self.enable_changes) {
            self.set.notify_enabled(index, enabled);
        }
    }
}

impl<'a> LockedChannels<'a> {
    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.guards.len()
    }

    /// Algorithm enabled state
    pub fn is_algorithm_enabled(&self) -> bool {
        self.set.is_enabled()
    }

    /// Wraparound rule shared by every channel
    pub fn wrap(&self) -> SequenceWrap {
        self.set.wrap()
    }

    /// Number of PRIs in a CPI
    pub fn cpi_span(&self) -> usize {
        self.set.cpi_span()
    }

    /// Whether CPIs with missing PRIs are dropped
    pub fn drop_incomplete_cpi(&self) -> bool {
        self.set.drop_incomplete_cpi()
    }

    /// Change the bound of one held channel, trimming immediately
    pub fn set_max_size(&mut self, index: usize, max_size: usize) -> Result<()> {
        let count = self.guards.len();
        let buffer = self
            .channel_mut(index)
            .ok_or(SyncError::UnknownChannel { index, count })?;
        buffer.set_max_size(max_size);
        Ok(())
    }

    /// Change the bound of every held channel, trimming immediately
    pub fn set_max_buffer_size(&mut self, max_buffer_size: usize) {
        let max_buffer_size = max_buffer_size.max(1);
        self.set
            .max_buffer_size
            .store(max_buffer_size, Ordering::Relaxed);
        for buffer in self.buffers_mut() {
            buffer.set_max_size(max_buffer_size);
        }
        debug!(max_buffer_size, "channel buffer bound changed");
    }

    /// Enable or disable one held channel.
    ///
    /// Same semantics as [`ChannelSet::set_channel_enabled`]; the observer
    /// runs after the snapshot is dropped.
    pub fn set_channel_enabled(&mut self, index: usize, enabled: bool) -> Result<bool> {
        let count = self.guards.len();
        let buffer = self
            .channel_mut(index)
            .ok_or(SyncError::UnknownChannel { index, count })?;
        let changed = buffer.set_enabled(enabled);
        if changed {
            self.enable_changes.push((index, enabled));
        }
        Ok(changed)
    }

    /// Borrow one channel
    pub fn channel(&self, index: usize) -> Option<&ChannelBuffer> {
        self.guards.get(index).map(|g| &**g)
    }

    /// Mutably borrow one channel
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut ChannelBuffer> {
        self.guards.get_mut(index).map(|g| &mut **g)
    }

    /// Every channel, in index order
    pub fn buffers(&self) -> impl Iterator<Item = &ChannelBuffer> + '_ {
        self.guards.iter().map(|g| &**g)
    }

    /// Every channel, mutably, in index order
    pub fn buffers_mut(&mut self) -> impl Iterator<Item = &mut ChannelBuffer> + use<'_, 'a> {
        self.guards.iter_mut().map(|g| &mut **g)
    }

    /// Indices of enabled channels
    pub fn enabled_indices(&self) -> Vec<usize> {
        self.buffers()
            .filter(|b| b.is_enabled())
            .map(ChannelBuffer::channel_index)
            .collect()
    }

    /// Oldest message of one channel
    pub fn front(&self, index: usize) -> Option<&PriRef> {
        self.channel(index).and_then(ChannelBuffer::front)
    }

    /// Remove the oldest message of one channel
    pub fn pop_front(&mut self, index: usize) -> Option<PriRef> {
        self.channel_mut(index).and_then(ChannelBuffer::pop_front)
    }

    /// Remove up to `count` oldest messages of one channel
    pub fn take_front(&mut self, index: usize, count: usize) -> Vec<PriRef> {
        let Some(buffer) = self.channel_mut(index) else {
            return Vec::new();
        };
        (0..count).map_while(|_| buffer.pop_front()).collect()
    }

    /// Pop the front message of every enabled channel.
    ///
    /// Returns the messages with their channel index, and the smallest sample
    /// count among them (0 when nothing was popped).
    pub fn pop_enabled_fronts(&mut self) -> (Vec<(usize, PriRef)>, usize) {
        let mut min_samples = usize::MAX;
        let mut fronts = Vec::new();
        for buffer in self.buffers_mut().filter(|b| b.is_enabled()) {
            if let Some(msg) = buffer.pop_front() {
                min_samples = min_samples.min(msg.sample_count());
                fronts.push((buffer.channel_index(), msg));
            }
        }
        if fronts.is_empty() {
            min_samples = 0;
        }
        (fronts, min_samples)
    }

    /// Store a message in one channel after checking its type binding
    pub(crate) fn add_data(&mut self, index: usize, msg: PriRef) -> Result<AddOutcome> {
        let expected = self.set.channel(index)?.channel_type;
        let actual = msg.channel_type();
        if expected != actual {
            return Err(SyncError::ChannelTypeMismatch {
                index,
                expected,
                actual,
            });
        }

        let count = self.set.channel_count();
        let buffer = self
            .channel_mut(index)
            .ok_or(SyncError::UnknownChannel { index, count })?;
        Ok(buffer.add_data(msg))
    }
}
