//! CPI assembly on top of channel alignment.
//!
//! After the channels are aligned, each enabled channel must lead with
//! exactly `cpi_span` messages of one waveform code, followed by a message
//! with a different code. A run that ends early is pruned and never shown
//! to the consumer.

use std::fmt;
use std::sync::Arc;

use contracts::{PriRef, SyncEngineConfig, SyncStatus};
use metrics::counter;
use tracing::{debug, instrument, trace};

use crate::buffer::ChannelBuffer;
use crate::channels::{ChannelSet, LockedChannels};
use crate::consumer::CpiConsumer;
use crate::engine::{align, store};
use crate::error::{Result, SyncError};

/// Why a leading run was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Waveform code changed before `cpi_span` messages
    Short,
    /// Full length, but sequence counters skip (incomplete-CPI dropping on)
    Gap,
}

impl RejectReason {
    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Gap => "gap",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking one channel for a complete CPI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpiCheck {
    /// The leading `cpi_span` messages form one CPI
    Complete,
    /// Not enough data to decide yet
    Pending,
    /// The leading run was pruned up to the next waveform boundary
    Rejected(RejectReason),
}

/// Check (and if needed prune) one channel's leading run.
///
/// Needs more than `cpi_span` messages, since the message after the run is
/// what proves the run ended. Scans positions `1..=cpi_span` for the first
/// waveform code change.
pub fn check_channel(
    buffer: &mut ChannelBuffer,
    cpi_span: usize,
    drop_incomplete_cpi: bool,
) -> CpiCheck {
    let cpi_span = cpi_span.max(1);
    if buffer.len() <= cpi_span {
        return CpiCheck::Pending;
    }

    let wrap = buffer.wrap();
    let mut keys = buffer.keys().take(cpi_span + 1);
    let Some(mut prev) = keys.next() else {
        return CpiCheck::Pending;
    };

    let mut gap = false;
    let mut boundary = None;
    for (position, key) in (1..).zip(keys) {
        if key.waveform_code != prev.waveform_code {
            boundary = Some((position, key.sequence_counter));
            break;
        }
        gap |= !wrap.is_successor(prev.sequence_counter, key.sequence_counter);
        prev = key;
    }

    match boundary {
        None => CpiCheck::Pending,
        Some((position, _)) if position == cpi_span && !(drop_incomplete_cpi && gap) => {
            CpiCheck::Complete
        }
        Some((position, sequence_counter)) => {
            buffer.prune_to_sequence_counter(sequence_counter);
            let reason = if position == cpi_span {
                RejectReason::Gap
            } else {
                RejectReason::Short
            };
            trace!(
                channel = buffer.channel_index(),
                position,
                sequence_counter,
                %reason,
                "discarded incomplete cpi"
            );
            CpiCheck::Rejected(reason)
        }
    }
}

/// Aligns channels, confirms a complete CPI on every enabled channel and
/// hands it to a [`CpiConsumer`].
///
/// A rejected run is pruned and the cycle ends; the next `add_data` call
/// tries again, so each call makes at most one pass.
#[derive(Debug)]
pub struct CpiAssembler<C> {
    channels: Arc<ChannelSet>,
    consumer: C,
    cpi_count: u64,
    rejected_count: u64,
}

impl<C: CpiConsumer> CpiAssembler<C> {
    /// Create an assembler with its own channel set.
    ///
    /// The CPI span comes from `config.cpi` (1 when absent).
    pub fn new(config: &SyncEngineConfig, consumer: C) -> Self {
        Self::with_channels(Arc::new(ChannelSet::from_config(config)), consumer)
    }

    /// Create an assembler over an existing channel set
    pub fn with_channels(channels: Arc<ChannelSet>, consumer: C) -> Self {
        debug!(
            channels = channels.channel_count(),
            cpi_span = channels.cpi_span(),
            drop_incomplete_cpi = channels.drop_incomplete_cpi(),
            "cpi assembler created"
        );
        Self {
            channels,
            consumer,
            cpi_count: 0,
            rejected_count: 0,
        }
    }

    /// Store a message and run one align + CPI pass
    #[instrument(
        level = "trace",
        name = "cpi_assembler_add_data",
        skip(self, msg),
        fields(
            sequence_counter = msg.sequence_counter,
            waveform_code = msg.waveform_code
        )
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

    /// Run one pass without new data.
    ///
    /// Returns true if a CPI was delivered.
    pub fn on_message_received(&mut self) -> Result<bool> {
        self.deliver_enable_changes();

        let channels = Arc::clone(&self.channels);
        let mut locked = channels.lock();
        self.run_cycle(&mut locked)
    }

    /// Discard every buffered message
    pub fn reset(&mut self) {
        self.channels.reset();
        debug!("cpi assembler reset");
    }

    /// Shared channel set (configuration and status handle)
    pub fn channels(&self) -> &Arc<ChannelSet> {
        &self.channels
    }

    /// Status snapshot
    pub fn status(&self) -> SyncStatus {
        self.channels.status()
    }

    /// Number of CPIs delivered
    pub fn cpi_count(&self) -> u64 {
        self.cpi_count
    }

    /// Number of leading runs discarded across all channels
    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    /// Borrow the consumer
    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    /// Mutably borrow the consumer
    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    /// Consume the assembler, returning its consumer
    pub fn into_consumer(self) -> C {
        self.consumer
    }

    fn run_cycle(&mut self, locked: &mut LockedChannels<'_>) -> Result<bool> {
        let Some(sequence_counter) = align(locked) else {
            return Ok(false);
        };
        counter!("sidecar_sync_aligned_total").increment(1);

        let cpi_span = self.channels.cpi_span();
        let drop_incomplete_cpi = self.channels.drop_incomplete_cpi();

        // Every channel is checked so short runs are pruned everywhere
        let mut ready = true;
        for buffer in locked.buffers_mut().filter(|b| b.is_enabled()) {
            match check_channel(buffer, cpi_span, drop_incomplete_cpi) {
                CpiCheck::Complete => {}
                CpiCheck::Pending => ready = false,
                CpiCheck::Rejected(reason) => {
                    ready = false;
                    self.rejected_count += 1;
                    counter!("sidecar_sync_cpi_rejected_total", "reason" => reason.as_str())
                        .increment(1);
                }
            }
        }

        if !ready {
            return Ok(false);
        }

        self.cpi_count += 1;
        counter!("sidecar_sync_cpi_total").increment(1);
        trace!(sequence_counter, cpi_span, "cpi complete");

        if self.consumer.process_cpi(locked, cpi_span) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::PriMessage;

    const A: u32 = 0xA;
    const B: u32 = 0xB;

    /// Takes `cpi_span` messages from every enabled channel
    #[derive(Debug, Default)]
    struct CpiRecorder {
        cpis: Vec<Vec<Vec<u32>>>,
    }

    impl CpiConsumer for CpiRecorder {
        fn process_cpi(&mut self, channels: &mut LockedChannels<'_>, cpi_span: usize) -> bool {
            let cpi = channels
                .enabled_indices()
                .into_iter()
                .map(|index| {
                    channels
                        .take_front(index, cpi_span)
                        .iter()
                        .map(|m| m.sequence_counter)
                        .collect()
                })
                .collect();
            self.cpis.push(cpi);
            true
        }
    }

    fn msg(seq: u32, code: u32) -> PriRef {
        PriMessage::video(seq, code).into_ref()
    }

    fn buffer_with(entries: &[(u32, u32)]) -> ChannelBuffer {
        let mut buffer = ChannelBuffer::new(0, 16, true);
        for &(seq, code) in entries {
            buffer.add_data(msg(seq, code));
        }
        buffer
    }

    fn assembler(channels: usize, cpi_span: usize) -> CpiAssembler<CpiRecorder> {
        let config = SyncEngineConfig::uniform(channels, 16, true).with_cpi(cpi_span);
        CpiAssembler::new(&config, CpiRecorder::default())
    }

    #[test]
    fn test_exact_span_complete() {
        let mut buffer = buffer_with(&[(1, A), (2, A), (3, A), (4, A), (5, B), (6, B)]);
        assert_eq!(check_channel(&mut buffer, 4, false), CpiCheck::Complete);
        assert_eq!(buffer.len(), 6);
    }

    #[test]
    fn test_short_run_pruned() {
        let mut buffer = buffer_with(&[(1, A), (2, A), (3, B), (4, B), (5, B)]);
        assert_eq!(
            check_channel(&mut buffer, 4, false),
            CpiCheck::Rejected(RejectReason::Short)
        );
        assert_eq!(buffer.front().unwrap().sequence_counter, 3);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_not_enough_data_pending() {
        let mut buffer = buffer_with(&[(1, A), (2, A), (3, A), (4, A)]);
        assert_eq!(check_channel(&mut buffer, 4, false), CpiCheck::Pending);

        // long run with no boundary yet
        let mut buffer = buffer_with(&[(1, A), (2, A), (3, A), (4, A), (5, A), (6, A)]);
        assert_eq!(check_channel(&mut buffer, 4, false), CpiCheck::Pending);
        assert_eq!(buffer.len(), 6);
    }

    #[test]
    fn test_gap_rejected_only_when_dropping() {
        let entries = [(1, A), (2, A), (4, A), (5, B)];

        let mut buffer = buffer_with(&entries);
        assert_eq!(check_channel(&mut buffer, 3, false), CpiCheck::Complete);

        let mut buffer = buffer_with(&entries);
        assert_eq!(
            check_channel(&mut buffer, 3, true),
            CpiCheck::Rejected(RejectReason::Gap)
        );
        assert_eq!(buffer.front().unwrap().sequence_counter, 5);
    }

    #[test]
    fn test_gap_check_across_wrap() {
        let mut buffer = buffer_with(&[(65534, A), (65535, A), (0, A), (1, B)]);
        assert_eq!(check_channel(&mut buffer, 3, true), CpiCheck::Complete);
    }

    #[test]
    fn test_two_channel_end_to_end() {
        let mut asm = assembler(2, 3);
        let stream = [(1, A), (2, A), (3, A), (4, B)];
        for &(seq, code) in &stream {
            asm.add_data(0, msg(seq, code)).unwrap();
        }
        for &(seq, code) in &stream {
            asm.add_data(1, msg(seq, code)).unwrap();
        }

        assert_eq!(asm.cpi_count(), 1);
        assert_eq!(
            asm.consumer().cpis,
            vec![vec![vec![1, 2, 3], vec![1, 2, 3]]]
        );

        let locked = asm.channels().lock();
        for index in 0..2 {
            let channel = locked.channel(index).unwrap();
            assert_eq!(channel.len(), 1);
            assert_eq!(channel.front().unwrap().sequence_counter, 4);
        }
    }

    #[test]
    fn test_short_cpi_never_delivered() {
        let mut asm = assembler(1, 4);
        for &(seq, code) in &[(1, A), (2, A), (3, B), (4, B), (5, B), (6, B), (7, A)] {
            asm.add_data(0, msg(seq, code)).unwrap();
        }

        assert_eq!(asm.consumer().cpis, vec![vec![vec![3, 4, 5, 6]]]);
        assert_eq!(asm.rejected_count(), 1);
    }

    #[test]
    fn test_runtime_span_change() {
        let mut asm = assembler(1, 4);
        asm.channels().set_cpi_span(2);
        for &(seq, code) in &[(1, A), (2, A), (3, B)] {
            asm.add_data(0, msg(seq, code)).unwrap();
        }
        assert_eq!(asm.consumer().cpis, vec![vec![vec![1, 2]]]);
    }

    #[test]
    fn test_drop_incomplete_from_config() {
        let mut config = SyncEngineConfig::uniform(1, 16, true).with_cpi(3);
        if let Some(cpi) = config.cpi.as_mut() {
            cpi.drop_incomplete_cpi = true;
        }
        let mut asm = CpiAssembler::new(&config, CpiRecorder::default());
        for &(seq, code) in &[(1, A), (3, A), (4, A), (5, B)] {
            asm.add_data(0, msg(seq, code)).unwrap();
        }
        assert!(asm.consumer().cpis.is_empty());
        assert_eq!(asm.rejected_count(), 1);
        assert_eq!(asm.status().total_buffered(), 1);
    }

    #[test]
    fn test_drop_incomplete_enabled_at_runtime() {
        let mut asm = assembler(1, 3);
        for &(seq, code) in &[(1, A), (2, A), (4, A), (5, B)] {
            asm.add_data(0, msg(seq, code)).unwrap();
        }
        assert_eq!(asm.consumer().cpis, vec![vec![vec![1, 2, 4]]]);

        asm.channels().set_drop_incomplete_cpi(true);
        assert!(asm.channels().drop_incomplete_cpi());
        for &(seq, code) in &[(6, B), (8, B), (9, A)] {
            asm.add_data(0, msg(seq, code)).unwrap();
        }
        assert_eq!(asm.consumer().cpis.len(), 1);
        assert_eq!(asm.rejected_count(), 1);
        assert_eq!(asm.channels().lock().front(0).unwrap().sequence_counter, 9);
    }
}
