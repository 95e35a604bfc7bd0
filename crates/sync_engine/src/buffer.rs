//! Per-channel bounded FIFO with sequence-counter pruning.
//!
//! Uses index-based separation:
//! - HeapRb stores lightweight metadata (sequence counter, waveform code, slab key)
//! - Slab stores the shared PRI messages
//!
//! Alignment and CPI scans only walk the metadata ring.

use std::fmt;

use contracts::PriRef;
use ringbuf::{traits::*, HeapRb};
use slab::Slab;

use crate::wrap::SequenceWrap;

/// Lightweight metadata stored in ring buffer
#[derive(Debug, Clone, Copy)]
struct MessageMeta {
    sequence_counter: u32,
    waveform_code: u32,
    slab_key: usize,
}

/// Sequence counter and waveform code of one buffered message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryKey {
    pub sequence_counter: u32,
    pub waveform_code: u32,
}

/// Result of [`ChannelBuffer::add_data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Channel is disabled; the message was ignored
    Ignored,
    /// Message stored; `evicted` oldest messages were dropped to honour the bound
    Stored { evicted: usize },
}

/// Input buffer for one channel
pub struct ChannelBuffer {
    channel_index: usize,
    /// Ring buffer of metadata, front = oldest
    index: HeapRb<MessageMeta>,
    /// Actual message storage
    storage: Slab<PriRef>,
    max_size: usize,
    enabled: bool,
    next_sequence_counter: u32,
    wrap: SequenceWrap,
    evicted_count: u64,
    pruned_count: u64,
}

impl fmt::Debug for ChannelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBuffer")
            .field("channel_index", &self.channel_index)
            .field("len", &self.index.occupied_len())
            .field("max_size", &self.max_size)
            .field("enabled", &self.enabled)
            .field("next_sequence_counter", &self.next_sequence_counter)
            .finish()
    }
}

impl ChannelBuffer {
    /// Short parameter name for a channel's enabled flag: `input{N}Enabled`
    pub fn generic_short_name(index: usize) -> String {
        format!("input{}Enabled", index + 1)
    }

    /// Long parameter name for a channel's enabled flag: `Input {N} Enabled`
    pub fn generic_long_name(index: usize) -> String {
        format!("Input {} Enabled", index + 1)
    }

    /// Create a new channel buffer
    pub fn new(channel_index: usize, max_size: usize, enabled: bool) -> Self {
        Self::with_wrap(channel_index, max_size, enabled, SequenceWrap::default())
    }

    /// Create a new channel buffer with a custom wraparound rule
    pub fn with_wrap(
        channel_index: usize,
        max_size: usize,
        enabled: bool,
        wrap: SequenceWrap,
    ) -> Self {
        let max_size = max_size.max(1);
        Self {
            channel_index,
            index: HeapRb::new(max_size),
            storage: Slab::with_capacity(max_size),
            max_size,
            enabled,
            next_sequence_counter: 0,
            wrap,
            evicted_count: 0,
            pruned_count: 0,
        }
    }

    /// Append a message, evicting the oldest ones if the bound is exceeded.
    ///
    /// Disabled channels ignore all messages.
    pub fn add_data(&mut self, msg: PriRef) -> AddOutcome {
        if !self.enabled {
            return AddOutcome::Ignored;
        }

        let mut evicted = 0;
        if self.index.is_full() {
            self.remove_front();
            evicted += 1;
        }

        let meta = MessageMeta {
            sequence_counter: msg.sequence_counter,
            waveform_code: msg.waveform_code,
            slab_key: self.storage.insert(msg),
        };
        let _ = self.index.try_push(meta);

        evicted += self.trim_to(self.max_size);
        self.evicted_count += evicted as u64;
        self.sync_next_sequence_counter();

        AddOutcome::Stored { evicted }
    }

    /// Remove messages from the front whose sequence counter is older than
    /// `sequence_counter`.
    ///
    /// Returns true if the buffer is left holding a message with exactly that
    /// counter at its front.
    pub fn prune_to_sequence_counter(&mut self, sequence_counter: u32) -> bool {
        while let Some(front) = self.front_meta() {
            if !self.wrap.is_older(front.sequence_counter, sequence_counter) {
                break;
            }
            self.remove_front();
            self.pruned_count += 1;
        }
        self.sync_next_sequence_counter();

        self.front_meta()
            .is_some_and(|front| front.sequence_counter == sequence_counter)
    }

    /// Change the bound, trimming the oldest messages immediately.
    pub fn set_max_size(&mut self, max_size: usize) {
        let max_size = max_size.max(1);
        self.evicted_count += self.trim_to(max_size) as u64;
        self.max_size = max_size;

        // Rebuild index with the new capacity (only moves small metadata)
        let mut resized = HeapRb::new(max_size);
        for meta in self.index.pop_iter() {
            let _ = resized.try_push(meta);
        }
        self.index = resized;
        self.sync_next_sequence_counter();
    }

    /// Change the enabled state.
    ///
    /// Any transition discards the buffered messages. Returns true if the
    /// state changed.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if self.enabled == enabled {
            return false;
        }
        self.enabled = enabled;
        self.reset();
        true
    }

    /// Forget all held messages
    pub fn reset(&mut self) {
        self.index.pop_iter().for_each(drop);
        self.storage.clear();
        self.next_sequence_counter = 0;
    }

    /// Remove and return the oldest message
    pub fn pop_front(&mut self) -> Option<PriRef> {
        let msg = self.remove_front();
        self.sync_next_sequence_counter();
        msg
    }

    /// Oldest message without removing it
    pub fn front(&self) -> Option<&PriRef> {
        self.get(0)
    }

    /// Message at `position` from the front
    pub fn get(&self, position: usize) -> Option<&PriRef> {
        self.index
            .iter()
            .nth(position)
            .and_then(|meta| self.storage.get(meta.slab_key))
    }

    /// Sequence counter and waveform code of each buffered message, oldest first
    pub fn keys(&self) -> impl Iterator<Item = EntryKey> + '_ {
        self.index.iter().map(|meta| EntryKey {
            sequence_counter: meta.sequence_counter,
            waveform_code: meta.waveform_code,
        })
    }

    /// Buffered messages, oldest first
    pub fn messages(&self) -> impl Iterator<Item = &PriRef> + '_ {
        self.index
            .iter()
            .filter_map(|meta| self.storage.get(meta.slab_key))
    }

    /// Channel index assigned at construction
    #[inline]
    pub fn channel_index(&self) -> usize {
        self.channel_index
    }

    /// Current bound
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of buffered messages
    #[inline]
    pub fn len(&self) -> usize {
        self.index.occupied_len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// A disabled buffer ignores all `add_data` calls
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sequence counter of the front message, or 0 when empty
    #[inline]
    pub fn next_sequence_counter(&self) -> u32 {
        self.next_sequence_counter
    }

    /// Wraparound rule used for pruning
    #[inline]
    pub fn wrap(&self) -> SequenceWrap {
        self.wrap
    }

    /// Messages dropped to honour the bound
    #[inline]
    pub fn evicted_count(&self) -> u64 {
        self.evicted_count
    }

    /// Messages discarded by sequence or CPI pruning
    #[inline]
    pub fn pruned_count(&self) -> u64 {
        self.pruned_count
    }

    fn front_meta(&self) -> Option<MessageMeta> {
        self.index.iter().next().copied()
    }

    fn remove_front(&mut self) -> Option<PriRef> {
        let meta = self.index.try_pop()?;
        self.storage.try_remove(meta.slab_key)
    }

    fn trim_to(&mut self, limit: usize) -> usize {
        let mut removed = 0;
        while self.len() > limit {
            self.remove_front();
            removed += 1;
        }
        removed
    }

    fn sync_next_sequence_counter(&mut self) {
        self.next_sequence_counter = self.front_meta().map_or(0, |m| m.sequence_counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::PriMessage;
    use proptest::prelude::*;

    fn msg(seq: u32) -> PriRef {
        PriMessage::video(seq, 1).into_ref()
    }

    fn fronts(buffer: &ChannelBuffer) -> Vec<u32> {
        buffer.keys().map(|k| k.sequence_counter).collect()
    }

    #[test]
    fn test_generic_names() {
        assert_eq!(ChannelBuffer::generic_short_name(0), "input1Enabled");
        assert_eq!(ChannelBuffer::generic_long_name(2), "Input 3 Enabled");
    }

    #[test]
    fn test_add_sets_next_sequence_counter() {
        let mut buffer = ChannelBuffer::new(0, 4, true);
        assert_eq!(buffer.next_sequence_counter(), 0);

        buffer.add_data(msg(42));
        buffer.add_data(msg(43));
        assert_eq!(buffer.next_sequence_counter(), 42);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buffer = ChannelBuffer::new(0, 3, true);

        for seq in 1..=4 {
            buffer.add_data(msg(seq));
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.evicted_count(), 1);
        assert_eq!(fronts(&buffer), vec![2, 3, 4]);
        assert_eq!(buffer.next_sequence_counter(), 2);
    }

    #[test]
    fn test_disabled_ignores_data() {
        let mut buffer = ChannelBuffer::new(0, 3, false);
        assert_eq!(buffer.add_data(msg(1)), AddOutcome::Ignored);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_prune_to_present_counter() {
        let mut buffer = ChannelBuffer::new(0, 10, true);
        for seq in [5, 6, 7, 8] {
            buffer.add_data(msg(seq));
        }

        assert!(buffer.prune_to_sequence_counter(7));
        assert_eq!(fronts(&buffer), vec![7, 8]);
        assert_eq!(buffer.pruned_count(), 2);
    }

    #[test]
    fn test_prune_to_missing_counter() {
        let mut buffer = ChannelBuffer::new(0, 10, true);
        for seq in [5, 6, 8] {
            buffer.add_data(msg(seq));
        }

        // 7 was dropped upstream; front moves to the next newer message
        assert!(!buffer.prune_to_sequence_counter(7));
        assert_eq!(buffer.next_sequence_counter(), 8);

        // target beyond everything empties the buffer
        assert!(!buffer.prune_to_sequence_counter(100));
        assert!(buffer.is_empty());
        assert_eq!(buffer.next_sequence_counter(), 0);
    }

    #[test]
    fn test_prune_empty_is_noop() {
        let mut buffer = ChannelBuffer::new(0, 10, true);
        assert!(!buffer.prune_to_sequence_counter(3));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_prune_across_wraparound() {
        let mut buffer = ChannelBuffer::new(0, 10, true);
        for seq in [65533, 65534, 65535, 0, 1, 2] {
            buffer.add_data(msg(seq));
        }

        assert!(buffer.prune_to_sequence_counter(1));
        assert_eq!(fronts(&buffer), vec![1, 2]);
        assert_eq!(buffer.next_sequence_counter(), 1);
    }

    #[test]
    fn test_set_max_size_trims_immediately() {
        let mut buffer = ChannelBuffer::new(0, 10, true);
        for seq in 1..=6 {
            buffer.add_data(msg(seq));
        }

        buffer.set_max_size(2);
        assert_eq!(buffer.max_size(), 2);
        assert_eq!(fronts(&buffer), vec![5, 6]);
        assert_eq!(buffer.next_sequence_counter(), 5);

        // growing keeps contents and accepts more
        buffer.set_max_size(4);
        buffer.add_data(msg(7));
        buffer.add_data(msg(8));
        assert_eq!(fronts(&buffer), vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_set_enabled_clears() {
        let mut buffer = ChannelBuffer::new(0, 10, true);
        buffer.add_data(msg(1));
        buffer.add_data(msg(2));

        assert!(buffer.set_enabled(false));
        assert!(buffer.is_empty());
        assert_eq!(buffer.next_sequence_counter(), 0);

        assert!(!buffer.set_enabled(false));
        assert!(buffer.set_enabled(true));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_pop_front_updates_counter() {
        let mut buffer = ChannelBuffer::new(0, 10, true);
        buffer.add_data(msg(3));
        buffer.add_data(msg(4));

        assert_eq!(buffer.pop_front().unwrap().sequence_counter, 3);
        assert_eq!(buffer.next_sequence_counter(), 4);
        assert_eq!(buffer.pop_front().unwrap().sequence_counter, 4);
        assert_eq!(buffer.next_sequence_counter(), 0);
        assert!(buffer.pop_front().is_none());
    }

    #[test]
    fn test_get_and_messages() {
        let mut buffer = ChannelBuffer::new(0, 10, true);
        for seq in [10, 11, 12] {
            buffer.add_data(msg(seq));
        }

        assert_eq!(buffer.get(1).unwrap().sequence_counter, 11);
        assert!(buffer.get(3).is_none());
        let seqs: Vec<u32> = buffer.messages().map(|m| m.sequence_counter).collect();
        assert_eq!(seqs, vec![10, 11, 12]);
    }

    proptest! {
        #[test]
        fn prop_len_never_exceeds_bound(
            max_size in 1usize..16,
            seqs in proptest::collection::vec(0u32..70_000, 0..64),
        ) {
            let mut buffer = ChannelBuffer::new(0, max_size, true);
            for seq in seqs {
                buffer.add_data(msg(seq));
                prop_assert!(buffer.len() <= max_size);
            }
        }

        #[test]
        fn prop_prune_is_idempotent(
            start in 0u32..65_536,
            count in 0usize..20,
            offset in 0u32..30,
        ) {
            let mut buffer = ChannelBuffer::new(0, 32, true);
            for i in 0..count as u32 {
                buffer.add_data(msg((start + i) & 0xFFFF));
            }
            let target = (start + offset) & 0xFFFF;

            let first = buffer.prune_to_sequence_counter(target);
            let snapshot = fronts(&buffer);
            let second = buffer.prune_to_sequence_counter(target);

            prop_assert_eq!(first, second);
            prop_assert_eq!(snapshot, fronts(&buffer));
        }
    }
}
