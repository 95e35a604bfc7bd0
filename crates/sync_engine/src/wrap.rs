//! Wraparound-aware sequence counter comparison.
//!
//! Hardware counters wrap in a 16-bit space even though they travel in a
//! `u32`. A counter that is numerically smaller than another by more than the
//! threshold is read as having wrapped forward past it.

/// Default threshold: half of the 16-bit counter space.
pub const WRAP_THRESHOLD: u32 = 1 << 15;

/// Threshold used by the legacy SideCar hardware interface.
///
/// With 16-bit counters no numeric gap can exceed it, so wraparound is never
/// detected; kept for deployments that depend on that behaviour.
pub const LEGACY_WRAP_THRESHOLD: u32 = 1 << 16;

/// Mask of the counter bits that actually advance.
pub const COUNTER_MASK: u32 = 0xFFFF;

/// Sequence counter ordering under wraparound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceWrap {
    threshold: u32,
}

impl Default for SequenceWrap {
    fn default() -> Self {
        Self {
            threshold: WRAP_THRESHOLD,
        }
    }
}

impl SequenceWrap {
    /// Use a custom wrap threshold
    pub fn with_threshold(threshold: u32) -> Self {
        Self { threshold }
    }

    /// Current threshold
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Returns true if `front` comes before `target`.
    #[inline]
    pub fn is_older(&self, front: u32, target: u32) -> bool {
        target > front || (target < front && front - target > self.threshold)
    }

    /// Returns true if `candidate` should replace `current` as the running
    /// maximum: it is larger, or smaller by more than the threshold (the
    /// running maximum is stale pre-wrap data).
    #[inline]
    pub fn advances(&self, current: u32, candidate: u32) -> bool {
        self.is_older(current, candidate)
    }

    /// Returns true if `next` immediately follows `prev` in the 16-bit space.
    #[inline]
    pub fn is_successor(&self, prev: u32, next: u32) -> bool {
        next.wrapping_sub(prev) & COUNTER_MASK == 1
    }
}
