//! Consumer callbacks driven by the engine.
//!
//! Callbacks run synchronously on the thread that delivered the message,
//! with every channel locked. A consumer pops what it uses through the
//! [`LockedChannels`] handle; the engine never pops on its behalf.
//! Runtime changes made from a callback go through the same handle; the
//! shared `ChannelSet` mutators would wait on locks this cycle holds.

use crate::channels::LockedChannels;

/// Receives batches where every enabled channel's front shares one
/// sequence counter.
pub trait AlignedConsumer {
    /// Process the aligned fronts.
    ///
    /// Expected to pop the front of every enabled channel it used. Returning
    /// `false` reports a failure to the caller of `add_data`.
    fn process_aligned(&mut self, channels: &mut LockedChannels<'_>) -> bool;

    /// A channel was enabled or disabled through the shared handle
    fn channel_enabled_changed(&mut self, _index: usize, _enabled: bool) {}
}

/// Receives complete CPIs: every enabled channel leads with exactly
/// `cpi_span` messages of one waveform code.
pub trait CpiConsumer {
    /// Process one CPI.
    ///
    /// Expected to pop `cpi_span` messages from every enabled channel it
    /// used. Returning `false` reports a failure to the caller of `add_data`.
    fn process_cpi(&mut self, channels: &mut LockedChannels<'_>, cpi_span: usize) -> bool;

    /// A channel was enabled or disabled through the shared handle
    fn channel_enabled_changed(&mut self, _index: usize, _enabled: bool) {}
}
