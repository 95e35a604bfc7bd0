//! Sync engine error types

use contracts::ChannelType;
use thiserror::Error;

/// Errors surfaced by the sync engine.
///
/// Data gaps, drops and wraparound are never errors; they are absorbed by
/// pruning and "not ready" cycles.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Channel index outside the configured range
    #[error("unknown channel index {index} (channel count {count})")]
    UnknownChannel { index: usize, count: usize },

    /// Message payload does not match the channel's bound type
    #[error("channel {index} carries {expected} messages, got {actual}")]
    ChannelTypeMismatch {
        index: usize,
        expected: ChannelType,
        actual: ChannelType,
    },

    /// The consumer callback reported a failure
    #[error("consumer failed processing data aligned at sequence counter {sequence_counter}")]
    ConsumerFailed { sequence_counter: u32 },
}

/// Result type alias for sync engine operations
pub type Result<T> = std::result::Result<T, SyncError>;
