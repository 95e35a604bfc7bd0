//! Ingestion error types

use thiserror::Error;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Source refers to a channel the engine does not have
    #[error("source refers to unknown channel '{channel}'")]
    UnknownChannel {
        /// Channel name
        channel: String,
    },

    /// Source parameters cannot drive a generator
    #[error("invalid source for channel '{channel}': {message}")]
    InvalidSource {
        /// Channel name
        channel: String,
        /// Error message
        message: String,
    },

    /// Delivery queue closed
    #[error("delivery queue closed for channel {channel}")]
    ChannelClosed {
        /// Channel name
        channel: String,
    },

    /// Source already running
    #[error("source for channel {channel} is already running")]
    AlreadyRunning {
        /// Channel name
        channel: String,
    },
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
