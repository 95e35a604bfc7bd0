//! PriMessage - Ingestion output
//!
//! One radar return sweep, stamped with the hardware sequence counter and the
//! waveform (PRF) code that produced it.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Shared, immutable handle to a published PRI message
pub type PriRef = Arc<PriMessage>;

/// PRI (Pulse Repetition Interval) message
///
/// Immutable once published. The sync engine only reads
/// `sequence_counter` and `waveform_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriMessage {
    /// Hardware sequence counter (wraps in a 16-bit space)
    pub sequence_counter: u32,

    /// Waveform code (PRF encoding); a change marks a CPI boundary
    pub waveform_code: u32,

    /// Sample payload (zero-copy)
    pub payload: PriPayload,
}

impl PriMessage {
    /// Create a new message
    pub fn new(sequence_counter: u32, waveform_code: u32, payload: PriPayload) -> Self {
        Self {
            sequence_counter,
            waveform_code,
            payload,
        }
    }

    /// Create a video message with an empty payload
    pub fn video(sequence_counter: u32, waveform_code: u32) -> Self {
        Self::new(sequence_counter, waveform_code, PriPayload::Video(Bytes::new()))
    }

    /// Wrap into a shared reference
    pub fn into_ref(self) -> PriRef {
        Arc::new(self)
    }

    /// Channel type implied by the payload variant
    pub fn channel_type(&self) -> ChannelType {
        self.payload.channel_type()
    }

    /// Number of samples held in the payload
    pub fn sample_count(&self) -> usize {
        self.payload.sample_count()
    }
}

/// PRI payload variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PriPayload {
    /// Video samples, little-endian i16
    Video(Bytes),

    /// Thresholded binary video, one byte per gate
    BinaryVideo(Bytes),

    /// Raw bytes (fallback)
    Raw(Bytes),
}

impl PriPayload {
    /// Channel type carrying this payload
    pub fn channel_type(&self) -> ChannelType {
        match self {
            PriPayload::Video(_) => ChannelType::Video,
            PriPayload::BinaryVideo(_) => ChannelType::BinaryVideo,
            PriPayload::Raw(_) => ChannelType::Raw,
        }
    }

    /// Number of samples (gates)
    pub fn sample_count(&self) -> usize {
        match self {
            PriPayload::Video(data) => data.len() / 2,
            PriPayload::BinaryVideo(data) | PriPayload::Raw(data) => data.len(),
        }
    }

    /// Underlying bytes
    pub fn bytes(&self) -> &Bytes {
        match self {
            PriPayload::Video(data) | PriPayload::BinaryVideo(data) | PriPayload::Raw(data) => {
                data
            }
        }
    }
}

/// Message type bound to an input channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    #[default]
    Video,
    BinaryVideo,
    Raw,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelType::Video => "video",
            ChannelType::BinaryVideo => "binary_video",
            ChannelType::Raw => "raw",
        };
        f.write_str(name)
    }
}
