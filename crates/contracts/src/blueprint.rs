//! PipelineBlueprint - Config Loader output
//!
//! Describes one hosted algorithm: its sync engine settings and the PRI
//! sources that feed its input channels.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::SyncEngineConfig;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete pipeline blueprint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Hosted algorithm identity
    #[validate(nested)]
    pub algorithm: AlgorithmConfig,

    /// Sync engine settings
    #[validate(nested)]
    pub engine: SyncEngineConfig,

    /// PRI sources, one per fed channel
    #[serde(default)]
    #[validate(nested)]
    pub sources: Vec<SourceConfig>,
}

/// Hosted algorithm identity
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AlgorithmConfig {
    /// Algorithm name, used in logs and metric labels
    #[validate(length(min = 1))]
    pub name: String,
}

/// Simulated PRI source feeding one channel
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SourceConfig {
    /// Name of the channel this source feeds
    #[validate(length(min = 1))]
    pub channel: String,

    /// Pulse repetition frequency (Hz)
    #[serde(default = "default_prf_hz")]
    pub prf_hz: f64,

    /// First sequence counter emitted
    #[serde(default)]
    pub start_sequence: u32,

    /// PRIs emitted per waveform code before switching to the next
    #[serde(default = "default_pulses_per_cpi")]
    #[validate(range(min = 1))]
    pub pulses_per_cpi: usize,

    /// Waveform codes cycled through, one per CPI
    #[serde(default = "default_waveform_codes")]
    #[validate(length(min = 1))]
    pub waveform_codes: Vec<u32>,

    /// Probability that a PRI is dropped before delivery
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub drop_probability: f64,

    /// Samples (range gates) per PRI
    #[serde(default = "default_samples")]
    pub samples: usize,
}

fn default_prf_hz() -> f64 {
    1000.0
}

fn default_pulses_per_cpi() -> usize {
    16
}

fn default_waveform_codes() -> Vec<u32> {
    vec![1, 2]
}

fn default_samples() -> usize {
    256
}
