//! Sync engine configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ChannelType;

/// Default per-channel buffer bound
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 10;

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SyncEngineConfig {
    /// Algorithm enabled state. Consumers decide what "disabled" means
    /// (e.g. pass the first enabled channel through untouched).
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum number of messages held per channel
    #[serde(default = "default_max_buffer_size")]
    #[validate(range(min = 1))]
    pub max_buffer_size: usize,

    /// Input channels, in channel-index order
    #[validate(length(min = 1), nested)]
    pub channels: Vec<ChannelConfig>,

    /// CPI assembly settings (absent for plain alignment)
    #[serde(default)]
    #[validate(nested)]
    pub cpi: Option<CpiConfig>,

    /// Sequence counter gap beyond which a smaller counter is read as a
    /// wrap-forward rather than a regression (engine default when absent)
    #[serde(default)]
    #[validate(range(min = 1))]
    pub wrap_threshold: Option<u32>,
}

impl SyncEngineConfig {
    /// Build a configuration of `channel_count` video channels sharing one
    /// bound and one initial enabled state.
    pub fn uniform(channel_count: usize, max_buffer_size: usize, enabled: bool) -> Self {
        let channels = (0..channel_count)
            .map(|index| ChannelConfig {
                name: format!("input{}", index + 1),
                message_type: ChannelType::Video,
                enabled,
                max_buffer_size: None,
            })
            .collect();

        Self {
            enabled: true,
            max_buffer_size,
            channels,
            cpi: None,
            wrap_threshold: None,
        }
    }

    /// Attach CPI settings
    pub fn with_cpi(mut self, cpi_span: usize) -> Self {
        self.cpi = Some(CpiConfig {
            cpi_span,
            drop_incomplete_cpi: false,
        });
        self
    }

    /// Number of configured channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Look up a channel index by name
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    /// Effective bound for one channel
    pub fn channel_max_size(&self, index: usize) -> usize {
        self.channels
            .get(index)
            .and_then(|c| c.max_buffer_size)
            .unwrap_or(self.max_buffer_size)
    }

    /// Configured CPI span, if any
    pub fn cpi_span(&self) -> Option<usize> {
        self.cpi.as_ref().map(|c| c.cpi_span)
    }
}

/// One input channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ChannelConfig {
    /// Channel name (unique)
    #[validate(length(min = 1))]
    pub name: String,

    /// Message type bound to the channel
    #[serde(default)]
    pub message_type: ChannelType,

    /// Initial enabled state
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Per-channel bound overriding `max_buffer_size`
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_buffer_size: Option<usize>,
}

/// CPI assembly configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CpiConfig {
    /// Number of PRIs in a CPI
    #[validate(range(min = 1))]
    pub cpi_span: usize,

    /// Drop a CPI if any of its PRIs are missing
    #[serde(default)]
    pub drop_incomplete_cpi: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_max_buffer_size() -> usize {
    DEFAULT_MAX_BUFFER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_names() {
        let config = SyncEngineConfig::uniform(3, 8, true);
        assert_eq!(config.channel_count(), 3);
        assert_eq!(config.channels[2].name, "input3");
        assert_eq!(config.channel_index("input2"), Some(1));
        assert_eq!(config.channel_max_size(0), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let mut config = SyncEngineConfig::uniform(2, 0, true);
        assert!(config.validate().is_err());

        config.max_buffer_size = 4;
        config = config.with_cpi(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_from_json() {
        let json = r#"{ "channels": [ { "name": "sum" } ] }"#;
        let config: SyncEngineConfig = serde_json::from_str(json).unwrap();
        assert!(config.enabled);
        assert_eq!(config.max_buffer_size, DEFAULT_MAX_BUFFER_SIZE);
        assert_eq!(config.channels[0].message_type, ChannelType::Video);
        assert!(config.channels[0].enabled);
        assert_eq!(config.cpi_span(), None);
    }
}
