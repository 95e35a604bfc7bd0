//! Status snapshot reported by the sync engine for external display.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fill level of one enabled channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatus {
    /// Channel index
    pub index: usize,

    /// Buffered message count (may be slightly stale)
    pub size: usize,
}

/// Read-only status of a sync engine
///
/// Only enabled channels are listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Algorithm enabled state
    pub enabled: bool,

    /// Enabled channels and their sizes
    pub channels: Vec<ChannelStatus>,
}

impl SyncStatus {
    /// Total buffered messages across listed channels
    pub fn total_buffered(&self) -> usize {
        self.channels.iter().map(|c| c.size).sum()
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.enabled {
            return f.write_str("Disabled  ");
        }
        for channel in self.channels.iter().filter(|c| c.size > 0) {
            write!(f, "C{}[{}]  ", channel.index, channel.size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_skips_empty_channels() {
        let status = SyncStatus {
            enabled: true,
            channels: vec![
                ChannelStatus { index: 0, size: 3 },
                ChannelStatus { index: 1, size: 0 },
                ChannelStatus { index: 2, size: 1 },
            ],
        };
        assert_eq!(status.to_string(), "C0[3]  C2[1]  ");
        assert_eq!(status.total_buffered(), 4);
    }

    #[test]
    fn test_display_disabled() {
        let status = SyncStatus {
            enabled: false,
            channels: vec![ChannelStatus { index: 0, size: 3 }],
        };
        assert_eq!(status.to_string(), "Disabled  ");
    }
}
