//! # Sync Engine
//!
//! Multi-channel PRI stream synchronization and CPI assembly.
//!
//! Responsible for:
//! - bounded per-channel buffering with oldest-first eviction
//! - aligning enabled channels on a wrapping 16-bit sequence counter
//! - detecting CPI boundaries from waveform code changes
//! - dispatching aligned data or complete CPIs to a consumer
//!
//! ## Usage
//!
//! ```ignore
//! use sync_engine::{AlignedConsumer, LockedChannels, SyncController, SyncEngineConfig};
//!
//! struct Sum;
//!
//! impl AlignedConsumer for Sum {
//!     fn process_aligned(&mut self, channels: &mut LockedChannels<'_>) -> bool {
//!         let (fronts, _samples) = channels.pop_enabled_fronts();
//!         !fronts.is_empty()
//!     }
//! }
//!
//! let mut controller = SyncController::new(&SyncEngineConfig::uniform(2, 10, true), Sum);
//! let status_handle = controller.channels().clone();
//!
//! // Deliver messages as they arrive
//! controller.add_data(0, msg)?;
//! println!("{}", status_handle.status());
//! ```

mod buffer;
mod channels;
mod consumer;
mod cpi;
mod engine;
mod error;
mod wrap;

pub use buffer::{AddOutcome, ChannelBuffer, EntryKey};
pub use channels::{ChannelSet, EnabledCallback, LockedChannels};
pub use consumer::{AlignedConsumer, CpiConsumer};
pub use cpi::{check_channel, CpiAssembler, CpiCheck, RejectReason};
pub use engine::SyncController;
pub use error::{Result, SyncError};
pub use wrap::{SequenceWrap, COUNTER_MASK, LEGACY_WRAP_THRESHOLD, WRAP_THRESHOLD};

// Re-export contracts types
pub use contracts::{
    ChannelStatus, ChannelType, CpiConfig, PriMessage, PriPayload, PriRef, SyncEngineConfig,
    SyncStatus,
};
