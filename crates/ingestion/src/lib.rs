//! # Ingestion Pipeline
//!
//! PRI data ingestion module.
//!
//! Responsibilities:
//! - Simulated digitizer sources (sequenced, waveform-coded, optionally lossy)
//! - Backpressure management and drop policy
//! - Merge every source into one queue via async-channel
//! - Reference consumers for the sync engine
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{BackpressureConfig, IngestionPipeline};
//!
//! let mut pipeline = IngestionPipeline::from_blueprint(&blueprint, BackpressureConfig::default())?;
//! let rx = pipeline.take_receiver().unwrap();
//! pipeline.start_all()?;
//!
//! while let Ok(item) = rx.recv().await {
//!     controller.add_data(item.channel_index, item.message)?;
//! }
//! ```

mod config;
mod consumers;
mod error;
mod mock;
mod pipeline;

// Re-exports
pub use config::{BackpressureConfig, DropPolicy, IngestionMetrics, MetricsSnapshot};
pub use consumers::{CpiBatch, CpiBatcher, PassThroughSummer};
pub use contracts::PriMessage;
pub use error::{IngestionError, Result};
pub use mock::{ChannelMessage, MockPriConfig, MockPriSource, PriGenerator};
pub use pipeline::IngestionPipeline;
