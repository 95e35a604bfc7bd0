//! # Contracts
//!
//! Frozen interface contracts shared by every SideCar sync crate.
//! All business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Sequence Model
//! - Every PRI message carries a hardware `sequence_counter` that wraps in a 16-bit space
//! - `waveform_code` (PRF encoding) changes mark CPI boundaries

mod blueprint;
mod error;
mod message;
mod status;
mod sync_engine_config;

pub use blueprint::*;
pub use error::*;
pub use message::*;
pub use status::*;
pub use sync_engine_config::*;
