//! Pipeline orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{EngineMode, Pipeline, PipelineConfig};
pub use stats::PipelineStats;
