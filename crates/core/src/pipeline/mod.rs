//! The pipeline orchestrator: fetch, extract, persist, review gate, deliver.

mod runner;
mod types;

pub use runner::PipelineRunner;
pub use types::{RunOptions, RunStage, RunSummary};
