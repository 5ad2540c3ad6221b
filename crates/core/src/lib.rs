pub mod audit;
pub mod cache;
pub mod config;
pub mod delivery;
pub mod extractor;
pub mod health;
pub mod pipeline;
pub mod resilience;
pub mod source;
pub mod store;
pub mod testing;
pub mod transcript;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use health::{HealthMonitor, HealthSnapshot};
pub use pipeline::{PipelineRunner, RunOptions, RunStage, RunSummary};
