pub mod config;
pub mod types;

pub use config::{DecisionType, ForesightConfig, ModelConfig, ReactiveConfig, TargetConfig};
pub use types::*;
