//! # crossing-core
//!
//! Shared foundation for the crossing workspace: layered configuration,
//! error types, atomic file persistence and the dataset vocabulary used by
//! the sampling and training crates.

pub mod config;
pub mod error;
pub mod persistence;
pub mod types;

pub use config::{
    CrossingConfig, DatasetConfig, DevicePreference, EarlyStoppingConfig, SamplerConfig,
    config_exists, load_config, load_workspace_config,
};
pub use error::{ConfigError, CrossingError, Result};
pub use types::DatasetKind;
