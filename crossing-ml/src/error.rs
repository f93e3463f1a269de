//! Error types for the crossing-ml crate.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for sampling and training operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed multiplexer setup: wrong weight count, non-positive weight, no sources.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Failed to load checkpoint {}: {message}", path.display())]
    CheckpointLoad { path: PathBuf, message: String },

    #[error("Failed to save checkpoint {}: {message}", path.display())]
    CheckpointSave { path: PathBuf, message: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error(transparent)]
    Core(#[from] crossing_core::CrossingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn checkpoint_load(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::CheckpointLoad {
            path: path.into(),
            message: msg.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
