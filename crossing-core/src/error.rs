//! Error types for the crossing core library.
//!
//! Uses `thiserror` for structured variants covering configuration and
//! persistence failures. The sampling/training crate layers its own error
//! enum on top of these.

/// Top-level error type for the core library.
#[derive(Debug, thiserror::Error)]
pub enum CrossingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl From<Box<figment::Error>> for ConfigError {
    fn from(err: Box<figment::Error>) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}

/// A type alias for results using the top-level `CrossingError`.
pub type Result<T> = std::result::Result<T, CrossingError>;
