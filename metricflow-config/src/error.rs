//! Configuration error types

use thiserror::Error;

use crate::schema::ValidationErrors;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading a configuration document
    #[error("Failed to read config file: {0}")]
    FileReadError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// JSON conversion error
    #[error("Failed to convert config: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Schema validation failed
    #[error("Invalid configuration:\n{0}")]
    Validation(#[from] ValidationErrors),

    /// Setting key that does not exist
    #[error("Unknown setting `{key}`")]
    UnknownSetting { key: String },

    /// Setting value rejected by its schema
    #[error("Invalid value for setting `{key}`: {message}")]
    InvalidSetting { key: String, message: String },

    /// Configuration file missing
    #[error("No configuration file found at {path}")]
    MissingFile { path: String },
}

impl ConfigError {
    /// Whether the error is a schema validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, ConfigError::Validation(_))
    }
}
