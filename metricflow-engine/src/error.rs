//! Error types for flow construction and task runs

use metricflow_config::{ConfigError, ValidationErrors};
use metricflow_interfaces::ModuleError;
use metricflow_registry::RegistryError;
use thiserror::Error;

/// Result type for flow construction
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors raised while building a flow from a validated document
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Module with name {name} already exists.")]
    DuplicateModule { name: String },

    #[error("Task with name `{name}` already exists!")]
    DuplicateTask { name: String },

    #[error("Task `{name}` is invalid: {message}")]
    InvalidTask { name: String, message: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A module factory or lifecycle hook failed
    #[error("Module {name} failed: {source}")]
    Module {
        name: String,
        #[source]
        source: ModuleError,
    },

    #[error("Invalid value in validated configuration: {0}")]
    Document(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors aborting the process at startup
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Invalid configuration:\n{0}")]
    Validation(ValidationErrors),

    #[error(transparent)]
    Config(ConfigError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl From<ConfigError> for StartupError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::Validation(errors) => StartupError::Validation(errors),
            other => StartupError::Config(other),
        }
    }
}

impl From<ValidationErrors> for StartupError {
    fn from(errors: ValidationErrors) -> Self {
        StartupError::Validation(errors)
    }
}

impl StartupError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Validation(_) => 2,
            _ => 1,
        }
    }
}

/// Errors of the task run state machine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("Task run {task} cannot be attempted in state {status}")]
    InvalidTransition { task: String, status: String },

    #[error("Unknown task return code `{0}`")]
    UnknownStatus(u8),

    #[error("Task `{0}` is not part of this flow")]
    UnknownTask(String),
}
