//! Errors raised by module implementations

use metricflow_core::CoreError;
use metricflow_resilience::Retryable;
use thiserror::Error;

/// Result type returned by capability calls
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Errors raised by sources, transforms and sinks
///
/// Every variant except [`ModuleError::Control`] makes the current task attempt eligible
/// for a retry.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Connection to an external system failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Data could not be processed
    #[error("Invalid data: {0}")]
    Data(String),

    /// Module configuration cannot be used
    #[error("Invalid module configuration: {0}")]
    Config(String),

    /// Frame or metric operation failed
    #[error("Frame error: {0}")]
    Frame(#[from] CoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Intentional short-circuit that is never retried
    #[error("Task interrupted: {reason}")]
    Control { reason: String },

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ModuleError {
    pub fn connection(message: impl Into<String>) -> Self {
        ModuleError::Connection(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        ModuleError::Data(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        ModuleError::Config(message.into())
    }

    pub fn control(reason: impl Into<String>) -> Self {
        ModuleError::Control {
            reason: reason.into(),
        }
    }

    /// Whether this error bypasses retries
    pub fn is_control(&self) -> bool {
        matches!(self, ModuleError::Control { .. })
    }

    /// Short name of the error class for diagnostics
    pub fn class(&self) -> &'static str {
        match self {
            ModuleError::Connection(_) => "Connection",
            ModuleError::Data(_) => "Data",
            ModuleError::Config(_) => "Config",
            ModuleError::Frame(_) => "Frame",
            ModuleError::Io(_) => "Io",
            ModuleError::Control { .. } => "Control",
            ModuleError::Other(_) => "Other",
        }
    }
}

impl Retryable for ModuleError {
    fn is_retryable(&self) -> bool {
        !self.is_control()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_is_not_retryable() {
        assert!(!ModuleError::control("stop").is_retryable());
        assert!(ModuleError::data("bad").is_retryable());
        assert_eq!(ModuleError::connection("down").class(), "Connection");
    }
}
