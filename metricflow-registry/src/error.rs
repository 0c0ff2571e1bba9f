//! Registry error types

use metricflow_interfaces::ModuleCategory;
use thiserror::Error;

/// Registry result type
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Two descriptors share a type name within one category
    #[error("Extension with id {name} already exists! Please define a custom id.")]
    DuplicateType {
        category: ModuleCategory,
        name: String,
    },

    /// No descriptor with this type name
    #[error("Module of name `{name}` is unknown")]
    UnknownModule {
        category: ModuleCategory,
        name: String,
    },

    /// Descriptor does not satisfy the module contract
    #[error("Module `{name}` violates the module contract: {reason}")]
    ContractViolation { name: String, reason: String },
}
