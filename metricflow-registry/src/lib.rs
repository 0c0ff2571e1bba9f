//! Module registry for metricflow
//!
//! Module implementations are described by a [`ModuleDescriptor`] carrying their type
//! name, schema factories and instance factory. The [`ModuleRegistry`] checks each
//! descriptor's contract once when it is registered and indexes it by category and
//! type name.

pub mod descriptor;
pub mod error;
pub mod registry;

pub use descriptor::{ModuleDescriptor, ModuleFactory, ModuleHandle};
pub use error::{RegistryError, RegistryResult};
pub use registry::ModuleRegistry;
