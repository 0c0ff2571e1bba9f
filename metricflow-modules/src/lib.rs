//! Built-in modules for metricflow
//!
//! - [`sources::StaticSource`] - records taken verbatim from task parameters
//! - [`transforms::KeyMapping`], [`transforms::SimpleFilter`], [`transforms::Expression`]
//! - [`sinks::StdoutSink`] - flat JSON documents on stdout, optionally rate limited
//! - [`sinks::MemorySink`] - frame copies collected in a named in-process buffer

pub mod sinks;
pub mod sources;
pub mod transforms;

use metricflow_registry::{ModuleDescriptor, ModuleRegistry, RegistryResult};

pub use sinks::{MemoryBuffer, MemorySink, StdoutSink};
pub use sources::StaticSource;
pub use transforms::{Expression, KeyMapping, SimpleFilter};

/// Descriptors of every built-in module
pub fn builtin() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::source::<StaticSource>(),
        ModuleDescriptor::transform::<KeyMapping>(),
        ModuleDescriptor::transform::<SimpleFilter>(),
        ModuleDescriptor::transform::<Expression>(),
        ModuleDescriptor::sink::<StdoutSink>(),
        ModuleDescriptor::sink::<MemorySink>(),
    ]
}

/// Registry holding the built-in modules
pub fn registry() -> RegistryResult<ModuleRegistry> {
    ModuleRegistry::with_modules(builtin())
}
