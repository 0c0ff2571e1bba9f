//! # Metricflow Interfaces
//!
//! Capability traits shared by the module registry, the flow engine and every module
//! implementation.
//!
//! ## Main Interfaces
//!
//! - [`Source`] - fetches raw records for a scheduled task
//! - [`Transform`] - mutates a frame in place, ordered by priority
//! - [`Sink`] - consumes its own copy of a frozen frame
//! - [`ModuleType`], [`SourceType`], [`ProcessorType`] - type-level declarations used to
//!   register a module implementation

pub mod capability;
pub mod error;
pub mod spec;

pub use capability::{
    Module, ModuleCategory, ModuleType, ProcessorType, Record, Sink, Source, SourceType,
    Transform,
};
pub use error::{ModuleError, ModuleResult};
pub use spec::ModuleSpec;
