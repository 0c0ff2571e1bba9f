//! Flow engine for metricflow
//!
//! This crate turns a validated configuration document into a runnable [`Flow`]:
//! - [`compose`] builds the per-module validation schema from registry fragments
//! - [`loader`] runs the startup sequence (env, header, extensions, strict validation)
//! - [`routing`] decides which transforms and sinks see a source/task pair
//! - [`pipeline`] executes one task run as a state machine
//! - [`extract`] turns raw source records into metrics

pub mod compose;
pub mod error;
pub mod extract;
pub mod flow;
pub mod loader;
pub mod modifiers;
pub mod pipeline;
pub mod routing;
pub mod summary;
pub mod task;

pub use error::{FlowError, FlowResult, StartupError, TaskError};
pub use flow::{Flow, InstanceInfo, RecentTaskIds, SinkInstance, SourceInstance, TransformInstance};
pub use loader::FlowLoader;
pub use modifiers::IoModifiers;
pub use pipeline::{RunStatus, TaskRun, Transition};
pub use routing::RoutingFilters;
pub use task::{ResultSpec, Task};
