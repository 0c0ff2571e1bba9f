//! Capability traits for sources, transforms and sinks
//!
//! A module implements the call trait of its category ([`Source`], [`Transform`] or
//! [`Sink`]) plus the type-level [`ModuleType`] declarations the registry reads when the
//! module is registered. The call signatures are fixed by these traits, so a registered
//! module always has the shape its category requires.

use std::fmt;

use metricflow_config::Schema;
use metricflow_core::MetricFrame;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ModuleResult;
use crate::spec::ModuleSpec;

/// One raw record returned by a source
pub type Record = Map<String, Value>;

/// Module categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleCategory {
    Source,
    Transform,
    Sink,
}

impl ModuleCategory {
    pub const ALL: [ModuleCategory; 3] = [
        ModuleCategory::Source,
        ModuleCategory::Transform,
        ModuleCategory::Sink,
    ];

    /// Key of the configuration list holding modules of this category
    pub fn config_key(&self) -> &'static str {
        match self {
            ModuleCategory::Source => "sources",
            ModuleCategory::Transform => "transforms",
            ModuleCategory::Sink => "sinks",
        }
    }

    /// Short tag used in startup summaries
    pub fn tag(&self) -> &'static str {
        match self {
            ModuleCategory::Source => "SRC",
            ModuleCategory::Transform => "TR",
            ModuleCategory::Sink => "SNK",
        }
    }
}

impl fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleCategory::Source => "source",
            ModuleCategory::Transform => "transform",
            ModuleCategory::Sink => "sink",
        };
        f.write_str(name)
    }
}

/// Lifecycle hooks shared by every module
///
/// Hooks are only invoked for enabled modules.
pub trait Module: Send + Sync {
    /// Called once before the first task run
    fn on_connect(&self) -> ModuleResult<()> {
        Ok(())
    }

    /// Called before shutdown, e.g. to flush buffers
    fn on_pre_shutdown(&self) -> ModuleResult<()> {
        Ok(())
    }

    /// Called at shutdown
    fn on_shutdown(&self) -> ModuleResult<()> {
        Ok(())
    }
}

/// Produces raw records for a task
pub trait Source: Module {
    /// Fetch records using the task's validated parameters
    fn fetch(&self, params: Value) -> ModuleResult<Vec<Record>>;
}

/// Mutates a frame in place
pub trait Transform: Module {
    fn apply(&self, frame: &mut MetricFrame) -> ModuleResult<()>;
}

/// Consumes a copy of a frozen frame
pub trait Sink: Module {
    fn emit(&self, frame: MetricFrame) -> ModuleResult<()>;
}

/// Type-level declarations of a module implementation
pub trait ModuleType: Sized + Send + Sync + 'static {
    /// Unique type name within the module's category
    const TYPE_NAME: &'static str;

    /// Human readable description
    const DOC: &'static str = "";

    /// Schema of the `connection` section
    fn connection_schema() -> Schema {
        Schema::empty_map()
    }

    /// Build an instance from its validated configuration
    fn create(spec: &ModuleSpec) -> ModuleResult<Self>;
}

/// Declarations of a source implementation
pub trait SourceType: Source + ModuleType {
    /// Schema of each task's `params` section
    fn task_params_schema() -> Schema {
        Schema::empty_map()
    }
}

/// Declarations of a transform or sink implementation
pub trait ProcessorType: ModuleType {
    /// Schema of the `params` section
    fn params_schema() -> Schema {
        Schema::empty_map()
    }
}
