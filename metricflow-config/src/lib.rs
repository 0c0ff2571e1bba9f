//! Configuration handling for metricflow
//!
//! This crate provides:
//! - a composable schema engine validating configuration documents ([`schema`])
//! - leaf parsers for environment references, durations, cron expressions and names
//! - process [`Settings`] with environment and command line overrides
//! - template extension merging and task repetition ([`merge`], [`repeat`])
//! - YAML document loading ([`loader`])

pub mod error;
pub mod loader;
pub mod merge;
pub mod repeat;
pub mod schema;
pub mod settings;
pub mod validators;

pub use error::{ConfigError, ConfigResult};
pub use schema::{
    optional_subschema, ExtraKeys, Field, Invalid, InvalidKind, MapSchema, PathSegment, Presence,
    Schema, ValidationContext, ValidationErrors,
};
pub use settings::{LogFormat, LogLevel, SettingSpec, Settings, ENV_PREFIX};
pub use validators::CronSchedule;
