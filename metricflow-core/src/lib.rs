//! Core record model for metricflow
//!
//! A task run produces a [`MetricFrame`]: an ordered collection of [`Metric`]s extracted
//! from the raw records returned by a source. Transforms mutate the frame in place, after
//! which it is frozen and handed to every sink as an independent copy.

pub mod error;
pub mod flatten;
pub mod frame;
pub mod metric;

pub use error::{CoreError, CoreResult};
pub use frame::MetricFrame;
pub use metric::{Metric, MetricOptions};

/// Separator used for nested attribute paths unless configured otherwise
pub const DEFAULT_SEPARATOR: &str = ".";
