//! Core error types for the metric model

use thiserror::Error;

/// Result type alias for the metric model
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by frames and metrics
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// A frozen frame was mutated
    #[error("Frame `{frame}` is frozen and cannot be modified")]
    FrameFrozen { frame: String },

    /// A metric without value while absent metrics are not allowed
    #[error("Metric value is absent and absent metrics are not allowed")]
    AbsentMetric,

    /// A metric value that is not a number
    #[error("Metric field `{field}` holds a non-numeric value: {value}")]
    NonNumericMetric { field: String, value: String },

    /// An attribute path runs through a value that is not a mapping
    #[error("Attribute path `{path}` conflicts with a non-mapping value")]
    PathConflict { path: String },

    /// Index outside the frame
    #[error("Index {index} is out of bounds for frame of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}
