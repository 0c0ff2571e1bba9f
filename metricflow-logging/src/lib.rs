//! Structured logging infrastructure for metricflow
//!
//! Logging is configured from the `log_level`, `log_format` and `log_file` settings:
//! - text or JSON output through `tracing-subscriber`
//! - stderr by default, a non-blocking file writer when `log_file` is set
//! - `RUST_LOG` as fallback when the configured level is not a valid filter

pub mod init;
pub mod options;

pub use init::{init_simple_tracing, init_tracing, LoggingGuard};
pub use options::LoggingOptions;
