//! metricflow command line application
//!
//! The binary is a thin wrapper around [`app::run`]; the argument definitions and the
//! cron dispatcher live here so they can be tested without spawning a process.

pub mod app;
pub mod cli;
pub mod dispatcher;
pub mod readiness;

pub use app::{exit_code, run};
pub use dispatcher::Dispatcher;
