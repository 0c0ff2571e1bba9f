//! Logging options derived from settings

use std::path::PathBuf;

use metricflow_config::{LogFormat, LogLevel, Settings};

/// Options of the global tracing subscriber
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoggingOptions {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Write to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl LoggingOptions {
    /// Filter directive for the configured level
    ///
    /// Every crate logs at the configured level. Dependencies are capped at `warn` unless
    /// the level is more verbose than `info`.
    pub fn directive(&self) -> String {
        match self.level {
            LogLevel::Debug | LogLevel::Trace => self.level.as_str().to_string(),
            level => format!("warn,{}", crate_directives(level.as_str())),
        }
    }
}

fn crate_directives(level: &str) -> String {
    [
        "metricflow",
        "metricflow_config",
        "metricflow_engine",
        "metricflow_modules",
        "metricflow_registry",
        "config",
        "settings",
        "loader",
        "module_registry",
        "flow",
        "task",
        "dispatcher",
        "modules",
    ]
    .iter()
    .map(|target| format!("{target}={level}"))
    .collect::<Vec<_>>()
    .join(",")
}

impl From<&Settings> for LoggingOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            level: settings.log_level,
            format: settings.log_format,
            file: settings.log_file.as_ref().map(PathBuf::from),
        }
    }
}
