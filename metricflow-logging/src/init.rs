use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use metricflow_config::LogFormat;

use crate::options::LoggingOptions;

type Filtered = Layered<reload::Layer<EnvFilter, Registry>, Registry>;

/// Keeps the file writer flushing until dropped
///
/// The guard also holds the handle used to change the level after startup.
#[derive(Debug, Default)]
pub struct LoggingGuard {
    filter: Option<reload::Handle<EnvFilter, Registry>>,
    _file: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Apply the level of `options` to the installed subscriber
    ///
    /// Format and output file are fixed once the subscriber is installed.
    pub fn update(&self, options: &LoggingOptions) -> Result<()> {
        if let Some(handle) = &self.filter {
            handle
                .reload(env_filter(&options.directive()))
                .context("Failed to update log level")?;
        }
        Ok(())
    }
}

fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_writer(path: &Path) -> Result<(BoxMakeWriter, WorkerGuard)> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path {} has no file name", path.display()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(writer), guard))
}

/// Initialize the global subscriber from logging options
///
/// A subscriber that is already installed is kept; the call then only logs at debug.
pub fn init_tracing(options: &LoggingOptions) -> Result<LoggingGuard> {
    let (writer, guard) = match &options.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            (writer, Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };
    let ansi = options.file.is_none();

    let layer: Box<dyn Layer<Filtered> + Send + Sync> = match options.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(false)
            .boxed(),
    };

    let (filter, handle) = reload::Layer::new(env_filter(&options.directive()));

    // Use try_init to avoid panic if global subscriber already set
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .is_ok();
    if !installed {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(LoggingGuard {
        filter: installed.then_some(handle),
        _file: guard,
    })
}

/// Initialize plain text tracing on stderr at `log_level`
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    if tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level))
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }
    Ok(())
}
