//! Startup sequence of the `metricflow` binary

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use metricflow_config::Settings;
use metricflow_engine::summary::startup_summary;
use metricflow_engine::{Flow, FlowLoader, RunStatus, StartupError};
use metricflow_logging::{init_tracing, LoggingOptions};

use crate::cli;
use crate::dispatcher::Dispatcher;
use crate::readiness;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Process exit status for an error returned by [`run`]
///
/// Validation failures exit with 2, everything else with 1.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<StartupError>()
        .map(StartupError::exit_code)
        .unwrap_or(1)
}

/// Resolve settings from the environment and the command line
pub fn settings_from_args<I, T>(args: I) -> Result<Settings>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = cli::command().get_matches_from(args);
    let mut settings = Settings::from_env().context("Invalid setting in environment")?;
    cli::apply_matches(&matches, &mut settings)?;
    Ok(settings)
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(target: "metricflow", error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn report_runs(runs: &[metricflow_engine::TaskRun]) {
    let failed = runs.iter().filter(|r| !r.status().is_success()).count();
    for run in runs {
        tracing::debug!(
            target: "metricflow",
            task = %run.task(),
            status = %run.status(),
            attempts = run.attempts(),
            "Task run result"
        );
    }
    if failed > 0 {
        tracing::warn!(target: "metricflow", "{} of {} task(s) did not succeed", failed, runs.len());
    }
}

/// Execute a loaded flow until it is done or interrupted
pub async fn execute(flow: Arc<Flow>) -> Result<Vec<RunStatus>> {
    flow.connect()?;

    let dispatcher = Dispatcher::new(flow.clone());
    let statuses = if flow.settings().run_once {
        let runs = dispatcher.run_once().await;
        report_runs(&runs);
        runs.iter().map(|r| r.status()).collect()
    } else {
        tracing::info!(target: "metricflow", "Scheduling tasks, press Ctrl-C to stop");
        dispatcher.run(wait_for_ctrl_c()).await;
        Vec::new()
    };

    flow.shutdown();
    Ok(statuses)
}

/// Run the application with the given process arguments
pub async fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let settings = settings_from_args(args)?;
    let logging = init_tracing(&LoggingOptions::from(&settings))?;
    tracing::info!(target: "metricflow", version = VERSION, "Starting metricflow");

    let registry = Arc::new(metricflow_modules::registry()?);
    let flow = FlowLoader::new(registry, settings).load()?;
    logging.update(&LoggingOptions::from(flow.settings()))?;

    if flow.settings().print_config {
        println!("{}", serde_json::to_string_pretty(flow.configuration())?);
    }

    if flow.settings().only_validate {
        tracing::info!(target: "metricflow", "Configuration is valid.");
        return Ok(());
    }

    if !flow.settings().hide_welcome {
        eprintln!("{}", startup_summary(&flow, VERSION, Utc::now()));
    }

    let flow = Arc::new(flow);
    if !flow.settings().disable_readiness_probe {
        let port = flow.settings().readiness_port;
        match readiness::serve(flow.clone(), port).await {
            Ok(addr) => tracing::info!(
                target: "metricflow",
                "Started readiness endpoint on port {}.",
                addr.port()
            ),
            Err(e) => tracing::error!(
                target: "metricflow",
                error = %format!("{e:#}"),
                "Readiness endpoint unavailable"
            ),
        }
    }

    execute(flow).await?;
    tracing::info!(target: "metricflow", "Goodbye!");
    Ok(())
}
