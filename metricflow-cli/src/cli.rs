//! CLI argument parsing definitions
//!
//! Every setting becomes a long option named after its key with dashes, e.g.
//! `--task-name-prefix`. Boolean settings accept an optional value, so `--run-once` and
//! `--run-once=false` both work. Values given here are persistent: the configuration
//! header and its extensions cannot override them.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::Value;

use metricflow_config::{SettingSpec, Settings};

/// Long option of a setting
pub fn long_name(spec: &SettingSpec) -> String {
    spec.key.replace('_', "-")
}

fn arg(spec: &SettingSpec) -> Arg {
    let arg = Arg::new(spec.key)
        .long(long_name(spec))
        .help(spec.help)
        .action(ArgAction::Set);

    if spec.is_flag {
        arg.value_name("BOOL")
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true")
    } else {
        arg.value_name("VALUE").num_args(1)
    }
}

/// The `metricflow` command
pub fn command() -> Command {
    Command::new("metricflow")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Declarative metrics collection pipeline")
        .args(Settings::specs().iter().map(arg))
}

/// Apply the settings given on the command line as persistent values
pub fn apply_matches(matches: &ArgMatches, settings: &mut Settings) -> Result<()> {
    for spec in Settings::specs() {
        let Some(value) = matches.get_one::<String>(spec.key) else {
            continue;
        };
        settings
            .set(spec.key, Value::String(value.clone()), true)
            .with_context(|| format!("Invalid value for --{}", long_name(spec)))?;
    }
    Ok(())
}
