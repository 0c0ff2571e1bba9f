//! Process settings
//!
//! Every setting has a typed default and a schema. Values are taken, in order of
//! increasing precedence, from the defaults, `METRICFLOW_<KEY>` environment variables,
//! the `flow.settings` header of the configuration and its extensions, and the command
//! line. A key set from the command line is persistent: later configuration-driven
//! updates of that key are ignored.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{Field, Schema};

/// Prefix of environment variables overriding settings
pub const ENV_PREFIX: &str = "METRICFLOW";

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Log format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Process-wide settings of one flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path of the flow configuration document
    pub config: String,
    /// Allow the expression transform
    pub allow_exec: bool,
    /// Only shape-check disabled modules
    pub skip_disabled_validation: bool,
    /// Separator for nested attribute paths
    pub nested_attr_separator: String,
    /// Prefix prepended to every task name
    pub task_name_prefix: String,
    /// Capacity of the recent task id buffer
    pub task_id_queue_size: usize,
    /// Accept records without metric value
    pub allow_none_metric: bool,
    pub hide_welcome: bool,
    pub only_validate: bool,
    pub run_once: bool,
    pub print_config: bool,
    pub print_traceback: bool,
    pub disable_outputs: bool,
    /// Modules default to disabled
    pub disable_default: bool,
    pub disable_readiness_probe: bool,
    /// Port of the `/readyz` endpoint
    pub readiness_port: u16,
    pub log_level: LogLevel,
    pub log_file: Option<String>,
    pub log_format: LogFormat,

    #[serde(skip)]
    persistent: BTreeSet<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config: "flow.yml".to_string(),
            allow_exec: false,
            skip_disabled_validation: false,
            nested_attr_separator: ".".to_string(),
            task_name_prefix: String::new(),
            task_id_queue_size: 1024,
            allow_none_metric: false,
            hide_welcome: false,
            only_validate: false,
            run_once: false,
            print_config: false,
            print_traceback: false,
            disable_outputs: false,
            disable_default: false,
            disable_readiness_probe: false,
            readiness_port: 5012,
            log_level: LogLevel::default(),
            log_file: None,
            log_format: LogFormat::default(),
            persistent: BTreeSet::new(),
        }
    }
}

/// Declaration of one setting
#[derive(Debug, Clone, Copy)]
pub struct SettingSpec {
    pub key: &'static str,
    pub help: &'static str,
    /// Boolean settings become switches on the command line
    pub is_flag: bool,
    schema: fn() -> Schema,
}

impl SettingSpec {
    pub fn schema(&self) -> Schema {
        (self.schema)()
    }

    /// Name of the environment variable overriding this setting
    pub fn env_var(&self) -> String {
        format!("{}_{}", ENV_PREFIX, self.key.to_uppercase())
    }
}

fn env_bool() -> Schema {
    Schema::env(Schema::Bool)
}

fn env_str() -> Schema {
    Schema::env(Schema::Str)
}

fn plain_str() -> Schema {
    Schema::Str
}

fn queue_size() -> Schema {
    Schema::env(Schema::range(1, i64::from(u32::MAX)))
}

fn port() -> Schema {
    Schema::env(Schema::range(0, i64::from(u16::MAX)))
}

fn log_level() -> Schema {
    Schema::env(Schema::one_of(["error", "warn", "info", "debug", "trace"]))
}

fn log_file() -> Schema {
    Schema::maybe(Schema::env(Schema::Str))
}

fn log_format() -> Schema {
    Schema::env(Schema::one_of(["text", "json"]))
}

const fn flag(key: &'static str, help: &'static str) -> SettingSpec {
    SettingSpec {
        key,
        help,
        is_flag: true,
        schema: env_bool,
    }
}

const fn option(key: &'static str, help: &'static str, schema: fn() -> Schema) -> SettingSpec {
    SettingSpec {
        key,
        help,
        is_flag: false,
        schema,
    }
}

static SETTINGS: &[SettingSpec] = &[
    option("config", "Path of the flow configuration", env_str),
    flag("allow_exec", "Allow the expression transform"),
    flag("skip_disabled_validation", "Skip full validation of disabled modules"),
    option("nested_attr_separator", "Separator for nested attribute paths", plain_str),
    option("task_name_prefix", "Prefix prepended to every task name", env_str),
    option("task_id_queue_size", "Number of recent task ids kept", queue_size),
    flag("allow_none_metric", "Emit records without metric value"),
    flag("hide_welcome", "Do not print the startup summary"),
    flag("only_validate", "Validate the configuration and exit"),
    flag("run_once", "Run every task once and exit"),
    flag("print_config", "Print the validated configuration"),
    flag("print_traceback", "Include error sources in failure logs"),
    flag("disable_outputs", "Build all sinks disabled"),
    flag("disable_default", "Modules are disabled unless enabled explicitly"),
    flag("disable_readiness_probe", "Do not serve the readiness endpoint"),
    option("readiness_port", "Port of the readiness endpoint", port),
    option("log_level", "Log level (error, warn, info, debug, trace)", log_level),
    option("log_file", "Write logs to this file instead of stderr", log_file),
    option("log_format", "Log format (text, json)", log_format),
];

impl Settings {
    /// Declarations of every setting
    pub fn specs() -> &'static [SettingSpec] {
        SETTINGS
    }

    pub fn spec(key: &str) -> Option<&'static SettingSpec> {
        SETTINGS.iter().find(|s| s.key == key)
    }

    /// Schema of the `settings` section of a configuration header
    pub fn schema() -> Schema {
        Schema::map(
            SETTINGS
                .iter()
                .map(|spec| Field::optional_without_default(spec.key, spec.schema()))
                .collect(),
        )
    }

    /// Defaults overridden by the environment
    pub fn from_env() -> ConfigResult<Self> {
        let mut settings = Self::default();
        settings.apply_env()?;
        Ok(settings)
    }

    /// Apply `METRICFLOW_<KEY>` environment variables, respecting persistent keys
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        for spec in SETTINGS {
            match std::env::var(spec.env_var()) {
                Ok(value) if !value.is_empty() => {
                    self.set(spec.key, Value::String(value), false)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Set one setting after validating it
    ///
    /// Returns `false` when the key is persistent and the update was skipped.
    pub fn set(&mut self, key: &str, value: Value, persistent: bool) -> ConfigResult<bool> {
        let spec = Self::spec(key).ok_or_else(|| ConfigError::UnknownSetting {
            key: key.to_string(),
        })?;

        if self.persistent.contains(key) {
            tracing::debug!(target: "settings", key, "Skipping overwrite of command line setting");
            return Ok(false);
        }

        let validated = spec
            .schema()
            .validate(&value)
            .map_err(|e| ConfigError::InvalidSetting {
                key: key.to_string(),
                message: e
                    .errors()
                    .iter()
                    .map(|i| i.message.clone())
                    .collect::<Vec<_>>()
                    .join("; "),
            })?;

        let mut document = serde_json::to_value(&*self)?;
        if let Value::Object(map) = &mut document {
            map.insert(key.to_string(), validated);
        }
        let mut updated: Settings = serde_json::from_value(document)?;
        updated.persistent = std::mem::take(&mut self.persistent);
        *self = updated;

        if persistent {
            self.persistent.insert(key.to_string());
        }
        tracing::trace!(target: "settings", key, "Setting updated");
        Ok(true)
    }

    /// Set several settings from a mapping
    pub fn extend(&mut self, mapping: &Map<String, Value>) -> ConfigResult<()> {
        for (key, value) in mapping {
            self.set(key, value.clone(), false)?;
        }
        Ok(())
    }

    /// Whether a key was set from the command line
    pub fn is_persistent(&self, key: &str) -> bool {
        self.persistent.contains(key)
    }

    /// Current value of a setting as JSON
    pub fn get(&self, key: &str) -> Option<Value> {
        serde_json::to_value(self).ok()?.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.nested_attr_separator, ".");
        assert_eq!(settings.task_id_queue_size, 1024);
        assert_eq!(settings.log_level, LogLevel::Info);
        assert!(!settings.allow_none_metric);
        assert_eq!(settings.readiness_port, 5012);
    }

    #[test]
    fn test_readiness_port_is_bounded() {
        let mut settings = Settings::default();
        settings.set("readiness_port", json!("8080"), false).unwrap();
        assert_eq!(settings.readiness_port, 8080);
        assert!(matches!(
            settings.set("readiness_port", json!(70000), false),
            Err(ConfigError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_every_field_is_declared() {
        let document = serde_json::to_value(Settings::default()).unwrap();
        let keys: Vec<&str> = document.as_object().unwrap().keys().map(String::as_str).collect();
        let declared: Vec<&str> = Settings::specs().iter().map(|s| s.key).collect();
        assert_eq!(keys, declared);
    }

    #[test]
    fn test_set_validates_and_coerces() {
        let mut settings = Settings::default();
        settings.set("run_once", json!("yes"), false).unwrap();
        settings.set("task_id_queue_size", json!("16"), false).unwrap();
        settings.set("log_level", json!("DEBUG"), false).unwrap();

        assert!(settings.run_once);
        assert_eq!(settings.task_id_queue_size, 16);
        assert_eq!(settings.log_level, LogLevel::Debug);

        assert!(matches!(
            settings.set("task_id_queue_size", json!(0), false),
            Err(ConfigError::InvalidSetting { .. })
        ));
        assert!(matches!(
            settings.set("no_such_key", json!(1), false),
            Err(ConfigError::UnknownSetting { .. })
        ));
    }

    #[test]
    fn test_persistent_keys_are_not_overwritten() {
        let mut settings = Settings::default();
        assert!(settings.set("allow_exec", json!(true), true).unwrap());
        assert!(settings.is_persistent("allow_exec"));

        let mut header = Map::new();
        header.insert("allow_exec".into(), json!(false));
        header.insert("hide_welcome".into(), json!(true));
        settings.extend(&header).unwrap();

        assert!(settings.allow_exec);
        assert!(settings.hide_welcome);
    }

    #[test]
    fn test_env_overrides() {
        temp_env::with_vars(
            [
                ("METRICFLOW_TASK_NAME_PREFIX", Some("prod_")),
                ("METRICFLOW_ALLOW_NONE_METRIC", Some("true")),
            ],
            || {
                let settings = Settings::from_env().unwrap();
                assert_eq!(settings.task_name_prefix, "prod_");
                assert!(settings.allow_none_metric);
            },
        );
    }

    #[test]
    fn test_env_respects_persistent() {
        temp_env::with_var("METRICFLOW_RUN_ONCE", Some("false"), || {
            let mut settings = Settings::default();
            settings.set("run_once", json!(true), true).unwrap();
            settings.apply_env().unwrap();
            assert!(settings.run_once);
        });
    }

    #[test]
    fn test_header_schema_rejects_unknown_keys() {
        let errors = Settings::schema()
            .validate(&json!({"run_onse": true}))
            .unwrap_err();
        assert!(errors.errors()[0].message.contains("run_once"));
    }
}
