//! Scheduled tasks of a source

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use metricflow_config::CronSchedule;
use metricflow_resilience::RetryPolicy;

use crate::error::{FlowError, FlowResult};

/// Which record fields become metrics and which stay as attributes
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultSpec {
    /// Glob patterns of metric fields, evaluated in order
    #[serde(default = "default_metrics")]
    pub metrics: Option<Vec<String>>,
    /// Top-level attribute keys to keep, all when unset
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
}

fn default_metrics() -> Option<Vec<String>> {
    Some(vec!["metric".to_string()])
}

impl Default for ResultSpec {
    fn default() -> Self {
        Self {
            metrics: default_metrics(),
            attributes: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTask {
    name: String,
    cron: String,
    #[serde(default)]
    result: ResultSpec,
    #[serde(default)]
    static_attributes: Option<Map<String, Value>>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default)]
    max_retries: u32,
    #[serde(default)]
    retry_delay: f64,
    #[serde(default)]
    params: Value,
}

fn enabled_by_default() -> bool {
    true
}

/// A scheduled fetch of one source
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique name, including the configured prefix
    pub name: String,
    /// Name of the owning source
    pub source: String,
    pub schedule: CronSchedule,
    pub retry: RetryPolicy,
    pub result: ResultSpec,
    pub static_attributes: Map<String, Value>,
    /// Enabled in its configuration and owned by an enabled source
    pub enabled: bool,
    /// Validated parameters passed to the source
    pub params: Value,
}

impl Task {
    /// Build a task from a validated task entry
    pub fn from_config(
        source: &str,
        source_enabled: bool,
        config: &Value,
        name_prefix: &str,
    ) -> FlowResult<Self> {
        let raw = RawTask::deserialize(config)?;
        let name = format!("{name_prefix}{}", raw.name);

        let schedule = CronSchedule::parse(&raw.cron).map_err(|message| FlowError::InvalidTask {
            name: name.clone(),
            message,
        })?;

        Ok(Self {
            name,
            source: source.to_string(),
            schedule,
            retry: RetryPolicy::from_seconds(raw.max_retries, raw.retry_delay),
            result: raw.result,
            static_attributes: raw.static_attributes.unwrap_or_default(),
            enabled: raw.enabled && source_enabled,
            params: raw.params,
        })
    }

    /// Next scheduled fire time after `after`
    pub fn next_run(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.next_after(after)
    }
}
