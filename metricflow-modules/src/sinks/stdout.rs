use std::io::Write;

use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::{json, Value};

use metricflow_config::{Field, Schema};
use metricflow_core::MetricFrame;
use metricflow_interfaces::{
    Module, ModuleError, ModuleResult, ModuleSpec, ModuleType, ProcessorType, Sink,
};
use metricflow_resilience::{RateLimitConfig, RateLimiter};

/// Rendering of one metric document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// One JSON document per line
    JsonCompact,
}

/// Render every metric of a frame as a flat JSON document
///
/// Documents hold the flattened attributes, the metric under its field name (or
/// `metric` when it has none) and the RFC 3339 timestamp.
pub fn render(frame: &MetricFrame, format: OutputFormat) -> ModuleResult<Vec<String>> {
    frame
        .iter()
        .map(|metric| {
            let mut document = metric.flatten();
            let value = metric.value().cloned().map(Value::Number).unwrap_or(Value::Null);
            document.insert(metric.field().unwrap_or("metric").to_string(), value);
            document.insert(
                "timestamp".to_string(),
                json!(metric.timestamp().to_rfc3339_opts(SecondsFormat::Micros, true)),
            );

            let document = Value::Object(document);
            let rendered = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&document),
                OutputFormat::JsonCompact => serde_json::to_string(&document),
            };
            rendered.map_err(|e| ModuleError::data(e.to_string()))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct Params {
    format: OutputFormat,
    rate_limit: Option<RateLimitConfig>,
}

/// Prints metrics to stdout
pub struct StdoutSink {
    name: String,
    format: OutputFormat,
    limiter: Option<RateLimiter>,
}

impl Module for StdoutSink {
    fn on_pre_shutdown(&self) -> ModuleResult<()> {
        std::io::stdout().flush()?;
        Ok(())
    }
}

impl Sink for StdoutSink {
    fn emit(&self, frame: MetricFrame) -> ModuleResult<()> {
        let documents = render(&frame, self.format)?;
        let stdout = std::io::stdout();
        for document in documents {
            if let Some(limiter) = &self.limiter {
                limiter.acquire();
            }
            let mut out = stdout.lock();
            writeln!(out, "{document}")?;
        }
        tracing::trace!(target: "modules", sink = %self.name, task = %frame.name(), "Printed frame");
        Ok(())
    }
}

impl ModuleType for StdoutSink {
    const TYPE_NAME: &'static str = "stdout";
    const DOC: &'static str = "Prints every metric as a flat JSON document.";

    fn create(spec: &ModuleSpec) -> ModuleResult<Self> {
        let params: Params = spec
            .params_as()
            .map_err(|e| ModuleError::config(e.to_string()))?;
        Ok(Self {
            name: spec.name.clone(),
            format: params.format,
            limiter: params.rate_limit.map(RateLimiter::new),
        })
    }
}

impl ProcessorType for StdoutSink {
    fn params_schema() -> Schema {
        Schema::map(vec![
            Field::optional("format", Schema::one_of(["json", "json_compact"]), json!("json")),
            Field::optional(
                "rate_limit",
                Schema::maybe(Schema::map(vec![
                    Field::required("calls", Schema::range(1, i64::from(u32::MAX))),
                    Field::required("period", Schema::env(Schema::Duration)),
                ])),
                Value::Null,
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use metricflow_core::MetricOptions;
    use serde_json::Number;
    use std::time::Duration;

    fn frame() -> MetricFrame {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut frame = MetricFrame::with_timestamp("task", at, MetricOptions::default());
        let metric = frame
            .new_metric(
                json!({"host": "a", "disk": {"mount": "/"}}).as_object().cloned().unwrap(),
                Some(Number::from(42)),
                Some("used".into()),
            )
            .unwrap();
        frame.push(metric).unwrap();
        frame
    }

    #[test]
    fn test_render_compact() {
        let lines = render(&frame(), OutputFormat::JsonCompact).unwrap();
        assert_eq!(
            lines,
            vec![r#"{"host":"a","disk.mount":"/","used":42,"timestamp":"2024-05-01T12:00:00.000000Z"}"#]
        );
    }

    #[test]
    fn test_render_pretty_is_multiline() {
        let lines = render(&frame(), OutputFormat::Json).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\n  \"used\": 42"));
    }

    #[test]
    fn test_create_with_rate_limit() {
        let params = StdoutSink::params_schema()
            .validate(&json!({"format": "json_compact", "rate_limit": {"calls": 5, "period": "1m"}}))
            .unwrap();
        let sink = StdoutSink::create(&ModuleSpec::new("stdout", "out").with_params(params)).unwrap();

        assert_eq!(sink.format, OutputFormat::JsonCompact);
        let limiter = sink.limiter.unwrap();
        assert_eq!(limiter.config().calls, 5);
        assert_eq!(limiter.config().period, Duration::from_secs(60));
    }
}
