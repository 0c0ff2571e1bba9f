//! Metric extraction from raw source records

use serde_json::{Map, Value};

use metricflow_core::flatten::{leaf_chains, remove_chain};
use metricflow_core::{Metric, MetricFrame};
use metricflow_interfaces::Record;

use crate::routing::compile;
use crate::task::ResultSpec;

/// Remove every leaf matching the patterns from `record`, returning `(path, value)` pairs
///
/// Patterns are evaluated in order. A leaf is claimed by the first pattern matching it
/// and is not considered by later patterns. Sequences are leaves.
pub fn extract_metrics(
    record: &mut Map<String, Value>,
    patterns: &[String],
    separator: &str,
) -> Vec<(String, Value)> {
    let mut pool = leaf_chains(record, separator);
    let mut claimed = Vec::new();

    for pattern in patterns {
        let pattern = compile(pattern);
        let mut remaining = Vec::with_capacity(pool.len());

        for (key, chain) in pool {
            if pattern.matches(&key) {
                if let Some(value) = remove_chain(record, &chain) {
                    claimed.push((key, value));
                }
            } else {
                remaining.push((key, chain));
            }
        }
        pool = remaining;
    }

    claimed
}

/// Build the metrics of one record
///
/// Returns an empty list when the record yields nothing: no metric field matched and
/// absent metrics are not allowed, or every metric value was unusable. Each dropped
/// record or value is logged.
pub fn record_metrics(
    frame: &MetricFrame,
    mut record: Record,
    result: &ResultSpec,
    static_attributes: &Map<String, Value>,
) -> Vec<Metric> {
    let separator = frame.options().separator.clone();
    let patterns = result.metrics.as_deref().unwrap_or_default();
    let fields = extract_metrics(&mut record, patterns, &separator);

    if let Some(allowed) = &result.attributes {
        record.retain(|key, _| allowed.iter().any(|a| a == key));
    }

    let mut attributes = record;
    for (key, value) in static_attributes {
        attributes.insert(key.clone(), value.clone());
    }

    if fields.is_empty() {
        if !frame.options().allow_absent {
            tracing::error!(
                target: "task",
                frame = %frame.name(),
                "Record without metric field dropped; enable allow_none_metric to keep it"
            );
            return Vec::new();
        }
        return match frame.new_metric(attributes, None, None) {
            Ok(metric) => vec![metric],
            Err(e) => {
                tracing::error!(target: "task", frame = %frame.name(), error = %e, "Dropping record");
                Vec::new()
            }
        };
    }

    let mut metrics = Vec::with_capacity(fields.len());
    for (field, raw) in fields {
        let created = Metric::value_from_json(&field, &raw)
            .and_then(|value| frame.new_metric(attributes.clone(), value, Some(field.clone())));
        match created {
            Ok(metric) => metrics.push(metric),
            Err(e) => {
                tracing::error!(
                    target: "task",
                    frame = %frame.name(),
                    field = %field,
                    error = %e,
                    "Dropping metric"
                );
            }
        }
    }
    metrics
}
