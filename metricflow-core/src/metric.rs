//! A single attributed value extracted from a raw record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{CoreError, CoreResult};
use crate::flatten::{flatten, get_chain, insert_chain, remove_chain, split_path};
use crate::DEFAULT_SEPARATOR;

/// Options shared by every metric of a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOptions {
    /// Separator for nested attribute paths
    pub separator: String,
    /// Whether metrics without value are accepted
    pub allow_absent: bool,
}

impl Default for MetricOptions {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            allow_absent: false,
        }
    }
}

/// One metric value plus the attributes describing it
///
/// The attribute tree never contains the field the value was taken from. Reading or
/// writing that field through [`Metric::get`] and [`Metric::set`] addresses the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    attributes: Map<String, Value>,
    value: Option<Number>,
    field: Option<String>,
    timestamp: DateTime<Utc>,
    options: MetricOptions,
}

impl Metric {
    /// Create a metric, removing `field` from the attributes
    pub fn new(
        mut attributes: Map<String, Value>,
        value: Option<Number>,
        field: Option<String>,
        timestamp: DateTime<Utc>,
        options: MetricOptions,
    ) -> CoreResult<Self> {
        if value.is_none() && !options.allow_absent {
            return Err(CoreError::AbsentMetric);
        }

        if let Some(field) = &field {
            let chain = split_path(field, &options.separator);
            remove_chain(&mut attributes, &chain);
        }

        Ok(Self {
            attributes,
            value,
            field,
            timestamp,
            options,
        })
    }

    /// Convert a raw JSON value into a metric value
    pub fn value_from_json(field: &str, value: &Value) -> CoreResult<Option<Number>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(Some(n.clone())),
            Value::Bool(b) => Ok(Some(Number::from(u8::from(*b)))),
            other => Err(CoreError::NonNumericMetric {
                field: field.to_string(),
                value: other.to_string(),
            }),
        }
    }

    pub fn value(&self) -> Option<&Number> {
        self.value.as_ref()
    }

    /// Numeric value as float, if present
    pub fn value_f64(&self) -> Option<f64> {
        self.value.as_ref().and_then(Number::as_f64)
    }

    /// Replace the metric value
    pub fn set_value(&mut self, value: Option<Number>) -> CoreResult<()> {
        if value.is_none() && !self.options.allow_absent {
            return Err(CoreError::AbsentMetric);
        }
        self.value = value;
        Ok(())
    }

    /// Name of the field the value was extracted from
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.attributes
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = timestamp;
    }

    pub fn separator(&self) -> &str {
        &self.options.separator
    }

    fn is_field(&self, path: &str) -> bool {
        self.field.as_deref() == Some(path)
    }

    /// Read a nested attribute, or the metric value when `path` names the metric field
    pub fn get(&self, path: &str) -> Option<Value> {
        if self.is_field(path) {
            return self.value.clone().map(Value::Number);
        }
        if let Some(value) = self.attributes.get(path) {
            return Some(value.clone());
        }
        get_chain(&self.attributes, &split_path(path, &self.options.separator)).cloned()
    }

    /// Write a nested attribute, un-flattening the path into nested mappings
    ///
    /// Writing the metric field replaces the metric value instead.
    pub fn set(&mut self, path: &str, value: Value) -> CoreResult<()> {
        if self.is_field(path) {
            let number = Self::value_from_json(path, &value)?;
            return self.set_value(number);
        }
        let chain = split_path(path, &self.options.separator);
        insert_chain(&mut self.attributes, &chain, value)
    }

    /// Remove a nested attribute
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        if let Some(value) = self.attributes.remove(path) {
            return Some(value);
        }
        remove_chain(&mut self.attributes, &split_path(path, &self.options.separator))
    }

    /// Fully flattened attribute view, excluding the metric value
    pub fn flatten(&self) -> Map<String, Value> {
        flatten(&self.attributes, &self.options.separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn metric(value: Value, metric: Option<i64>, field: Option<&str>) -> CoreResult<Metric> {
        Metric::new(
            attrs(value),
            metric.map(Number::from),
            field.map(str::to_string),
            Utc::now(),
            MetricOptions::default(),
        )
    }

    #[test]
    fn test_attributes_never_contain_metric_field() {
        let m = metric(json!({"field": 1, "other": 2}), Some(1), Some("field")).unwrap();
        assert!(m.attributes().get("field").is_none());
        assert_eq!(m.get("field"), Some(json!(1)));
        assert_eq!(m.get("other"), Some(json!(2)));
    }

    #[test]
    fn test_nested_metric_field_is_removed() {
        let m = metric(json!({"a": {"b": 4, "c": 5}}), Some(4), Some("a.b")).unwrap();
        assert_eq!(Value::Object(m.attributes().clone()), json!({"a": {"c": 5}}));
    }

    #[test]
    fn test_absent_metric_requires_setting() {
        assert_eq!(
            metric(json!({}), None, None).unwrap_err(),
            CoreError::AbsentMetric
        );

        let options = MetricOptions {
            allow_absent: true,
            ..Default::default()
        };
        let m = Metric::new(Map::new(), None, None, Utc::now(), options).unwrap();
        assert!(m.value().is_none());
    }

    #[test]
    fn test_set_unflattens_path() {
        let mut m = metric(json!({"field": {"nested": 1}}), Some(3), Some("value")).unwrap();
        m.set("field.nested2", json!(9)).unwrap();

        assert_eq!(
            Value::Object(m.attributes().clone()),
            json!({"field": {"nested": 1, "nested2": 9}})
        );
        assert_eq!(m.get("field.nested2"), Some(json!(9)));
    }

    #[test]
    fn test_set_metric_field_updates_value() {
        let mut m = metric(json!({}), Some(3), Some("value")).unwrap();
        m.set("value", json!(7.5)).unwrap();
        assert_eq!(m.value_f64(), Some(7.5));
        assert!(m.set("value", json!("text")).is_err());
    }

    #[test]
    fn test_flatten_excludes_value() {
        let m = metric(
            json!({"value": 3, "tags": {"host": "a", "list": [1, 2]}}),
            Some(3),
            Some("value"),
        )
        .unwrap();
        let flat = m.flatten();

        assert!(!flat.contains_key("value"));
        assert_eq!(flat.get("tags.host"), Some(&json!("a")));
        assert_eq!(flat.get("tags.list.1"), Some(&json!(2)));
    }

    #[test]
    fn test_custom_separator() {
        let options = MetricOptions {
            separator: "/".to_string(),
            allow_absent: false,
        };
        let mut m = Metric::new(Map::new(), Some(Number::from(1)), None, Utc::now(), options)
            .unwrap();
        m.set("a/b", json!(true)).unwrap();
        assert_eq!(m.flatten().get("a/b"), Some(&json!(true)));
        assert_eq!(m.remove("a/b"), Some(json!(true)));
    }

    #[test]
    fn test_value_from_json() {
        assert_eq!(Metric::value_from_json("f", &json!(2)).unwrap(), Some(Number::from(2)));
        assert_eq!(Metric::value_from_json("f", &json!(null)).unwrap(), None);
        assert!(Metric::value_from_json("f", &json!("x")).is_err());
    }
}
