use std::cmp::Ordering;

use serde::Deserialize;
use serde_json::Value;

use metricflow_config::validators::coerce_bool;
use metricflow_config::{Field, Schema};
use metricflow_core::{Metric, MetricFrame};
use metricflow_interfaces::{
    Module, ModuleError, ModuleResult, ModuleSpec, ModuleType, ProcessorType, Transform,
};

/// Comparison applied to each metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
    /// The metric's value contains the operand
    In,
    /// The metric's value is present
    Nn,
}

impl Condition {
    pub const NAMES: [&'static str; 8] = ["lt", "le", "eq", "ne", "ge", "gt", "in", "nn"];

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "lt" => Condition::Lt,
            "le" => Condition::Le,
            "eq" => Condition::Eq,
            "ne" => Condition::Ne,
            "ge" => Condition::Ge,
            "gt" => Condition::Gt,
            "in" => Condition::In,
            "nn" => Condition::Nn,
            _ => return None,
        })
    }

    fn holds(self, value: &Value, operand: &Value) -> bool {
        match self {
            Condition::Nn => !value.is_null(),
            Condition::Eq => value == operand,
            Condition::Ne => value != operand,
            Condition::In => contains(value, operand),
            Condition::Lt => compare(value, operand) == Some(Ordering::Less),
            Condition::Le => matches!(
                compare(value, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Condition::Ge => matches!(
                compare(value, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::Gt => compare(value, operand) == Some(Ordering::Greater),
        }
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn contains(container: &Value, item: &Value) -> bool {
    match (container, item) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Array(items), item) => items.iter().any(|i| i == item || text(i) == text(item)),
        (Value::Object(map), item) => map.contains_key(&text(item)),
        _ => false,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert the textual operand to the type of the compared value, if possible
fn operand_for(value: &Value, raw: &str) -> Value {
    let converted = match value {
        Value::Number(_) => raw.parse::<f64>().ok().map(Value::from),
        Value::Bool(_) => coerce_bool(&Value::String(raw.to_string())).map(Value::Bool),
        _ => None,
    };
    converted.unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Whether metrics matching the condition are kept or dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Drop,
    Keep,
}

#[derive(Debug, Deserialize)]
struct Params {
    cond: String,
    mode: FilterMode,
}

/// Drops or keeps metrics by a `<condition> <value> [field]` rule
///
/// Without a field the metric value is compared.
pub struct SimpleFilter {
    condition: Condition,
    operand: String,
    field: Option<String>,
    mode: FilterMode,
}

impl SimpleFilter {
    fn keeps(&self, metric: &Metric) -> bool {
        let value = match &self.field {
            Some(field) => metric.get(field).unwrap_or(Value::Null),
            None => metric.value().cloned().map(Value::Number).unwrap_or(Value::Null),
        };
        let numeric = match &value {
            Value::Number(n) => n.as_f64().map(Value::from).unwrap_or(Value::Null),
            other => other.clone(),
        };
        let operand = operand_for(&numeric, &self.operand);
        let result = self.condition.holds(&numeric, &operand);

        match self.mode {
            FilterMode::Keep => result,
            FilterMode::Drop => !result,
        }
    }
}

impl Module for SimpleFilter {}

impl Transform for SimpleFilter {
    fn apply(&self, frame: &mut MetricFrame) -> ModuleResult<()> {
        let before = frame.len();
        frame.retain(|metric| self.keeps(metric))?;
        tracing::trace!(
            target: "modules",
            task = %frame.name(),
            dropped = before - frame.len(),
            "Filtered frame"
        );
        Ok(())
    }
}

impl ModuleType for SimpleFilter {
    const TYPE_NAME: &'static str = "simple_filter";
    const DOC: &'static str =
        "Drops or keeps metrics matching `<lt|le|eq|ne|ge|gt|in|nn> <value> [field]`.";

    fn create(spec: &ModuleSpec) -> ModuleResult<Self> {
        let params: Params = spec
            .params_as()
            .map_err(|e| ModuleError::config(e.to_string()))?;

        let mut parts = params.cond.splitn(3, ' ');
        let name = parts.next().unwrap_or_default();
        let condition = Condition::parse(name).ok_or_else(|| {
            tracing::error!(
                target: "modules",
                "Condition {} is unknown, possible are: {:?}",
                name,
                Condition::NAMES
            );
            ModuleError::config(format!("Unknown condition `{name}` for comparison."))
        })?;

        Ok(Self {
            condition,
            operand: parts.next().unwrap_or_default().to_string(),
            field: parts.next().map(str::to_string).filter(|f| !f.is_empty()),
            mode: params.mode,
        })
    }
}

impl ProcessorType for SimpleFilter {
    fn params_schema() -> Schema {
        Schema::map(vec![
            Field::required("cond", Schema::Str),
            Field::required("mode", Schema::one_of(["drop", "keep"])),
        ])
    }
}
