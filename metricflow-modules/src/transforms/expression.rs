use serde::Deserialize;
use serde_json::{json, Value};

use metricflow_config::{Field, Schema};
use metricflow_core::{Metric, MetricFrame};
use metricflow_interfaces::{
    Module, ModuleError, ModuleResult, ModuleSpec, ModuleType, ProcessorType, Transform,
};

/// One allow-listed operation on a metric path
///
/// Paths address nested attributes with the frame's separator. The path of the metric
/// field addresses the metric value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Set { path: String, value: Value },
    Copy { from: String, to: String },
    Rename { from: String, to: String },
    Delete { path: String },
    Scale { path: String, factor: f64 },
    Offset { path: String, amount: f64 },
    Round { path: String, digits: u32 },
}

fn number(path: &str, metric: &Metric) -> ModuleResult<f64> {
    match metric.get(path) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ModuleError::data(format!("`{path}` is not a finite number"))),
        Some(other) => Err(ModuleError::data(format!(
            "`{path}` holds a non-numeric value: {other}"
        ))),
        None => Err(ModuleError::data(format!("`{path}` does not exist"))),
    }
}

fn float(value: f64) -> Value {
    // Non-finite results become null
    json!(value)
}

impl Operation {
    fn apply(&self, metric: &mut Metric) -> ModuleResult<()> {
        match self {
            Operation::Set { path, value } => metric.set(path, value.clone())?,
            Operation::Copy { from, to } => {
                let value = metric
                    .get(from)
                    .ok_or_else(|| ModuleError::data(format!("`{from}` does not exist")))?;
                metric.set(to, value)?;
            }
            Operation::Rename { from, to } => {
                let value = metric
                    .remove(from)
                    .ok_or_else(|| ModuleError::data(format!("`{from}` does not exist")))?;
                metric.set(to, value)?;
            }
            Operation::Delete { path } => {
                metric.remove(path);
            }
            Operation::Scale { path, factor } => {
                let scaled = number(path, metric)? * factor;
                metric.set(path, float(scaled))?;
            }
            Operation::Offset { path, amount } => {
                let shifted = number(path, metric)? + amount;
                metric.set(path, float(shifted))?;
            }
            Operation::Round { path, digits } => {
                let factor = 10f64.powi(i32::try_from(*digits).unwrap_or(i32::MAX));
                let rounded = (number(path, metric)? * factor).round() / factor;
                metric.set(path, float(rounded))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Params {
    operations: Vec<Operation>,
}

/// Applies a list of operations to every metric of a frame
///
/// Only built when the `allow_exec` setting is on.
pub struct Expression {
    operations: Vec<Operation>,
}

impl Module for Expression {}

impl Transform for Expression {
    fn apply(&self, frame: &mut MetricFrame) -> ModuleResult<()> {
        for metric in frame.iter_mut()? {
            for operation in &self.operations {
                operation.apply(metric)?;
            }
        }
        Ok(())
    }
}

impl ModuleType for Expression {
    const TYPE_NAME: &'static str = "expression";
    const DOC: &'static str = "Applies set/copy/rename/delete/scale/offset/round operations \
                               to metric paths. Requires the allow_exec setting.";

    fn create(spec: &ModuleSpec) -> ModuleResult<Self> {
        if !spec.settings.allow_exec {
            tracing::error!(
                target: "modules",
                module = %spec.name,
                "Expression execution is disabled by default; enable the allow_exec setting"
            );
            return Err(ModuleError::config("Expression execution not allowed."));
        }

        let params: Params = spec
            .params_as()
            .map_err(|e| ModuleError::config(e.to_string()))?;
        Ok(Self {
            operations: params.operations,
        })
    }
}

fn operation(op: &str, fields: Vec<Field>) -> Schema {
    let mut all = vec![Field::required("op", Schema::Literal(json!(op)))];
    all.extend(fields);
    Schema::map(all)
}

impl ProcessorType for Expression {
    fn params_schema() -> Schema {
        let path = || Field::required("path", Schema::Str);
        let from_to = || {
            vec![
                Field::required("from", Schema::Str),
                Field::required("to", Schema::Str),
            ]
        };

        Schema::map(vec![Field::required(
            "operations",
            Schema::always_list(Schema::Union(vec![
                operation("set", vec![path(), Field::required("value", Schema::Any)]),
                operation("copy", from_to()),
                operation("rename", from_to()),
                operation("delete", vec![path()]),
                operation("scale", vec![path(), Field::required("factor", Schema::Number)]),
                operation("offset", vec![path(), Field::required("amount", Schema::Number)]),
                operation(
                    "round",
                    vec![path(), Field::optional("digits", Schema::range(0, 15), 0)],
                ),
            ])),
        )])
    }
}
