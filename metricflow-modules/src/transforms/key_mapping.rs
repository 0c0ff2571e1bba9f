use serde::Deserialize;
use serde_json::{json, Map, Value};

use metricflow_config::validators::coerce_bool;
use metricflow_config::{Field, Schema};
use metricflow_core::MetricFrame;
use metricflow_interfaces::{
    Module, ModuleError, ModuleResult, ModuleSpec, ModuleType, ProcessorType, Transform,
};

/// Behavior when a key has no entry in the mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKey {
    /// Write the configured default
    Default,
    /// Write the raw key
    Original,
    /// Write the key after casting
    OriginalCasted,
    /// Fail the task attempt
    Raise,
    /// Leave the metric unchanged
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Cast {
    Str,
    Int,
    Bool,
    Float,
}

impl Cast {
    fn apply(self, value: &Value) -> Option<Value> {
        match self {
            Cast::Str => Some(Value::String(lookup_key(value))),
            Cast::Int => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                    .map(Value::from),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
                Value::Bool(b) => Some(Value::from(i64::from(*b))),
                _ => None,
            },
            Cast::Float => match value {
                Value::Number(n) => n.as_f64().map(Value::from),
                Value::String(s) => s.trim().parse::<f64>().ok().map(Value::from),
                Value::Bool(b) => Some(Value::from(if *b { 1.0 } else { 0.0 })),
                _ => None,
            },
            Cast::Bool => coerce_bool(value).map(Value::Bool),
        }
    }
}

/// Mapping keys are strings; scalars are looked up by their text
fn lookup_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct Params {
    mapping: Map<String, Value>,
    key: String,
    result_field: Option<String>,
    cast_key: Option<Cast>,
    default: Value,
    handle_missing: MissingKey,
}

/// Maps a metric attribute through a lookup table
pub struct KeyMapping {
    mapping: Map<String, Value>,
    key: String,
    result_field: String,
    cast: Option<Cast>,
    default: Value,
    missing: MissingKey,
}

impl KeyMapping {
    fn map_value(&self, original: &Value) -> ModuleResult<Option<Value>> {
        let key = match self.cast {
            Some(cast) => cast.apply(original).ok_or_else(|| {
                ModuleError::data(format!("Cannot cast `{original}` of field `{}`", self.key))
            })?,
            None => original.clone(),
        };

        if let Some(mapped) = self.mapping.get(&lookup_key(&key)) {
            return Ok(Some(mapped.clone()));
        }

        match self.missing {
            MissingKey::Default => Ok(Some(self.default.clone())),
            MissingKey::Original => Ok(Some(original.clone())),
            MissingKey::OriginalCasted => Ok(Some(key)),
            MissingKey::Nothing => Ok(None),
            MissingKey::Raise => Err(ModuleError::data(format!(
                "Key `{}` has no entry in the mapping",
                lookup_key(&key)
            ))),
        }
    }
}

impl Module for KeyMapping {}

impl Transform for KeyMapping {
    fn apply(&self, frame: &mut MetricFrame) -> ModuleResult<()> {
        let name = frame.name().to_string();
        for metric in frame.iter_mut()? {
            let Some(original) = metric.get(&self.key) else {
                tracing::error!(target: "modules", key = %self.key, task = %name, "Key does not exist in Task");
                return Err(ModuleError::data(format!(
                    "Key `{}` does not exist in Task `{}`.",
                    self.key, name
                )));
            };

            if let Some(mapped) = self.map_value(&original)? {
                metric.set(&self.result_field, mapped)?;
            }
        }
        Ok(())
    }
}

impl ModuleType for KeyMapping {
    const TYPE_NAME: &'static str = "key_mapping";
    const DOC: &'static str = "Maps a metric attribute through a key/value table.";

    fn create(spec: &ModuleSpec) -> ModuleResult<Self> {
        let params: Params = spec
            .params_as()
            .map_err(|e| ModuleError::config(e.to_string()))?;

        // A configured default always wins over the missing-key mode
        let missing = if params.default.is_null() {
            params.handle_missing
        } else {
            MissingKey::Default
        };

        Ok(Self {
            result_field: params.result_field.unwrap_or_else(|| params.key.clone()),
            mapping: params.mapping,
            key: params.key,
            cast: params.cast_key,
            default: params.default,
            missing,
        })
    }
}

impl ProcessorType for KeyMapping {
    fn params_schema() -> Schema {
        Schema::map(vec![
            Field::required("mapping", Schema::dict(Schema::Any)),
            Field::required("key", Schema::Str),
            Field::optional("result_field", Schema::maybe(Schema::Str), Value::Null),
            Field::optional(
                "cast_key",
                Schema::maybe(Schema::one_of(["str", "int", "bool", "float"])),
                Value::Null,
            ),
            Field::optional("default", Schema::Any, Value::Null),
            Field::optional(
                "handle_missing",
                Schema::one_of(["default", "original", "original_casted", "raise", "nothing"]),
                json!("raise"),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricflow_core::MetricOptions;
    use serde_json::Number;

    fn transform(params: Value) -> ModuleResult<KeyMapping> {
        let params = KeyMapping::params_schema().validate(&params).unwrap();
        KeyMapping::create(&ModuleSpec::new("key_mapping", "map").with_params(params))
    }

    fn frame(records: &[Value]) -> MetricFrame {
        let mut frame = MetricFrame::new("task", MetricOptions::default());
        for record in records {
            let metric = frame
                .new_metric(
                    record.as_object().cloned().unwrap(),
                    Some(Number::from(1)),
                    Some("value".into()),
                )
                .unwrap();
            frame.push(metric).unwrap();
        }
        frame
    }

    #[test]
    fn test_maps_into_result_field() {
        let mapping = transform(json!({
            "mapping": {"1": "one", "2": "two"},
            "key": "code",
            "result_field": "label",
        }))
        .unwrap();

        let mut frame = frame(&[json!({"code": 1}), json!({"code": "2"})]);
        mapping.apply(&mut frame).unwrap();
        assert_eq!(frame[0].get("label"), Some(json!("one")));
        assert_eq!(frame[1].get("label"), Some(json!("two")));
        assert_eq!(frame[0].get("code"), Some(json!(1)));
    }

    #[test]
    fn test_missing_key_modes() {
        let base = json!({"mapping": {"a": "A"}, "key": "k"});
        let with = |mode: &str| {
            let mut params = base.clone();
            params["handle_missing"] = json!(mode);
            transform(params).unwrap()
        };

        let mut f = frame(&[json!({"k": "b"})]);
        assert!(with("raise").apply(&mut f).is_err());

        let mut f = frame(&[json!({"k": "b"})]);
        with("nothing").apply(&mut f).unwrap();
        assert_eq!(f[0].get("k"), Some(json!("b")));

        let mut f = frame(&[json!({"k": "b"})]);
        with("default").apply(&mut f).unwrap();
        assert_eq!(f[0].get("k"), Some(Value::Null));
    }

    #[test]
    fn test_default_overrides_mode_and_cast() {
        let mapping = transform(json!({
            "mapping": {"7": "seven"},
            "key": "k",
            "cast_key": "int",
            "default": "other",
            "handle_missing": "raise",
        }))
        .unwrap();
        assert_eq!(mapping.missing, MissingKey::Default);

        let mut f = frame(&[json!({"k": "7"}), json!({"k": 8.9})]);
        mapping.apply(&mut f).unwrap();
        assert_eq!(f[0].get("k"), Some(json!("seven")));
        assert_eq!(f[1].get("k"), Some(json!("other")));
    }

    #[test]
    fn test_original_casted() {
        let mapping = transform(json!({
            "mapping": {},
            "key": "k",
            "cast_key": "float",
            "handle_missing": "original_casted",
        }))
        .unwrap();
        let mut f = frame(&[json!({"k": "2.5"})]);
        mapping.apply(&mut f).unwrap();
        assert_eq!(f[0].get("k"), Some(json!(2.5)));
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let mapping = transform(json!({"mapping": {}, "key": "absent"})).unwrap();
        let mut f = frame(&[json!({"k": 1})]);
        let err = mapping.apply(&mut f).unwrap_err();
        assert!(err.to_string().contains("does not exist in Task `task`"));
    }

    #[test]
    fn test_metric_field_can_be_mapped() {
        let mapping = transform(json!({"mapping": {"1": 10}, "key": "value"})).unwrap();
        let mut f = frame(&[json!({})]);
        mapping.apply(&mut f).unwrap();
        assert_eq!(f[0].value_f64(), Some(10.0));
    }
}
