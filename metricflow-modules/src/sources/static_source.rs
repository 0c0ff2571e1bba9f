use serde_json::{json, Value};

use metricflow_config::{Field, Schema};
use metricflow_interfaces::{
    Module, ModuleError, ModuleResult, ModuleSpec, ModuleType, Record, Source, SourceType,
};

/// Returns the records configured in the task's `payload`
pub struct StaticSource {
    name: String,
}

impl Module for StaticSource {}

impl Source for StaticSource {
    fn fetch(&self, params: Value) -> ModuleResult<Vec<Record>> {
        let payload = params.get("payload").cloned().unwrap_or(Value::Null);
        let items = match payload {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            single => vec![single],
        };

        let records = items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(ModuleError::data(format!(
                    "payload of source {} must contain mappings, got {other}",
                    self.name
                ))),
            })
            .collect::<ModuleResult<Vec<_>>>()?;

        tracing::trace!(target: "modules", source = %self.name, count = records.len(), "Fetched records");
        Ok(records)
    }
}

impl ModuleType for StaticSource {
    const TYPE_NAME: &'static str = "static";
    const DOC: &'static str = "Returns the records configured in the task parameters.";

    fn create(spec: &ModuleSpec) -> ModuleResult<Self> {
        Ok(Self {
            name: spec.name.clone(),
        })
    }
}

impl SourceType for StaticSource {
    fn task_params_schema() -> Schema {
        Schema::map(vec![Field::optional(
            "payload",
            Schema::always_list(Schema::dict(Schema::Any)),
            json!([]),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> StaticSource {
        StaticSource::create(&ModuleSpec::new("static", "fixed")).unwrap()
    }

    #[test]
    fn test_fetch_payload() {
        let records = source()
            .fetch(json!({"payload": [{"metric": 1}, {"metric": 2, "host": "a"}]}))
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("host"), Some(&json!("a")));
    }

    #[test]
    fn test_single_record_and_empty_payload() {
        assert_eq!(source().fetch(json!({"payload": {"metric": 1}})).unwrap().len(), 1);
        assert!(source().fetch(json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_non_mapping_items_are_rejected() {
        let err = source().fetch(json!({"payload": [1]})).unwrap_err();
        assert!(matches!(err, ModuleError::Data(_)));
    }

    #[test]
    fn test_params_schema_wraps_single_record() {
        let validated = StaticSource::task_params_schema()
            .validate(&json!({"payload": {"metric": 5}}))
            .unwrap();
        assert_eq!(validated, json!({"payload": [{"metric": 5}]}));
    }
}
