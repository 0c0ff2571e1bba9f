//! Loading configuration documents from disk

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{Field, Schema};

/// Read a YAML document into a JSON value
///
/// An empty document yields `Value::Null`.
pub fn read_document(path: impl AsRef<Path>) -> ConfigResult<Value> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ConfigError::MissingFile {
            path: path.display().to_string(),
        });
    }

    tracing::debug!(target: "config", path = %path.display(), "Loading configuration document");
    let content = std::fs::read_to_string(path)?;
    parse_document(&content)
}

/// Parse YAML text into a JSON value
pub fn parse_document(content: &str) -> ConfigResult<Value> {
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    Ok(serde_json::to_value(yaml)?)
}

/// Field of the `env` section: variable names mapped to env-expanded strings
pub fn env_field() -> Field {
    Field::optional(
        "env",
        Schema::maybe(Schema::dict(Schema::env(Schema::custom(
            "environment value",
            |value, _, _| {
                Ok(match value {
                    Value::String(_) => value.clone(),
                    Value::Null => Value::String(String::new()),
                    other => Value::String(other.to_string()),
                })
            },
        )))),
        Value::Object(Map::new()),
    )
}

/// Schema checking only the `env` section of a document
pub fn env_schema() -> Schema {
    Schema::map_allow_extra(vec![env_field()])
}

/// Variables declared by a validated `env` section
pub fn env_vars(validated: &Value) -> Map<String, Value> {
    validated
        .get("env")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Export variables into the process environment
///
/// Returns the number of variables that were added or changed.
pub fn export_env(vars: &Map<String, Value>) -> usize {
    let mut modified = 0;
    for (key, value) in vars {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if std::env::var(key).ok().as_deref() != Some(value.as_str()) {
            modified += 1;
        }
        std::env::set_var(key, value);
    }

    if modified > 0 {
        tracing::debug!(target: "config", modified, "Modified environment variables");
    }
    modified
}
