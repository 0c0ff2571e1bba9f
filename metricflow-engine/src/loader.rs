//! Startup sequence turning a configuration file into a [`Flow`]
//!
//! The document is validated in stages because later stages depend on earlier ones:
//! the `env` section is exported first so `${NAME}` references anywhere else resolve,
//! the `flow` header then updates settings that change how modules are validated, and
//! extension documents are merged before the final strict validation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use metricflow_config::loader::{env_schema, env_vars, export_env, read_document};
use metricflow_config::merge::extend;
use metricflow_config::{Schema, Settings, ValidationErrors};
use metricflow_registry::ModuleRegistry;

use crate::compose::{flow_schema, header_schema, ComposeOptions};
use crate::error::StartupError;
use crate::flow::Flow;

/// Loads, validates and builds flows for one module registry
pub struct FlowLoader {
    registry: Arc<ModuleRegistry>,
    settings: Settings,
}

impl FlowLoader {
    pub fn new(registry: Arc<ModuleRegistry>, settings: Settings) -> Self {
        Self { registry, settings }
    }

    /// Settings as updated by the documents loaded so far
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    fn flow_schema(&self) -> Schema {
        flow_schema(self.registry.clone(), ComposeOptions::from(&self.settings))
    }

    /// Load and strictly validate the document at `path`, including its extensions
    pub fn load_configuration(&mut self, path: impl AsRef<Path>) -> Result<Value, StartupError> {
        let path = path.as_ref();
        tracing::info!(target: "loader", path = %path.display(), "Loading configuration");

        let document = object_or_empty(read_document(path)?);

        let env = report(env_schema().validate(&document))?;
        export_env(&env_vars(&env));

        let header = report(header_schema().validate(&document))?;
        self.settings.extend(&flow_settings(&header))?;

        let extends = extension_paths(&header);
        let document = if extends.is_empty() {
            document
        } else {
            self.merge_extensions(document, &extends)?
        };

        let env = env_vars(&report(env_schema().validate(&document))?);
        if !env.is_empty() {
            export_env(&env);
            self.settings.apply_env()?;
        }

        let validated = report(self.flow_schema().validate(&document))?;
        tracing::debug!(target: "loader", "Configuration is valid");
        Ok(validated)
    }

    /// Overlay every extension onto `base`, last declared first
    fn merge_extensions(
        &mut self,
        base: Value,
        extends: &[PathBuf],
    ) -> Result<Value, StartupError> {
        report(self.flow_schema().validate_loose(&base))?;

        let mut merged = base;
        for extension_path in extends.iter().rev() {
            let extension = read_document(extension_path)?;
            if extension.is_null() {
                tracing::info!(
                    target: "loader",
                    path = %extension_path.display(),
                    "Extension is empty, skipping"
                );
                continue;
            }

            tracing::debug!(target: "loader", path = %extension_path.display(), "Merging extension");
            report(self.flow_schema().validate_loose(&extension))?;
            merged = extend(merged, extension);
            self.settings.extend(&flow_settings(&merged))?;
        }
        Ok(merged)
    }

    /// Load the configured document and build its flow
    pub fn load(mut self) -> Result<Flow, StartupError> {
        let path = PathBuf::from(&self.settings.config);
        let configuration = self.load_configuration(&path)?;
        let flow = Flow::build(configuration, self.settings, &self.registry)?;
        Ok(flow.with_path(path))
    }
}

fn object_or_empty(document: Value) -> Value {
    if document.is_null() {
        Value::Object(Map::new())
    } else {
        document
    }
}

fn report(result: Result<Value, ValidationErrors>) -> Result<Value, StartupError> {
    result.map_err(|errors| {
        for invalid in errors.errors() {
            tracing::error!(
                target: "loader",
                field = %invalid.field(),
                kind = %invalid.kind,
                "{}",
                invalid.message
            );
        }
        StartupError::Validation(errors)
    })
}

fn flow_settings(document: &Value) -> Map<String, Value> {
    document
        .pointer("/flow/settings")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn extension_paths(header: &Value) -> Vec<PathBuf> {
    header
        .pointer("/flow/extends")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flow_settings_and_extension_paths() {
        let header = json!({"flow": {"version": "v1", "extends": ["a.yml", "b.yml"], "settings": {"run_once": true}}});
        assert_eq!(flow_settings(&header).get("run_once"), Some(&json!(true)));
        assert_eq!(
            extension_paths(&header),
            vec![PathBuf::from("a.yml"), PathBuf::from("b.yml")]
        );

        let bare = json!({"flow": {"version": "v1", "settings": null}});
        assert!(flow_settings(&bare).is_empty());
        assert!(extension_paths(&bare).is_empty());
    }

    #[test]
    fn test_empty_document_becomes_mapping() {
        assert_eq!(object_or_empty(Value::Null), json!({}));
        assert_eq!(object_or_empty(json!({"a": 1})), json!({"a": 1}));
    }
}
