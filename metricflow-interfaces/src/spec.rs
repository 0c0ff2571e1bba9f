//! Validated configuration handed to module factories

use std::sync::Arc;

use metricflow_config::Settings;
use serde_json::Value;

/// Validated configuration of one module instance
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    /// Registered type name
    pub type_name: String,
    /// Resolved unique instance name
    pub name: String,
    /// Position in its configuration list
    pub index: usize,
    /// Validated `connection` section
    pub connection: Value,
    /// Validated `params` section, `null` for sources
    pub params: Value,
    /// Settings of the flow the module belongs to
    pub settings: Arc<Settings>,
}

impl ModuleSpec {
    /// Spec with empty sections, useful when instantiating modules directly
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            index: 0,
            connection: Value::Object(Default::default()),
            params: Value::Object(Default::default()),
            settings: Arc::new(Settings::default()),
        }
    }

    pub fn with_connection(mut self, connection: Value) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_settings(mut self, settings: Arc<Settings>) -> Self {
        self.settings = settings;
        self
    }

    /// Deserialize the connection section into a typed struct
    pub fn connection_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.connection.clone())
    }

    /// Deserialize the params section into a typed struct
    pub fn params_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.params.clone())
    }
}
