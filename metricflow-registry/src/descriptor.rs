//! Descriptors of registered module types

use std::fmt;
use std::sync::Arc;

use metricflow_config::validators::validate_name;
use metricflow_config::Schema;
use metricflow_interfaces::{
    ModuleCategory, ModuleResult, ModuleSpec, ProcessorType, Sink, Source, SourceType,
    Transform,
};

/// Factory of a schema fragment
pub type SchemaFactory = Arc<dyn Fn() -> Schema + Send + Sync>;

type SourceFactory = Arc<dyn Fn(&ModuleSpec) -> ModuleResult<Box<dyn Source>> + Send + Sync>;
type TransformFactory =
    Arc<dyn Fn(&ModuleSpec) -> ModuleResult<Box<dyn Transform>> + Send + Sync>;
type SinkFactory = Arc<dyn Fn(&ModuleSpec) -> ModuleResult<Box<dyn Sink>> + Send + Sync>;

/// Instance factory of a module type; the variant fixes the module's category
#[derive(Clone)]
pub enum ModuleFactory {
    Source(SourceFactory),
    Transform(TransformFactory),
    Sink(SinkFactory),
}

impl ModuleFactory {
    pub fn source<F>(factory: F) -> Self
    where
        F: Fn(&ModuleSpec) -> ModuleResult<Box<dyn Source>> + Send + Sync + 'static,
    {
        ModuleFactory::Source(Arc::new(factory))
    }

    pub fn transform<F>(factory: F) -> Self
    where
        F: Fn(&ModuleSpec) -> ModuleResult<Box<dyn Transform>> + Send + Sync + 'static,
    {
        ModuleFactory::Transform(Arc::new(factory))
    }

    pub fn sink<F>(factory: F) -> Self
    where
        F: Fn(&ModuleSpec) -> ModuleResult<Box<dyn Sink>> + Send + Sync + 'static,
    {
        ModuleFactory::Sink(Arc::new(factory))
    }

    pub fn category(&self) -> ModuleCategory {
        match self {
            ModuleFactory::Source(_) => ModuleCategory::Source,
            ModuleFactory::Transform(_) => ModuleCategory::Transform,
            ModuleFactory::Sink(_) => ModuleCategory::Sink,
        }
    }
}

/// A constructed module instance
pub enum ModuleHandle {
    Source(Box<dyn Source>),
    Transform(Box<dyn Transform>),
    Sink(Box<dyn Sink>),
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let category = match self {
            ModuleHandle::Source(_) => "Source",
            ModuleHandle::Transform(_) => "Transform",
            ModuleHandle::Sink(_) => "Sink",
        };
        write!(f, "ModuleHandle::{category}")
    }
}

/// A registered module type
#[derive(Clone)]
pub struct ModuleDescriptor {
    type_name: String,
    doc: Option<String>,
    connection_schema: SchemaFactory,
    params_schema: SchemaFactory,
    factory: ModuleFactory,
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("type_name", &self.type_name)
            .field("category", &self.category())
            .field("doc", &self.doc)
            .finish()
    }
}

fn non_empty(doc: &str) -> Option<String> {
    let doc = doc.trim();
    (!doc.is_empty()).then(|| doc.to_string())
}

impl ModuleDescriptor {
    /// Descriptor with empty schemas, refined with the `with_*` builders
    pub fn new(type_name: impl Into<String>, factory: ModuleFactory) -> Self {
        Self {
            type_name: type_name.into(),
            doc: None,
            connection_schema: Arc::new(Schema::empty_map),
            params_schema: Arc::new(Schema::empty_map),
            factory,
        }
    }

    /// Descriptor of a source implementation
    pub fn source<T: SourceType>() -> Self {
        Self {
            type_name: T::TYPE_NAME.to_string(),
            doc: non_empty(T::DOC),
            connection_schema: Arc::new(T::connection_schema),
            params_schema: Arc::new(T::task_params_schema),
            factory: ModuleFactory::source(|spec| Ok(Box::new(T::create(spec)?) as Box<dyn Source>)),
        }
    }

    /// Descriptor of a transform implementation
    pub fn transform<T: Transform + ProcessorType>() -> Self {
        Self {
            type_name: T::TYPE_NAME.to_string(),
            doc: non_empty(T::DOC),
            connection_schema: Arc::new(T::connection_schema),
            params_schema: Arc::new(T::params_schema),
            factory: ModuleFactory::transform(|spec| {
                Ok(Box::new(T::create(spec)?) as Box<dyn Transform>)
            }),
        }
    }

    /// Descriptor of a sink implementation
    pub fn sink<T: Sink + ProcessorType>() -> Self {
        Self {
            type_name: T::TYPE_NAME.to_string(),
            doc: non_empty(T::DOC),
            connection_schema: Arc::new(T::connection_schema),
            params_schema: Arc::new(T::params_schema),
            factory: ModuleFactory::sink(|spec| Ok(Box::new(T::create(spec)?) as Box<dyn Sink>)),
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = non_empty(&doc.into());
        self
    }

    pub fn with_connection_schema<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Schema + Send + Sync + 'static,
    {
        self.connection_schema = Arc::new(factory);
        self
    }

    /// Schema of task params for sources, of `params` for transforms and sinks
    pub fn with_params_schema<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Schema + Send + Sync + 'static,
    {
        self.params_schema = Arc::new(factory);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn category(&self) -> ModuleCategory {
        self.factory.category()
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn connection_schema(&self) -> Schema {
        (self.connection_schema)()
    }

    pub fn params_schema(&self) -> Schema {
        (self.params_schema)()
    }

    /// Instantiate the module from its validated configuration
    pub fn instantiate(&self, spec: &ModuleSpec) -> ModuleResult<ModuleHandle> {
        Ok(match &self.factory {
            ModuleFactory::Source(factory) => ModuleHandle::Source(factory(spec)?),
            ModuleFactory::Transform(factory) => ModuleHandle::Transform(factory(spec)?),
            ModuleFactory::Sink(factory) => ModuleHandle::Sink(factory(spec)?),
        })
    }

    /// Check the structural contract, returning non-fatal warnings on success
    pub fn check_contract(&self) -> Result<Vec<String>, String> {
        if self.type_name.trim().is_empty() {
            return Err("type name must not be empty".to_string());
        }
        let normalized = validate_name(&self.type_name, false)?;
        if normalized != self.type_name {
            return Err(format!("type name `{}` must be lower-case", self.type_name));
        }

        if !self.connection_schema().is_mapping_like() {
            return Err("Connection-Schema must be a mapping or a union of mappings".to_string());
        }

        if !self.params_schema().is_mapping_like() {
            let which = match self.category() {
                ModuleCategory::Source => "Task-Schema",
                _ => "Params-Schema",
            };
            return Err(format!("{which} must be a mapping or a union of mappings"));
        }

        let mut warnings = Vec::new();
        if self.doc.is_none() {
            warnings.push(format!("Module {} has no documentation.", self.type_name));
        }
        Ok(warnings)
    }
}
