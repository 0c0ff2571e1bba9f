//! Schema composition for flow documents
//!
//! Every module entry is validated in two passes. The base fields (`type`, `name`,
//! `enabled`) are checked first with unknown keys allowed, which yields the module type.
//! The full schema of that entry is then assembled from the registry's fragments for the
//! type plus the fields its category carries (tasks, params, routing filters, modifiers,
//! priority) and applied with unknown keys rejected.

use std::sync::Arc;

use serde_json::{json, Value};

use metricflow_config::repeat::{expand_task, repeat_schema, REPEAT_KEY};
use metricflow_config::{
    loader, optional_subschema, ExtraKeys, Field, Invalid, InvalidKind, MapSchema, PathSegment,
    Schema, Settings, ValidationContext, ValidationErrors,
};
use metricflow_interfaces::ModuleCategory;
use metricflow_registry::{ModuleDescriptor, ModuleRegistry};

/// Bounds of a transform's priority
pub const PRIORITY_RANGE: (i64, i64) = (-256, 256);

/// Routing filter keys of transforms and sinks
pub const FILTER_KEYS: [&str; 4] = [
    "include_sources",
    "exclude_sources",
    "include_tasks",
    "exclude_tasks",
];

/// Settings that change the shape or defaults of the composed schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeOptions {
    pub disable_default: bool,
    pub skip_disabled_validation: bool,
    pub run_once: bool,
}

impl From<&Settings> for ComposeOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            disable_default: settings.disable_default,
            skip_disabled_validation: settings.skip_disabled_validation,
            run_once: settings.run_once,
        }
    }
}

fn single(path: &[PathSegment], kind: InvalidKind, message: impl Into<String>) -> ValidationErrors {
    ValidationErrors::single(Invalid::new(path, kind, message))
}

fn lower_str() -> Schema {
    Schema::custom("lower-case string", |value, ctx, path| {
        let checked = Schema::Str.check(value, ctx, path)?;
        Ok(Value::String(
            checked.as_str().unwrap_or_default().to_lowercase(),
        ))
    })
}

/// Fields shared by every module entry
pub fn base_fields(options: ComposeOptions) -> MapSchema {
    MapSchema::new(vec![
        Field::required("type", Schema::name()),
        Field::optional("name", Schema::maybe(Schema::name()), Value::Null),
        Field::optional("enabled", Schema::Bool, !options.disable_default),
    ])
}

fn filter_fields() -> Vec<Field> {
    FILTER_KEYS
        .iter()
        .map(|key| {
            Field::optional(*key, Schema::maybe(Schema::always_list(lower_str())), Value::Null)
        })
        .collect()
}

fn modifiers_field() -> Field {
    optional_subschema(
        "modifiers",
        Schema::map(vec![
            Field::optional("time_modulus", Schema::env(Schema::Duration), 1),
            Field::optional("time_offset", Schema::env(Schema::Duration), 0),
        ]),
    )
}

fn priority_field() -> Field {
    let (min, max) = PRIORITY_RANGE;
    Field::optional("priority", Schema::range(min, max), 0)
}

/// Schema of one (already expanded) task of a source
pub fn task_schema(descriptor: &ModuleDescriptor, options: ComposeOptions) -> Schema {
    let (retries, delay) = if options.run_once { (0, 0) } else { (2, 10) };

    let result = Schema::map(vec![
        Field::optional(
            "metrics",
            Schema::maybe(Schema::always_list(Schema::Str)),
            json!(["metric"]),
        ),
        Field::optional(
            "attributes",
            Schema::maybe(Schema::always_list(Schema::Str)),
            Value::Null,
        ),
    ]);

    Schema::map(vec![
        Field::required("name", Schema::name()),
        Field::required("cron", Schema::Cron),
        optional_subschema("result", result),
        Field::optional(
            "static_attributes",
            Schema::maybe(Schema::dict(Schema::Any)),
            json!({}),
        ),
        Field::optional("enabled", Schema::Bool, true),
        Field::optional("max_retries", Schema::range(0, i64::from(u32::MAX)), retries),
        Field::optional("retry_delay", Schema::Duration, delay),
        optional_subschema("params", descriptor.params_schema()),
        Field::optional(REPEAT_KEY, repeat_schema(), Value::Null),
    ])
}

/// Schema of a source's task list, expanding `repeat_for` declarations
pub fn task_list_schema(descriptor: &ModuleDescriptor, options: ComposeOptions) -> Schema {
    let task = task_schema(descriptor, options);

    Schema::custom("task list", move |value, ctx, path| {
        let Value::Array(items) = value else {
            return Err(single(path, InvalidKind::InvalidType, "expected a list"));
        };

        let mut tasks = Vec::with_capacity(items.len());
        let mut errors = ValidationErrors::default();

        for (index, item) in items.iter().enumerate() {
            path.push(PathSegment::Index(index));
            match expand_task(item) {
                Ok(expanded) => {
                    for repetition in expanded {
                        match task.check(&repetition, ctx, path) {
                            Ok(validated) => tasks.push(validated),
                            Err(e) => errors.merge(e),
                        }
                    }
                }
                Err(e) => errors.merge(e.prefixed(path)),
            }
            path.pop();
        }

        if errors.is_empty() {
            Ok(Value::Array(tasks))
        } else {
            Err(errors)
        }
    })
}

/// Full schema of one module entry of a known type
pub fn module_schema(
    category: ModuleCategory,
    descriptor: &ModuleDescriptor,
    options: ComposeOptions,
) -> Schema {
    let mut schema = base_fields(options);
    schema.insert(optional_subschema(
        "connection",
        descriptor.connection_schema(),
    ));

    match category {
        ModuleCategory::Source => {
            schema.insert(Field::optional(
                "tasks",
                task_list_schema(descriptor, options),
                json!([]),
            ));
            schema.insert(modifiers_field());
        }
        ModuleCategory::Transform => {
            schema.insert(optional_subschema("params", descriptor.params_schema()));
            schema.extend(MapSchema::new(filter_fields()));
            schema.insert(priority_field());
        }
        ModuleCategory::Sink => {
            schema.insert(optional_subschema("params", descriptor.params_schema()));
            schema.extend(MapSchema::new(filter_fields()));
            schema.insert(modifiers_field());
        }
    }

    Schema::Map(schema.with_extra(ExtraKeys::Prevent))
}

fn check_module(
    registry: &ModuleRegistry,
    category: ModuleCategory,
    options: ComposeOptions,
    item: &Value,
    ctx: &ValidationContext,
    path: &mut Vec<PathSegment>,
) -> Result<Value, ValidationErrors> {
    let base = Schema::Map(base_fields(options).with_extra(ExtraKeys::Allow)).check(item, ctx, path)?;

    let enabled = base.get("enabled").and_then(Value::as_bool).unwrap_or(true);
    if options.skip_disabled_validation && !enabled {
        return Ok(base);
    }

    // Extension items may only override a named base entry
    let Some(type_name) = base.get("type").and_then(Value::as_str) else {
        return Ok(item.clone());
    };
    let descriptor = match registry.get(category, type_name) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            path.push(PathSegment::Key("type".to_string()));
            let error = single(path, InvalidKind::UnknownModule, e.to_string());
            path.pop();
            return Err(error);
        }
    };

    module_schema(category, descriptor, options).check(&base, ctx, path)
}

/// Schema of one category's module list
pub fn modules_schema(
    category: ModuleCategory,
    registry: Arc<ModuleRegistry>,
    options: ComposeOptions,
) -> Schema {
    Schema::custom(format!("{category} list"), move |value, ctx, path| {
        let Value::Array(items) = value else {
            return Err(single(path, InvalidKind::InvalidType, "expected a list"));
        };

        let mut modules = Vec::with_capacity(items.len());
        let mut errors = ValidationErrors::default();

        for (index, item) in items.iter().enumerate() {
            path.push(PathSegment::Index(index));
            match check_module(&registry, category, options, item, ctx, path) {
                Ok(validated) => modules.push(validated),
                Err(e) => errors.merge(e),
            }
            path.pop();
        }

        if errors.is_empty() {
            Ok(Value::Array(modules))
        } else {
            Err(errors)
        }
    })
}

fn header_field() -> Field {
    Field::required(
        "flow",
        Schema::map(vec![
            Field::required("version", Schema::Literal(json!("v1"))),
            Field::optional(
                "extends",
                Schema::always_list(Schema::env(Schema::ExistingPath)),
                json!([]),
            ),
            Field::optional("settings", Schema::maybe(Settings::schema()), json!({})),
        ]),
    )
}

/// Schema checking only the `flow` header of a document
pub fn header_schema() -> Schema {
    Schema::map_allow_extra(vec![header_field()])
}

/// Schema of a complete flow document
pub fn flow_schema(registry: Arc<ModuleRegistry>, options: ComposeOptions) -> Schema {
    Schema::map(vec![
        header_field(),
        loader::env_field(),
        Field::required(
            ModuleCategory::Source.config_key(),
            modules_schema(ModuleCategory::Source, registry.clone(), options),
        ),
        Field::optional(
            ModuleCategory::Transform.config_key(),
            modules_schema(ModuleCategory::Transform, registry.clone(), options),
            json!([]),
        ),
        Field::required(
            ModuleCategory::Sink.config_key(),
            modules_schema(ModuleCategory::Sink, registry, options),
        ),
    ])
}
