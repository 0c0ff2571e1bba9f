//! Composable validation schemas for configuration documents
//!
//! A [`Schema`] validates a `serde_json::Value` and returns the normalized value:
//! defaults are filled in, environment references are expanded, durations are converted
//! to seconds and names are lower-cased. Failures are collected as [`ValidationErrors`]
//! carrying the path of every failing value.

pub mod error;
pub mod suggest;

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

pub use error::{Invalid, InvalidKind, Path, PathSegment, ValidationErrors};

use crate::validators::{
    coerce_bool, expand_env, parse_duration, seconds_to_json, validate_name, CronSchedule,
};

/// Result of validating one value
pub type SchemaResult = Result<Value, ValidationErrors>;

/// Options applying to a whole validation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationContext {
    /// Whether required keys must be present. Loose validation relaxes this.
    pub required: bool,
}

impl ValidationContext {
    pub fn strict() -> Self {
        Self { required: true }
    }

    pub fn loose() -> Self {
        Self { required: false }
    }
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::strict()
    }
}

/// Signature of a custom validation step
pub type CustomFn =
    dyn Fn(&Value, &ValidationContext, &mut Path) -> SchemaResult + Send + Sync + 'static;

/// A validation step implemented outside the schema vocabulary
#[derive(Clone)]
pub struct CustomValidator {
    description: String,
    func: Arc<CustomFn>,
}

impl CustomValidator {
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for CustomValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Custom({})", self.description)
    }
}

/// What to do with keys a mapping schema does not declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraKeys {
    /// Reject them with a suggestion
    Prevent,
    /// Keep them untouched
    Allow,
    /// Drop them silently
    Remove,
}

/// Whether a mapping key must be present
#[derive(Debug, Clone, PartialEq)]
pub enum Presence {
    Required,
    /// Optional key with the value inserted when it is missing
    Optional(Option<Value>),
}

/// A key of a mapping schema
#[derive(Debug, Clone)]
pub struct Field {
    pub key: String,
    pub presence: Presence,
    pub schema: Schema,
}

impl Field {
    pub fn required(key: impl Into<String>, schema: Schema) -> Self {
        Self {
            key: key.into(),
            presence: Presence::Required,
            schema,
        }
    }

    /// Optional key defaulting to `default` when missing
    pub fn optional(key: impl Into<String>, schema: Schema, default: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            presence: Presence::Optional(Some(default.into())),
            schema,
        }
    }

    /// Optional key left out when missing
    pub fn optional_without_default(key: impl Into<String>, schema: Schema) -> Self {
        Self {
            key: key.into(),
            presence: Presence::Optional(None),
            schema,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self.presence, Presence::Optional(_))
    }

    /// Default value, `null` for optional keys without one
    pub fn default_value(&self) -> Option<Value> {
        match &self.presence {
            Presence::Required => None,
            Presence::Optional(default) => Some(default.clone().unwrap_or(Value::Null)),
        }
    }
}

/// Schema of a mapping with known keys
#[derive(Debug, Clone)]
pub struct MapSchema {
    pub fields: Vec<Field>,
    pub extra: ExtraKeys,
}

impl MapSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            extra: ExtraKeys::Prevent,
        }
    }

    pub fn with_extra(mut self, extra: ExtraKeys) -> Self {
        self.extra = extra;
        self
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Add or replace a field
    pub fn insert(&mut self, field: Field) {
        match self.fields.iter_mut().find(|f| f.key == field.key) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Add or replace every field of `other`
    pub fn extend(&mut self, other: MapSchema) {
        for field in other.fields {
            self.insert(field);
        }
    }

    /// Whether every key may be omitted
    pub fn all_optional(&self) -> bool {
        self.fields.iter().all(Field::is_optional)
    }

    /// Mapping of every optional key to its default
    pub fn defaults(&self) -> Value {
        let mut defaults = Map::new();
        for field in &self.fields {
            if let Some(default) = field.default_value() {
                defaults.insert(field.key.clone(), default);
            }
        }
        Value::Object(defaults)
    }

    fn check(&self, value: &Value, ctx: &ValidationContext, path: &mut Path) -> SchemaResult {
        let Some(object) = value.as_object() else {
            return Err(invalid(path, InvalidKind::InvalidType, "expected a dictionary"));
        };

        let mut out = Map::new();
        let mut errors = ValidationErrors::default();

        for field in &self.fields {
            match object.get(&field.key) {
                Some(item) => {
                    path.push(PathSegment::Key(field.key.clone()));
                    match field.schema.check(item, ctx, path) {
                        Ok(validated) => {
                            out.insert(field.key.clone(), validated);
                        }
                        Err(e) => errors.merge(e),
                    }
                    path.pop();
                }
                None => match &field.presence {
                    Presence::Required if ctx.required => {
                        path.push(PathSegment::Key(field.key.clone()));
                        errors.push(Invalid::new(
                            path,
                            InvalidKind::RequiredKey,
                            "required key not provided",
                        ));
                        path.pop();
                    }
                    Presence::Optional(Some(default)) => {
                        out.insert(field.key.clone(), default.clone());
                    }
                    _ => {}
                },
            }
        }

        for (key, item) in object {
            if self.field(key).is_some() {
                continue;
            }
            match self.extra {
                ExtraKeys::Allow => {
                    out.insert(key.clone(), item.clone());
                }
                ExtraKeys::Remove => {}
                ExtraKeys::Prevent => {
                    path.push(PathSegment::Key(key.clone()));
                    let message = suggest::extra_key_message(
                        key,
                        item,
                        self.fields.iter().map(|f| f.key.as_str()),
                    );
                    errors.push(Invalid::new(path, InvalidKind::ExtraKey, message));
                    path.pop();
                }
            }
        }

        if errors.is_empty() {
            Ok(Value::Object(out))
        } else {
            Err(errors)
        }
    }
}

/// A composable validator for JSON values
#[derive(Debug, Clone)]
pub enum Schema {
    /// Anything, unchanged
    Any,
    Bool,
    Int,
    Number,
    Str,
    /// Exactly this value
    Literal(Value),
    /// One of a fixed set of lower-cased strings
    OneOf(Vec<String>),
    /// Integer within inclusive bounds
    Range { min: i64, max: i64 },
    /// Module or task name
    Name { allow_uppercase: bool },
    /// Duration in seconds
    Duration,
    /// Cron expression, kept as its original string
    Cron,
    /// Path to an existing file
    ExistingPath,
    /// Expand environment references before validating with the inner schema
    Env(Box<Schema>),
    List(Box<Schema>),
    /// A list, wrapping single values
    AlwaysList(Box<Schema>),
    /// `null` or the inner schema
    Maybe(Box<Schema>),
    Map(MapSchema),
    /// Mapping with arbitrary string keys and uniform values
    Dict(Box<Schema>),
    /// First alternative that validates wins
    Union(Vec<Schema>),
    Custom(CustomValidator),
}

impl Schema {
    /// Mapping rejecting unknown keys
    pub fn map(fields: Vec<Field>) -> Self {
        Schema::Map(MapSchema::new(fields))
    }

    /// Mapping keeping unknown keys
    pub fn map_allow_extra(fields: Vec<Field>) -> Self {
        Schema::Map(MapSchema::new(fields).with_extra(ExtraKeys::Allow))
    }

    /// Mapping without any keys
    pub fn empty_map() -> Self {
        Schema::map(Vec::new())
    }

    pub fn env(inner: Schema) -> Self {
        Schema::Env(Box::new(inner))
    }

    pub fn list(inner: Schema) -> Self {
        Schema::List(Box::new(inner))
    }

    pub fn always_list(inner: Schema) -> Self {
        Schema::AlwaysList(Box::new(inner))
    }

    pub fn maybe(inner: Schema) -> Self {
        Schema::Maybe(Box::new(inner))
    }

    pub fn dict(values: Schema) -> Self {
        Schema::Dict(Box::new(values))
    }

    pub fn name() -> Self {
        Schema::Name {
            allow_uppercase: false,
        }
    }

    pub fn range(min: i64, max: i64) -> Self {
        Schema::Range { min, max }
    }

    pub fn one_of<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Schema::OneOf(choices.into_iter().map(Into::into).collect())
    }

    pub fn custom<F>(description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value, &ValidationContext, &mut Path) -> SchemaResult + Send + Sync + 'static,
    {
        Schema::Custom(CustomValidator {
            description: description.into(),
            func: Arc::new(func),
        })
    }

    /// Mapping alternatives of this schema: itself, or every mapping of a union
    pub fn map_alternatives(&self) -> Vec<&MapSchema> {
        match self {
            Schema::Map(map) => vec![map],
            Schema::Union(alternatives) => alternatives
                .iter()
                .filter_map(|s| match s {
                    Schema::Map(map) => Some(map),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the schema is a mapping or a union of mappings
    pub fn is_mapping_like(&self) -> bool {
        match self {
            Schema::Map(_) => true,
            Schema::Union(alternatives) => {
                !alternatives.is_empty() && alternatives.iter().all(|s| matches!(s, Schema::Map(_)))
            }
            _ => false,
        }
    }

    /// Validate with required keys enforced
    pub fn validate(&self, value: &Value) -> SchemaResult {
        self.validate_with(value, &ValidationContext::strict())
    }

    /// Validate with required-ness relaxed
    pub fn validate_loose(&self, value: &Value) -> SchemaResult {
        self.validate_with(value, &ValidationContext::loose())
    }

    pub fn validate_with(&self, value: &Value, ctx: &ValidationContext) -> SchemaResult {
        let mut path = Vec::new();
        self.check(value, ctx, &mut path)
    }

    /// Validate a value found at `path`
    pub fn check(&self, value: &Value, ctx: &ValidationContext, path: &mut Path) -> SchemaResult {
        match self {
            Schema::Any => Ok(value.clone()),
            Schema::Bool => coerce_bool(value)
                .map(Value::Bool)
                .ok_or_else(|| invalid(path, InvalidKind::InvalidType, "expected boolean")),
            Schema::Int => coerce_int(value)
                .map(Value::from)
                .ok_or_else(|| invalid(path, InvalidKind::InvalidType, "expected int")),
            Schema::Number => check_number(value, path),
            Schema::Str => match value {
                Value::String(_) => Ok(value.clone()),
                _ => Err(invalid(path, InvalidKind::InvalidType, "expected str")),
            },
            Schema::Literal(expected) => {
                if value == expected {
                    Ok(value.clone())
                } else {
                    Err(invalid(
                        path,
                        InvalidKind::InvalidValue,
                        format!("value must be {expected}"),
                    ))
                }
            }
            Schema::OneOf(choices) => check_one_of(choices, value, path),
            Schema::Range { min, max } => {
                let n = coerce_int(value)
                    .ok_or_else(|| invalid(path, InvalidKind::InvalidType, "expected int"))?;
                if n < *min {
                    Err(invalid(
                        path,
                        InvalidKind::InvalidValue,
                        format!("value must be at least {min}"),
                    ))
                } else if n > *max {
                    Err(invalid(
                        path,
                        InvalidKind::InvalidValue,
                        format!("value must be at most {max}"),
                    ))
                } else {
                    Ok(Value::from(n))
                }
            }
            Schema::Name { allow_uppercase } => match value {
                Value::String(s) => validate_name(s, *allow_uppercase)
                    .map(Value::String)
                    .map_err(|e| invalid(path, InvalidKind::InvalidValue, e)),
                other => Err(invalid(
                    path,
                    InvalidKind::InvalidType,
                    format!("Module name `{other}` must be a string"),
                )),
            },
            Schema::Duration => match value {
                Value::Number(_) => Ok(value.clone()),
                Value::String(s) => parse_duration(s)
                    .map(seconds_to_json)
                    .map_err(|e| invalid(path, InvalidKind::InvalidValue, e)),
                _ => Err(invalid(path, InvalidKind::InvalidType, "expected a duration")),
            },
            Schema::Cron => {
                let expression = scalar_to_string(value).ok_or_else(|| {
                    invalid(path, InvalidKind::InvalidType, "expected a cron expression")
                })?;
                CronSchedule::parse(&expression)
                    .map(|_| Value::String(expression))
                    .map_err(|e| invalid(path, InvalidKind::InvalidValue, e))
            }
            Schema::ExistingPath => match value {
                Value::String(s) if std::path::Path::new(s).exists() => Ok(value.clone()),
                Value::String(s) => Err(invalid(
                    path,
                    InvalidKind::InvalidValue,
                    format!("path `{s}` does not exist"),
                )),
                _ => Err(invalid(path, InvalidKind::InvalidType, "expected a path")),
            },
            Schema::Env(inner) => match value {
                Value::String(s) => {
                    let expanded = expand_env(s)
                        .map_err(|e| invalid(path, InvalidKind::EnvDepth, e))?;
                    inner.check(&Value::String(expanded), ctx, path)
                }
                other => inner.check(other, ctx, path),
            },
            Schema::List(inner) => match value {
                Value::Array(items) => check_items(inner, items, ctx, path),
                _ => Err(invalid(path, InvalidKind::InvalidType, "expected a list")),
            },
            Schema::AlwaysList(inner) => match value {
                Value::Array(items) => check_items(inner, items, ctx, path),
                single => check_items(inner, std::slice::from_ref(single), ctx, path),
            },
            Schema::Maybe(inner) => match value {
                Value::Null => Ok(Value::Null),
                other => inner.check(other, ctx, path),
            },
            Schema::Map(map) => map.check(value, ctx, path),
            Schema::Dict(values) => {
                let Some(object) = value.as_object() else {
                    return Err(invalid(path, InvalidKind::InvalidType, "expected a dictionary"));
                };
                let mut out = Map::new();
                let mut errors = ValidationErrors::default();
                for (key, item) in object {
                    path.push(PathSegment::Key(key.clone()));
                    match values.check(item, ctx, path) {
                        Ok(validated) => {
                            out.insert(key.clone(), validated);
                        }
                        Err(e) => errors.merge(e),
                    }
                    path.pop();
                }
                if errors.is_empty() {
                    Ok(Value::Object(out))
                } else {
                    Err(errors)
                }
            }
            Schema::Union(alternatives) => check_union(alternatives, value, ctx, path),
            Schema::Custom(custom) => (custom.func)(value, ctx, path),
        }
    }
}

fn invalid(path: &[PathSegment], kind: InvalidKind, message: impl Into<String>) -> ValidationErrors {
    ValidationErrors::single(Invalid::new(path, kind, message))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn check_number(value: &Value, path: &[PathSegment]) -> SchemaResult {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                return Ok(Value::from(n));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid(path, InvalidKind::InvalidType, "expected a number"))
        }
        _ => Err(invalid(path, InvalidKind::InvalidType, "expected a number")),
    }
}

fn check_one_of(choices: &[String], value: &Value, path: &[PathSegment]) -> SchemaResult {
    let Some(raw) = scalar_to_string(value) else {
        return Err(invalid(path, InvalidKind::InvalidType, "expected str"));
    };
    let lowered = raw.to_lowercase();
    if choices.iter().any(|c| *c == lowered) {
        Ok(Value::String(lowered))
    } else {
        Err(invalid(
            path,
            InvalidKind::InvalidValue,
            format!("value must be one of [{}]", choices.join(", ")),
        ))
    }
}

fn check_items(
    inner: &Schema,
    items: &[Value],
    ctx: &ValidationContext,
    path: &mut Path,
) -> SchemaResult {
    let mut out = Vec::with_capacity(items.len());
    let mut errors = ValidationErrors::default();
    for (index, item) in items.iter().enumerate() {
        path.push(PathSegment::Index(index));
        match inner.check(item, ctx, path) {
            Ok(validated) => out.push(validated),
            Err(e) => errors.merge(e),
        }
        path.pop();
    }
    if errors.is_empty() {
        Ok(Value::Array(out))
    } else {
        Err(errors)
    }
}

/// Try alternatives in order; on total failure report the alternative that got furthest
fn check_union(
    alternatives: &[Schema],
    value: &Value,
    ctx: &ValidationContext,
    path: &mut Path,
) -> SchemaResult {
    let mut best: Option<ValidationErrors> = None;
    for alternative in alternatives {
        match alternative.check(value, ctx, path) {
            Ok(validated) => return Ok(validated),
            Err(errors) => {
                let better = match &best {
                    None => true,
                    Some(current) => {
                        errors.depth() > current.depth()
                            || (errors.depth() == current.depth() && errors.len() < current.len())
                    }
                };
                if better {
                    best = Some(errors);
                }
            }
        }
    }
    Err(best.unwrap_or_else(|| {
        invalid(path, InvalidKind::InvalidValue, "no alternative schema declared")
    }))
}

/// Field for a sub-document that may be omitted entirely when all of its keys are optional
///
/// For a union, the first alternative whose keys are all optional provides the default.
pub fn optional_subschema(key: &str, schema: Schema) -> Field {
    let default = schema
        .map_alternatives()
        .into_iter()
        .find(|map| map.all_optional())
        .map(MapSchema::defaults);

    match default {
        Some(default) => Field::optional(key, schema, default),
        None => Field::required(key, schema),
    }
}
