//! Task repetition
//!
//! A task may declare `repeat_for`, a mapping of equal-length lists. The task is then
//! expanded into one copy per index with every string leaf rendered through `${name}`
//! substitution, where `name` is a `repeat_for` key or the running index `i`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::schema::{Invalid, InvalidKind, PathSegment, Schema, ValidationErrors};

/// Key declaring the repetition lists
pub const REPEAT_KEY: &str = "repeat_for";

/// Name of the implicit running index placeholder
pub const INDEX_PLACEHOLDER: &str = "i";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder pattern")
});

/// Substitute `${name}` placeholders, leaving unknown ones untouched
pub fn render_str(template: &str, parameters: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            parameters
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Render every string leaf of a document
pub fn render(value: &mut Value, parameters: &HashMap<String, String>) {
    match value {
        Value::String(s) => *s = render_str(s, parameters),
        Value::Array(items) => items.iter_mut().for_each(|item| render(item, parameters)),
        Value::Object(entries) => entries.values_mut().for_each(|item| render(item, parameters)),
        _ => {}
    }
}

/// Schema of the `repeat_for` key: `null` or string lists of equal length
pub fn repeat_schema() -> Schema {
    Schema::maybe(Schema::custom("equal length lists", |value, ctx, path| {
        let lists = Schema::dict(Schema::always_list(Schema::Any)).check(value, ctx, path)?;
        let mut normalized = Map::new();
        let mut first: Option<(String, usize)> = None;

        if let Value::Object(entries) = lists {
            for (key, items) in entries {
                let items: Vec<Value> = match items {
                    Value::Array(items) => items.into_iter().map(stringify).collect(),
                    other => vec![stringify(other)],
                };

                match &first {
                    None => first = Some((key.clone(), items.len())),
                    Some((first_key, length)) if *length != items.len() => {
                        let mut at = path.clone();
                        at.push(PathSegment::Key(key.clone()));
                        return Err(ValidationErrors::single(Invalid::new(
                            &at,
                            InvalidKind::InvalidValue,
                            format!(
                                "Length of {key} ({}) is unequal to {first_key} ({length})",
                                items.len()
                            ),
                        )));
                    }
                    Some(_) => {}
                }
                normalized.insert(key, Value::Array(items));
            }
        }
        Ok(Value::Object(normalized))
    }))
}

fn stringify(value: Value) -> Value {
    match value {
        Value::String(_) => value,
        Value::Null => Value::String(String::new()),
        other => Value::String(other.to_string()),
    }
}

/// Expand a raw task configuration into its repetitions
///
/// Without `repeat_for` the task is returned unchanged. With an empty mapping no task is
/// produced.
pub fn expand_task(task: &Value) -> Result<Vec<Value>, ValidationErrors> {
    let declared = task.get(REPEAT_KEY).cloned().unwrap_or(Value::Null);
    let mut path = vec![PathSegment::Key(REPEAT_KEY.to_string())];
    let lists = repeat_schema().check(&declared, &Default::default(), &mut path)?;

    let Value::Object(lists) = lists else {
        return Ok(vec![task.clone()]);
    };

    let length = lists
        .values()
        .next()
        .and_then(Value::as_array)
        .map_or(0, Vec::len);

    let mut expanded = Vec::with_capacity(length);
    for index in 0..length {
        let mut parameters: HashMap<String, String> = lists
            .iter()
            .filter_map(|(key, items)| {
                let item = items.get(index)?.as_str()?;
                Some((key.clone(), item.to_string()))
            })
            .collect();
        parameters.insert(INDEX_PLACEHOLDER.to_string(), index.to_string());

        let mut copy = task.clone();
        render(&mut copy, &parameters);
        expanded.push(copy);
    }
    Ok(expanded)
}
