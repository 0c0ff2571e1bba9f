//! Helpers for nested attribute paths
//!
//! Attribute trees are plain JSON mappings. Paths address nested mappings by joining
//! keys with a separator, e.g. `http.status` for `{"http": {"status": 200}}`.

use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};

/// Flatten a mapping into `path -> leaf` pairs, descending into mappings and sequences
///
/// Sequence elements are addressed by their index, so `{"a": [1, {"b": 2}]}` becomes
/// `{"a.0": 1, "a.1.b": 2}`.
pub fn flatten(map: &Map<String, Value>, sep: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in map {
        flatten_value(key.clone(), value, sep, &mut out);
    }
    out
}

fn flatten_value(prefix: String, value: &Value, sep: &str, out: &mut Map<String, Value>) {
    match value {
        Value::Object(inner) if !inner.is_empty() => {
            for (key, value) in inner {
                flatten_value(format!("{prefix}{sep}{key}"), value, sep, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, value) in items.iter().enumerate() {
                flatten_value(format!("{prefix}{sep}{index}"), value, sep, out);
            }
        }
        leaf => {
            out.insert(prefix, leaf.clone());
        }
    }
}

/// Collect the key chain of every leaf reachable through nested mappings
///
/// Sequences are treated as leaves. Chains are returned in document order together with
/// their joined representation.
pub fn leaf_chains(map: &Map<String, Value>, sep: &str) -> Vec<(String, Vec<String>)> {
    let mut out = Vec::new();
    collect_chains(map, &mut Vec::new(), sep, &mut out);
    out
}

fn collect_chains(
    map: &Map<String, Value>,
    chain: &mut Vec<String>,
    sep: &str,
    out: &mut Vec<(String, Vec<String>)>,
) {
    for (key, value) in map {
        chain.push(key.clone());
        match value {
            Value::Object(inner) if !inner.is_empty() => collect_chains(inner, chain, sep, out),
            _ => out.push((chain.join(sep), chain.clone())),
        }
        chain.pop();
    }
}

/// Split a path into its key chain
pub fn split_path<'a>(path: &'a str, sep: &str) -> Vec<&'a str> {
    if sep.is_empty() {
        return vec![path];
    }
    path.split(sep).collect()
}

/// Look up a nested value by key chain
pub fn get_chain<'a, S: AsRef<str>>(map: &'a Map<String, Value>, chain: &[S]) -> Option<&'a Value> {
    let (last, parents) = chain.split_last()?;
    let mut current = map;
    for key in parents {
        current = current.get(key.as_ref())?.as_object()?;
    }
    current.get(last.as_ref())
}

/// Remove a nested value by key chain, leaving its parents in place
pub fn remove_chain<S: AsRef<str>>(map: &mut Map<String, Value>, chain: &[S]) -> Option<Value> {
    let (last, parents) = chain.split_last()?;
    let mut current = map;
    for key in parents {
        current = current.get_mut(key.as_ref())?.as_object_mut()?;
    }
    current.remove(last.as_ref())
}

/// Insert a value at a nested key chain, creating intermediate mappings
pub fn insert_chain<S: AsRef<str>>(
    map: &mut Map<String, Value>,
    chain: &[S],
    value: Value,
) -> CoreResult<()> {
    let Some((last, parents)) = chain.split_last() else {
        return Ok(());
    };

    let mut current = map;
    for (depth, key) in parents.iter().enumerate() {
        let entry = current
            .entry(key.as_ref().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(inner) => inner,
            _ => {
                let path: Vec<&str> = chain[..=depth].iter().map(|s| s.as_ref()).collect();
                return Err(CoreError::PathConflict { path: path.join("/") });
            }
        };
    }
    current.insert(last.as_ref().to_string(), value);
    Ok(())
}
