//! Template extension merging
//!
//! Extension documents are overlaid onto a base configuration before final validation.
//! Mappings merge key by key, sequences merge items by their `name` and everything else
//! is replaced by the extension value.

use serde_json::{Map, Value};

/// Overlay `extension` onto `base`
///
/// - mapping onto mapping: every extension key is merged into the base value of that key
/// - sequence onto sequence: a mapping item with a non-empty `name` is merged into the
///   first base item with the same name, all other items are appended
/// - anything else: the extension value replaces the base value
pub fn extend(base: Value, extension: Value) -> Value {
    match extension {
        Value::Array(items) => {
            let mut merged = match base {
                Value::Array(existing) => existing,
                _ => Vec::new(),
            };
            for item in items {
                merge_named_item(&mut merged, item);
            }
            Value::Array(merged)
        }
        Value::Object(entries) => {
            let mut merged = match base {
                Value::Object(existing) => existing,
                _ => Map::new(),
            };
            for (key, value) in entries {
                let current = merged.remove(&key).unwrap_or(Value::Null);
                merged.insert(key, extend(current, value));
            }
            Value::Object(merged)
        }
        scalar => scalar,
    }
}

fn item_name(item: &Value) -> Option<&str> {
    match item.get("name") {
        Some(Value::String(name)) if !name.is_empty() => Some(name),
        _ => None,
    }
}

fn merge_named_item(base: &mut Vec<Value>, item: Value) {
    let Some(name) = item_name(&item).map(str::to_string) else {
        base.push(item);
        return;
    };

    match base.iter().position(|b| item_name(b) == Some(name.as_str())) {
        Some(index) => {
            let current = std::mem::take(&mut base[index]);
            base[index] = extend(current, item);
        }
        None => base.push(item),
    }
}

/// Merge extensions declared as `[first, second, ...]` onto `base`
///
/// Extensions are applied in reverse declaration order, so earlier declarations win on
/// conflicting scalars. `on_merged` sees the configuration after every merge step.
pub fn merge_extensions<F>(base: Value, extensions: Vec<Value>, mut on_merged: F) -> Value
where
    F: FnMut(&Value),
{
    let mut merged = base;
    for extension in extensions.into_iter().rev() {
        merged = extend(merged, extension);
        on_merged(&merged);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_zero_extensions_is_identity() {
        let base = json!({"sources": [{"name": "a", "type": "static"}], "flow": {"version": "v1"}});
        let merged = merge_extensions(base.clone(), Vec::new(), |_| {});
        assert_eq!(merged, base);
    }

    #[test]
    fn test_named_items_merge_in_place() {
        let base = json!([{"name": "a"}, {"name": "b"}]);
        let extension = json!([{"name": "a", "x": 1}, {"name": "c"}]);

        assert_eq!(
            extend(base, extension),
            json!([{"name": "a", "x": 1}, {"name": "b"}, {"name": "c"}])
        );
    }

    #[test]
    fn test_unnamed_items_append() {
        let base = json!([1, {"type": "x"}]);
        let extension = json!([{"type": "x"}, 2, {"name": ""}]);
        assert_eq!(
            extend(base, extension),
            json!([1, {"type": "x"}, {"type": "x"}, 2, {"name": ""}])
        );
    }

    #[test]
    fn test_mappings_merge_recursively() {
        let base = json!({"a": {"b": 1, "c": 2}, "d": [1]});
        let extension = json!({"a": {"c": 3, "e": 4}, "d": [2], "f": "new"});
        assert_eq!(
            extend(base, extension),
            json!({"a": {"b": 1, "c": 3, "e": 4}, "d": [1, 2], "f": "new"})
        );
    }

    #[test]
    fn test_new_keys_accept_sequences() {
        let merged = extend(json!({}), json!({"transforms": [{"name": "t"}]}));
        assert_eq!(merged, json!({"transforms": [{"name": "t"}]}));
    }

    #[test]
    fn test_earlier_extensions_take_precedence() {
        let base = json!({"flow": {"settings": {"log_level": "info"}}});
        let file_a = json!({"flow": {"settings": {"log_level": "debug"}}});
        let file_b = json!({"flow": {"settings": {"log_level": "error", "run_once": true}}});

        let mut steps = Vec::new();
        let merged = merge_extensions(base, vec![file_a, file_b], |m| steps.push(m.clone()));

        assert_eq!(
            merged,
            json!({"flow": {"settings": {"log_level": "debug", "run_once": true}}})
        );
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["flow"]["settings"]["log_level"], json!("error"));
    }

    #[test]
    fn test_nested_named_tasks_merge() {
        let base = json!({"sources": [{"name": "src", "tasks": [{"name": "t1", "cron": "* * * * *"}]}]});
        let extension =
            json!({"sources": [{"name": "src", "tasks": [{"name": "t1", "enabled": false}]}]});
        assert_eq!(
            extend(base, extension),
            json!({"sources": [{"name": "src", "tasks": [{"name": "t1", "cron": "* * * * *", "enabled": false}]}]})
        );
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,6}".prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
        ]
    }

    fn document() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_merging_nothing_keeps_document(doc in document()) {
            prop_assert_eq!(merge_extensions(doc.clone(), Vec::new(), |_| {}), doc);
        }

        #[test]
        fn prop_extension_scalars_win(doc in document(), key in "[a-z]{1,4}", value in leaf()) {
            let mut extension = Map::new();
            extension.insert(key.clone(), value.clone());
            let merged = extend(doc, Value::Object(extension));
            prop_assert_eq!(merged.get(&key), Some(&value));
        }
    }
}
