//! Dotted-path resolution over document values.
//!
//! A path either reaches a concrete value, or is "absent" (`None`), which
//! is distinct from the value `null`. Traversing *through* an array with a
//! non-index segment evaluates the remaining path against each element and
//! returns the collected results as a synthetic array, flattening nested
//! array results one level.

use super::core::{Document, FIELD_CREATED_AT, FIELD_ID, FIELD_UPDATED_AT, format_ts};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Resolves `path` against a full document, including the reserved fields.
#[must_use]
pub fn resolve_doc<'a>(doc: &'a Document, path: &str) -> Option<Cow<'a, Value>> {
    match path {
        FIELD_ID => Some(Cow::Owned(Value::String(doc.id.clone()))),
        FIELD_CREATED_AT => Some(Cow::Owned(Value::String(format_ts(doc.created_at)))),
        FIELD_UPDATED_AT => Some(Cow::Owned(Value::String(format_ts(doc.updated_at)))),
        _ => resolve_path(&doc.fields, path),
    }
}

/// Resolves `path` against a bare field map.
#[must_use]
pub fn resolve_path<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<Cow<'a, Value>> {
    if path.is_empty() {
        return None;
    }
    let segments: Vec<&str> = path.split('.').collect();
    let first = fields.get(segments[0])?;
    resolve_value(first, &segments[1..])
}

fn resolve_value<'a>(mut current: &'a Value, segments: &[&str]) -> Option<Cow<'a, Value>> {
    for (i, segment) in segments.iter().enumerate() {
        match current {
            Value::Object(map) => current = map.get(*segment)?,
            Value::Array(items) => {
                if let Ok(index) = segment.parse::<usize>() {
                    current = items.get(index)?;
                } else {
                    return resolve_across(items, &segments[i..]);
                }
            }
            // A scalar before the path is consumed: absent.
            _ => return None,
        }
    }
    Some(Cow::Borrowed(current))
}

/// Evaluates the remaining path against every array element and collects
/// the non-absent results into a synthetic array.
fn resolve_across<'a>(items: &'a [Value], rest: &[&str]) -> Option<Cow<'a, Value>> {
    let mut collected = Vec::new();
    for element in items {
        if let Some(sub) = resolve_value(element, rest) {
            match sub.into_owned() {
                Value::Array(inner) => collected.extend(inner),
                other => collected.push(other),
            }
        }
    }
    if collected.is_empty() { None } else { Some(Cow::Owned(Value::Array(collected))) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn get(doc: &Map<String, Value>, path: &str) -> Option<Value> {
        resolve_path(doc, path).map(Cow::into_owned)
    }

    #[test]
    fn plain_and_nested_fields() {
        let d = fields(json!({"a": 1, "b": {"c": {"d": "deep"}}, "n": null}));
        assert_eq!(get(&d, "a"), Some(json!(1)));
        assert_eq!(get(&d, "b.c.d"), Some(json!("deep")));
        // null is a value, not absence
        assert_eq!(get(&d, "n"), Some(Value::Null));
        assert_eq!(get(&d, "missing"), None);
        assert_eq!(get(&d, "b.c.x"), None);
        assert_eq!(get(&d, "a.b"), None);
    }

    #[test]
    fn numeric_segments_index_arrays() {
        let d = fields(json!({"xs": [10, 20, 30], "m": [{"v": 1}, {"v": 2}]}));
        assert_eq!(get(&d, "xs.1"), Some(json!(20)));
        assert_eq!(get(&d, "xs.9"), None);
        assert_eq!(get(&d, "m.0.v"), Some(json!(1)));
    }

    #[test]
    fn traversal_collects_synthetic_array() {
        let d = fields(json!({"items": [{"tag": "a"}, {"tag": "b"}, {"other": 1}]}));
        assert_eq!(get(&d, "items.tag"), Some(json!(["a", "b"])));
        assert_eq!(get(&d, "items.nope"), None);
    }

    #[test]
    fn traversal_flattens_one_level() {
        let d = fields(json!({"rows": [{"xs": [1, 2]}, {"xs": [3]}, {"xs": 4}]}));
        assert_eq!(get(&d, "rows.xs"), Some(json!([1, 2, 3, 4])));
        let nested = fields(json!({"rows": [{"xs": [[1], [2]]}]}));
        // One level only: inner arrays survive.
        assert_eq!(get(&nested, "rows.xs"), Some(json!([[1], [2]])));
    }

    #[test]
    fn reserved_roots_resolve_on_documents() {
        let doc = Document::new("abc".into(), fields(json!({"x": 1})), Utc::now());
        assert_eq!(resolve_doc(&doc, "id").map(Cow::into_owned), Some(json!("abc")));
        assert!(resolve_doc(&doc, "createdAt").is_some());
        assert_eq!(resolve_doc(&doc, "x").map(Cow::into_owned), Some(json!(1)));
        assert!(resolve_doc(&doc, "id.sub").is_none());
    }
}
