//! Update-operator interpretation with dotted-path mutation.

use crate::document::{Document, is_reserved_field};
use crate::errors::DbError;
use crate::query::values_equal;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A decoded update specification. A plain document (no `$` keys) is
/// treated as `{$set: doc}`.
#[derive(Debug, Clone, Default)]
pub struct UpdateSpec {
    pub set: Vec<(String, Value)>,
    pub unset: Vec<String>,
    pub inc: Vec<(String, f64)>,
    pub push: Vec<(String, Value)>,
    pub add_to_set: Vec<(String, Vec<Value>)>,
    pub pull: Vec<(String, PullArg)>,
}

#[derive(Debug, Clone)]
pub enum PullArg {
    Equals(Value),
    In(Vec<Value>),
}

/// Decodes a raw update document.
///
/// # Errors
/// Returns `DbError::Validation` for non-object specs and non-numeric
/// `$inc` payloads.
pub fn parse_update(raw: &Value) -> Result<UpdateSpec, DbError> {
    let Value::Object(map) = raw else {
        return Err(DbError::Validation(format!("update spec must be an object, got {raw}")));
    };
    let mut spec = UpdateSpec::default();
    if !map.keys().any(|k| k.starts_with('$')) {
        spec.set = filtered_paths(map).map(|(k, v)| (k.clone(), v.clone())).collect();
        return Ok(spec);
    }
    for (op, payload) in map {
        match op.as_str() {
            "$set" => {
                let fields = operand_object(op, payload)?;
                spec.set.extend(filtered_paths(fields).map(|(k, v)| (k.clone(), v.clone())));
            }
            "$unset" => match payload {
                Value::Object(fields) => {
                    spec.unset.extend(filtered_paths(fields).map(|(k, _)| k.clone()));
                }
                Value::Array(keys) => {
                    for key in keys {
                        if let Value::String(k) = key
                            && !reserved_root(k)
                        {
                            spec.unset.push(k.clone());
                        }
                    }
                }
                other => {
                    return Err(DbError::Validation(format!(
                        "$unset expects an object or array, got {other}"
                    )));
                }
            },
            "$inc" => {
                let fields = operand_object(op, payload)?;
                for (k, v) in filtered_paths(fields) {
                    let Some(n) = v.as_f64() else {
                        return Err(DbError::Validation(format!("$inc for {k:?} must be numeric")));
                    };
                    spec.inc.push((k.clone(), n));
                }
            }
            "$push" => {
                let fields = operand_object(op, payload)?;
                spec.push.extend(filtered_paths(fields).map(|(k, v)| (k.clone(), v.clone())));
            }
            "$addToSet" => {
                let fields = operand_object(op, payload)?;
                for (k, v) in filtered_paths(fields) {
                    spec.add_to_set.push((k.clone(), each_values(v)));
                }
            }
            "$pull" => {
                let fields = operand_object(op, payload)?;
                for (k, v) in filtered_paths(fields) {
                    spec.pull.push((k.clone(), pull_arg(v)));
                }
            }
            unknown if unknown.starts_with('$') => {
                log::warn!("ignoring unknown update operator {unknown}");
            }
            plain => {
                log::warn!("ignoring bare field {plain:?} in operator-form update");
            }
        }
    }
    Ok(spec)
}

fn operand_object<'a>(op: &str, payload: &'a Value) -> Result<&'a Map<String, Value>, DbError> {
    match payload {
        Value::Object(map) => Ok(map),
        other => Err(DbError::Validation(format!("{op} expects an object, got {other}"))),
    }
}

/// Skips paths rooted at a reserved field; those are engine-managed.
fn filtered_paths(map: &Map<String, Value>) -> impl Iterator<Item = (&String, &Value)> {
    map.iter().filter(|(k, _)| {
        if reserved_root(k) {
            log::warn!("ignoring update of reserved field {k:?}");
            false
        } else {
            true
        }
    })
}

fn reserved_root(path: &str) -> bool {
    is_reserved_field(path.split('.').next().unwrap_or(path))
}

fn each_values(v: &Value) -> Vec<Value> {
    if let Value::Object(map) = v
        && map.len() == 1
        && let Some(Value::Array(items)) = map.get("$each")
    {
        return items.clone();
    }
    vec![v.clone()]
}

fn pull_arg(v: &Value) -> PullArg {
    if let Value::Object(map) = v
        && map.len() == 1
        && let Some(Value::Array(items)) = map.get("$in")
    {
        return PullArg::In(items.clone());
    }
    PullArg::Equals(v.clone())
}

/// Applies a decoded spec to one document and refreshes `updatedAt`.
/// Returns whether any field actually changed.
pub fn apply_update(doc: &mut Document, spec: &UpdateSpec, now: DateTime<Utc>) -> bool {
    let mut changed = false;
    for (path, value) in &spec.set {
        changed |= set_path(&mut doc.fields, path, value.clone());
    }
    for (path, delta) in &spec.inc {
        changed |= inc_path(&mut doc.fields, path, *delta);
    }
    for (path, value) in &spec.push {
        push_path(&mut doc.fields, path, value.clone());
        changed = true;
    }
    for (path, values) in &spec.add_to_set {
        changed |= add_to_set_path(&mut doc.fields, path, values);
    }
    for (path, arg) in &spec.pull {
        changed |= pull_path(&mut doc.fields, path, arg);
    }
    for path in &spec.unset {
        changed |= unset_path(&mut doc.fields, path);
    }
    doc.touch(now);
    changed
}

/// Walks to the parent of the leaf, creating intermediate objects on demand
/// and replacing non-object intermediates.
fn ensure_parent<'a>(root: &'a mut Map<String, Value>, path: &str) -> (&'a mut Map<String, Value>, String) {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    let mut leaf = String::new();
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            leaf = segment.to_string();
            break;
        }
        let needs_new = !matches!(current.get(segment), Some(Value::Object(_)));
        if needs_new {
            current.insert(segment.to_string(), Value::Object(Map::new()));
        }
        current = match current.get_mut(segment) {
            Some(Value::Object(next)) => next,
            _ => unreachable!("intermediate was just ensured"),
        };
    }
    (current, leaf)
}

/// Walks to the parent of the leaf through existing objects only.
fn lookup_parent<'a>(
    root: &'a mut Map<String, Value>,
    path: &str,
) -> Option<(&'a mut Map<String, Value>, String)> {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            return Some((current, segment.to_string()));
        }
        current = match current.get_mut(segment) {
            Some(Value::Object(next)) => next,
            _ => return None,
        };
    }
    None
}

fn get_path_value(root: &Map<String, Value>, path: &str) -> Option<Value> {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            return current.get(segment).cloned();
        }
        current = match current.get(segment) {
            Some(Value::Object(next)) => next,
            _ => return None,
        };
    }
    None
}

fn set_path(root: &mut Map<String, Value>, path: &str, value: Value) -> bool {
    let (parent, leaf) = ensure_parent(root, path);
    let previous = parent.insert(leaf, value.clone());
    previous.as_ref().is_none_or(|p| !values_equal(p, &value))
}

fn unset_path(root: &mut Map<String, Value>, path: &str) -> bool {
    lookup_parent(root, path).is_some_and(|(parent, leaf)| parent.shift_remove(&leaf).is_some())
}

/// Numeric add; a missing or non-numeric leaf counts as 0.
fn inc_path(root: &mut Map<String, Value>, path: &str, delta: f64) -> bool {
    let base = get_path_value(root, path).and_then(|v| v.as_f64()).unwrap_or(0.0);
    let incremented = serde_json::Number::from_f64(base + delta)
        .map_or(Value::Null, Value::Number);
    set_path(root, path, incremented)
}

fn push_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    let (parent, leaf) = ensure_parent(root, path);
    match parent.get_mut(&leaf) {
        Some(Value::Array(items)) => items.push(value),
        _ => {
            parent.insert(leaf, Value::Array(vec![value]));
        }
    }
}

fn add_to_set_path(root: &mut Map<String, Value>, path: &str, values: &[Value]) -> bool {
    let (parent, leaf) = ensure_parent(root, path);
    if !matches!(parent.get(&leaf), Some(Value::Array(_))) {
        parent.insert(leaf.clone(), Value::Array(Vec::new()));
    }
    let Some(Value::Array(items)) = parent.get_mut(&leaf) else {
        return false;
    };
    let mut added = false;
    for candidate in values {
        if !items.iter().any(|x| values_equal(x, candidate)) {
            items.push(candidate.clone());
            added = true;
        }
    }
    added
}

fn pull_path(root: &mut Map<String, Value>, path: &str, arg: &PullArg) -> bool {
    let Some((parent, leaf)) = lookup_parent(root, path) else {
        return false;
    };
    let Some(Value::Array(items)) = parent.get_mut(&leaf) else {
        return false;
    };
    let before = items.len();
    match arg {
        PullArg::Equals(value) => items.retain(|x| !values_equal(x, value)),
        PullArg::In(set) => items.retain(|x| !set.iter().any(|v| values_equal(x, v))),
    }
    items.len() != before
}
