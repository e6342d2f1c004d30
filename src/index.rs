//! Composite secondary indexes.
//!
//! An index maps an ordered tuple of field values to the positions of the
//! documents carrying them. Documents missing any indexed field are absent
//! from the index. Directions are recorded for future ordered traversal;
//! equality lookup ignores them.

use crate::document::Document;
use crate::document::path::resolve_doc;
use crate::errors::DbError;
use ordered_float::OrderedFloat;
use serde_json::Value;
use std::collections::BTreeMap;

/// One component of an index key, totally ordered across value types.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Num(OrderedFloat<f64>),
    Str(String),
    /// Arrays and objects key by their canonical serialization.
    Json(String),
}

impl KeyPart {
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Num(OrderedFloat(n.as_f64().unwrap_or(f64::NAN))),
            Value::String(s) => Self::Str(s.clone()),
            other => Self::Json(serde_json::to_string(other).unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    name: String,
    fields: Vec<(String, i8)>,
    map: BTreeMap<Vec<KeyPart>, Vec<usize>>,
}

impl SecondaryIndex {
    #[must_use]
    pub fn new(name: String, fields: Vec<(String, i8)>) -> Self {
        Self { name, fields, map: BTreeMap::new() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, i8)] {
        &self.fields
    }

    /// The key tuple for a document, or `None` when any indexed field is
    /// absent.
    #[must_use]
    pub fn key_for(&self, doc: &Document) -> Option<Vec<KeyPart>> {
        self.fields
            .iter()
            .map(|(field, _)| resolve_doc(doc, field).map(|v| KeyPart::from_value(&v)))
            .collect()
    }

    pub fn add(&mut self, key: Vec<KeyPart>, position: usize) {
        self.map.entry(key).or_default().push(position);
    }

    pub fn remove(&mut self, key: &[KeyPart], position: usize) {
        if let Some(positions) = self.map.get_mut(key) {
            positions.retain(|&p| p != position);
            if positions.is_empty() {
                self.map.remove(key);
            }
        }
    }

    /// Repopulates the index from scratch by scanning the collection.
    pub fn rebuild(&mut self, data: &[Document]) {
        self.map.clear();
        for (position, doc) in data.iter().enumerate() {
            if let Some(key) = self.key_for(doc) {
                self.add(key, position);
            }
        }
    }

    /// Equality lookup over the full key tuple.
    #[must_use]
    pub fn lookup(&self, values: &[Value]) -> Vec<usize> {
        if values.len() != self.fields.len() {
            return Vec::new();
        }
        let key: Vec<KeyPart> = values.iter().map(KeyPart::from_value).collect();
        self.map.get(&key).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    /// Checks the index against the collection contents: every document
    /// with all indexed fields defined appears exactly once at its current
    /// position, and nothing else does.
    #[must_use]
    pub fn is_consistent(&self, data: &[Document]) -> bool {
        let mut expected: BTreeMap<Vec<KeyPart>, Vec<usize>> = BTreeMap::new();
        for (position, doc) in data.iter().enumerate() {
            if let Some(key) = self.key_for(doc) {
                expected.entry(key).or_default().push(position);
            }
        }
        let mut actual = self.map.clone();
        for positions in actual.values_mut() {
            positions.sort_unstable();
        }
        actual == expected
    }
}

/// Decodes an index specification: either a bare `{field: ±1, ...}` map or
/// `{name, fields: {field: ±1, ...}}`.
///
/// # Errors
/// Returns `DbError::Validation` for empty specs or directions other than
/// 1 and -1.
pub fn parse_index_spec(raw: &Value) -> Result<(String, Vec<(String, i8)>), DbError> {
    let Value::Object(map) = raw else {
        return Err(DbError::Validation(format!("index spec must be an object, got {raw}")));
    };
    let (explicit_name, field_map) = match (map.get("name"), map.get("fields")) {
        (name, Some(Value::Object(fields))) => (name.and_then(Value::as_str), fields),
        _ => (None, map),
    };
    let mut fields = Vec::with_capacity(field_map.len());
    for (field, dir) in field_map {
        match dir.as_i64() {
            Some(1) => fields.push((field.clone(), 1i8)),
            Some(-1) => fields.push((field.clone(), -1i8)),
            _ => {
                return Err(DbError::Validation(format!(
                    "index direction for {field:?} must be 1 or -1"
                )));
            }
        }
    }
    if fields.is_empty() {
        return Err(DbError::Validation("index spec names no fields".into()));
    }
    let name = explicit_name.map_or_else(|| derive_name(&fields), str::to_string);
    Ok((name, fields))
}

fn derive_name(fields: &[(String, i8)]) -> String {
    fields.iter().map(|(f, d)| format!("{f}_{d}")).collect::<Vec<_>>().join("_")
}
