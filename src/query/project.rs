use super::types::Projection;
use crate::document::Document;
use crate::document::path::resolve_doc;
use serde_json::{Map, Value};

/// Applies a projection to one document, producing its JSON rendering.
///
/// Inclusion builds a flat object keyed by the (possibly dotted) projection
/// paths; exclusion deep-copies the document and removes the addressed
/// leaves. The reserved fields follow the same rules as any other field.
#[must_use]
pub fn apply_projection(doc: &Document, projection: &Projection) -> Value {
    match projection {
        Projection::Include(paths) => {
            let mut out = Map::with_capacity(paths.len());
            for path in paths {
                if let Some(v) = resolve_doc(doc, path) {
                    out.insert(path.clone(), v.into_owned());
                }
            }
            Value::Object(out)
        }
        Projection::Exclude(paths) => {
            let mut value = doc.to_value();
            for path in paths {
                remove_leaf(&mut value, path);
            }
            value
        }
        // Unsupported combination: the caller warned; pass through.
        Projection::Mixed => doc.to_value(),
    }
}

/// Deletes the leaf addressed by a dotted path, descending objects only.
fn remove_leaf(value: &mut Value, path: &str) {
    let mut segments = path.split('.').peekable();
    let mut current = value;
    while let Some(segment) = segments.next() {
        let Value::Object(map) = current else { return };
        if segments.peek().is_none() {
            map.shift_remove(segment);
            return;
        }
        match map.get_mut(segment) {
            Some(next) => current = next,
            None => return,
        }
    }
}
