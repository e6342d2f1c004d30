use super::types::{CmpOp, Filter, Pred};
use crate::document::Document;
use crate::document::path::resolve_doc;
use serde_json::Value;
use std::cmp::Ordering;

/// Evaluates a decoded filter against a document. Pure function of
/// (document, filter).
#[must_use]
pub fn matches(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| matches(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| matches(doc, f)),
        Filter::Nor(fs) => !fs.iter().any(|f| matches(doc, f)),
        Filter::Not(f) => !matches(doc, f),
        Filter::Field { path, preds } => {
            let resolved = resolve_doc(doc, path);
            let value = resolved.as_deref();
            preds.iter().all(|p| eval_pred(value, p))
        }
        Filter::Equals { path, value } => {
            resolve_doc(doc, path).as_deref().is_some_and(|v| eq_match(v, value))
        }
    }
}

/// Applies one operator predicate to a resolved value (`None` = absent).
///
/// When the resolved value is an array, positive predicates match if any
/// element satisfies them; `$ne`/`$nin` are the negations of `$eq`/`$in`.
/// On absence only `$exists:false` and `$ne` match.
fn eval_pred(value: Option<&Value>, pred: &Pred) -> bool {
    let Some(v) = value else {
        return matches!(pred, Pred::Exists(false) | Pred::Ne(_));
    };
    match pred {
        Pred::Eq(expected) => eq_match(v, expected),
        Pred::Ne(expected) => !eq_match(v, expected),
        Pred::Cmp { op, value: expected } => {
            any_element(v, |x| ordering_match(x, expected, *op))
        }
        Pred::In(set) => in_match(v, set),
        Pred::Nin(set) => !in_match(v, set),
        Pred::Exists(expected) => *expected,
        Pred::Regex(re) => any_element(v, |x| stringify_scalar(x).is_some_and(|s| re.is_match(&s))),
        Pred::Mod { divisor, remainder } => any_element(v, |x| {
            *divisor != 0.0
                && x.as_f64().is_some_and(|n| (n % divisor) == *remainder)
        }),
        Pred::Not(preds) => !preds.iter().all(|p| eval_pred(Some(v), p)),
        Pred::Never => false,
    }
}

fn any_element(value: &Value, pred: impl Fn(&Value) -> bool) -> bool {
    match value {
        Value::Array(items) => items.iter().any(pred),
        scalar => pred(scalar),
    }
}

/// Bare equality: an array matches if it contains the expected value,
/// anything else matches by structural equality.
fn eq_match(value: &Value, expected: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|x| values_equal(x, expected)),
        scalar => values_equal(scalar, expected),
    }
}

/// The value itself, or any element of an array value, appears in `set`.
fn in_match(value: &Value, set: &[Value]) -> bool {
    if set.iter().any(|x| values_equal(value, x)) {
        return true;
    }
    match value {
        Value::Array(items) => items.iter().any(|el| set.iter().any(|x| values_equal(el, x))),
        _ => false,
    }
}

fn ordering_match(value: &Value, expected: &Value, op: CmpOp) -> bool {
    let ord = match (value, expected) {
        (Value::Number(a), Value::Number(b)) => {
            a.as_f64().unwrap_or(f64::NAN).total_cmp(&b.as_f64().unwrap_or(f64::NAN))
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        // Ordering is defined for numbers and strings only.
        _ => return false,
    };
    match op {
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Gte => ord != Ordering::Less,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Lte => ord != Ordering::Greater,
    }
}

fn stringify_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Structural equality with numeric coercion: `1 == 1.0`. Objects compare
/// field-order-independently.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64().zip(y.as_f64()).is_some_and(|(f, g)| f == g),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, v)| ys.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Stable total order across heterogeneous values, used for sorting.
/// Types rank `Null < Bool < Number < String < Array < Object`; callers
/// must not rely on the relative order of mixed types beyond stability.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let ra = type_rank(a);
    let rb = type_rank(b);
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            x.as_f64().unwrap_or(f64::NAN).total_cmp(&y.as_f64().unwrap_or(f64::NAN))
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(xs), Value::Array(ys)) => {
            for (x, y) in xs.iter().zip(ys) {
                let ord = compare_values(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        // Deterministic, not semantically meaningful.
        (Value::Object(_), Value::Object(_)) => {
            serde_json::to_string(a).unwrap_or_default().cmp(&serde_json::to_string(b).unwrap_or_default())
        }
        _ => Ordering::Equal,
    }
}

const fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
