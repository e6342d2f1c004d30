use super::types::{CmpOp, Filter, FindOptions, Limit, Order, PaginateOptions, Pred, Projection, SortSpec};
use crate::errors::DbError;
use regex::RegexBuilder;
use serde_json::{Map, Value};

/// Decodes a raw JSON filter into a [`Filter`] tree.
///
/// `null` is accepted as "no filter". Unknown `$`-operators are skipped with
/// a warning; structurally malformed logical operators are a validation
/// error.
///
/// # Errors
/// Returns `DbError::Validation` for non-object filters and malformed
/// logical connectives.
pub fn parse_filter(raw: &Value) -> Result<Filter, DbError> {
    match raw {
        Value::Null => Ok(Filter::True),
        Value::Object(map) => parse_filter_object(map),
        other => Err(DbError::Validation(format!("filter must be an object, got {other}"))),
    }
}

fn parse_filter_object(map: &Map<String, Value>) -> Result<Filter, DbError> {
    let mut clauses = Vec::with_capacity(map.len());
    for (key, value) in map {
        match key.as_str() {
            "$and" => clauses.push(Filter::And(parse_filter_list(key, value)?)),
            "$or" => clauses.push(Filter::Or(parse_filter_list(key, value)?)),
            "$nor" => clauses.push(Filter::Nor(parse_filter_list(key, value)?)),
            "$not" => clauses.push(Filter::Not(Box::new(parse_filter(value)?))),
            op if op.starts_with('$') => {
                log::warn!("ignoring unknown filter operator {op}");
            }
            path => {
                if let Some(preds) = as_operator_map(value) {
                    clauses.push(Filter::Field { path: path.to_string(), preds: parse_pred_map(preds) });
                } else {
                    clauses.push(Filter::Equals { path: path.to_string(), value: value.clone() });
                }
            }
        }
    }
    Ok(match clauses.len() {
        0 => Filter::True,
        1 => clauses.pop().unwrap_or(Filter::True),
        _ => Filter::And(clauses),
    })
}

fn parse_filter_list(op: &str, value: &Value) -> Result<Vec<Filter>, DbError> {
    let Value::Array(items) = value else {
        return Err(DbError::Validation(format!("{op} expects an array of filters")));
    };
    items.iter().map(parse_filter).collect()
}

/// A plain document whose every key begins with `$` is a per-field operator
/// map; anything else is a literal value to compare against.
fn as_operator_map(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => Some(map),
        _ => None,
    }
}

fn parse_pred_map(map: &Map<String, Value>) -> Vec<Pred> {
    let options = map.get("$options").and_then(Value::as_str).unwrap_or("");
    let mut preds = Vec::with_capacity(map.len());
    for (op, payload) in map {
        match op.as_str() {
            // consumed by $regex
            "$options" => {}
            "$eq" => preds.push(Pred::Eq(payload.clone())),
            "$ne" => preds.push(Pred::Ne(payload.clone())),
            "$gt" => preds.push(Pred::Cmp { op: CmpOp::Gt, value: payload.clone() }),
            "$gte" => preds.push(Pred::Cmp { op: CmpOp::Gte, value: payload.clone() }),
            "$lt" => preds.push(Pred::Cmp { op: CmpOp::Lt, value: payload.clone() }),
            "$lte" => preds.push(Pred::Cmp { op: CmpOp::Lte, value: payload.clone() }),
            "$in" => preds.push(parse_membership(payload, Pred::In)),
            "$nin" => preds.push(parse_membership(payload, Pred::Nin)),
            "$exists" => preds.push(match payload {
                Value::Bool(b) => Pred::Exists(*b),
                _ => Pred::Never,
            }),
            "$regex" => preds.push(parse_regex(payload, options)),
            "$mod" => preds.push(parse_mod(payload)),
            "$not" => preds.push(match as_operator_map(payload) {
                Some(inner) => Pred::Not(parse_pred_map(inner)),
                None => Pred::Never,
            }),
            unknown => log::warn!("ignoring unknown field operator {unknown}"),
        }
    }
    preds
}

fn parse_membership(payload: &Value, build: fn(Vec<Value>) -> Pred) -> Pred {
    match payload {
        Value::Array(items) => build(items.clone()),
        _ => Pred::Never,
    }
}

fn parse_regex(payload: &Value, options: &str) -> Pred {
    let Value::String(pattern) = payload else {
        return Pred::Never;
    };
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            _ => &mut builder,
        };
    }
    match builder.build() {
        Ok(re) => Pred::Regex(re),
        Err(e) => {
            log::warn!("invalid $regex pattern {pattern:?}: {e}");
            Pred::Never
        }
    }
}

fn parse_mod(payload: &Value) -> Pred {
    if let Value::Array(items) = payload
        && items.len() == 2
        && let (Some(divisor), Some(remainder)) = (items[0].as_f64(), items[1].as_f64())
    {
        return Pred::Mod { divisor, remainder };
    }
    Pred::Never
}

/// Decodes `{projection, sort, skip, limit}`; unknown keys are ignored.
///
/// # Errors
/// Returns `DbError::Validation` for negative skip/limit or malformed
/// projection/sort documents.
pub fn parse_find_options(raw: &Value) -> Result<FindOptions, DbError> {
    let map = match raw {
        Value::Null => return Ok(FindOptions::default()),
        Value::Object(map) => map,
        other => return Err(DbError::Validation(format!("options must be an object, got {other}"))),
    };
    let mut opts = FindOptions::default();
    if let Some(projection) = map.get("projection") {
        opts.projection = parse_projection(projection)?;
    }
    if let Some(sort) = map.get("sort") {
        opts.sort = parse_sort(sort)?;
    }
    if let Some(skip) = map.get("skip") {
        opts.skip = parse_count_field("skip", skip)?;
    }
    if let Some(limit) = map.get("limit") {
        opts.limit = parse_limit(limit)?;
    }
    Ok(opts)
}

/// Decodes a projection document into include or exclude mode.
///
/// # Errors
/// Returns `DbError::Validation` when a value is not 1/true/0/false.
pub fn parse_projection(raw: &Value) -> Result<Option<Projection>, DbError> {
    let map = match raw {
        Value::Null => return Ok(None),
        Value::Object(map) => map,
        other => {
            return Err(DbError::Validation(format!("projection must be an object, got {other}")));
        }
    };
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for (path, flag) in map {
        match projection_mode(flag) {
            Some(true) => include.push(path.clone()),
            Some(false) => exclude.push(path.clone()),
            None => {
                return Err(DbError::Validation(format!(
                    "projection value for {path:?} must be 1/true or 0/false"
                )));
            }
        }
    }
    Ok(match (include.is_empty(), exclude.is_empty()) {
        (true, true) => None,
        (false, true) => Some(Projection::Include(include)),
        (true, false) => Some(Projection::Exclude(exclude)),
        (false, false) => Some(Projection::Mixed),
    })
}

fn projection_mode(flag: &Value) -> Option<bool> {
    match flag {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(true),
            Some(f) if f == 0.0 => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Decodes a sort document (field → ±1), preserving key order.
///
/// # Errors
/// Returns `DbError::Validation` for non-object sorts or directions other
/// than 1 and -1.
pub fn parse_sort(raw: &Value) -> Result<Option<Vec<SortSpec>>, DbError> {
    let map = match raw {
        Value::Null => return Ok(None),
        Value::Object(map) => map,
        other => return Err(DbError::Validation(format!("sort must be an object, got {other}"))),
    };
    let mut specs = Vec::with_capacity(map.len());
    for (field, dir) in map {
        let order = match dir.as_i64() {
            Some(1) => Order::Asc,
            Some(-1) => Order::Desc,
            _ => {
                return Err(DbError::Validation(format!(
                    "sort direction for {field:?} must be 1 or -1"
                )));
            }
        };
        specs.push(SortSpec { field: field.clone(), order });
    }
    Ok(if specs.is_empty() { None } else { Some(specs) })
}

fn parse_count_field(name: &str, raw: &Value) -> Result<usize, DbError> {
    match raw.as_i64() {
        Some(n) if n >= 0 => Ok(n as usize),
        _ => Err(DbError::Validation(format!("{name} must be a non-negative integer"))),
    }
}

fn parse_limit(raw: &Value) -> Result<Limit, DbError> {
    match raw {
        Value::String(s) if s == "all" => Ok(Limit::All),
        Value::Number(_) => Ok(Limit::N(parse_count_field("limit", raw)?)),
        other => Err(DbError::Validation(format!("limit must be a number or \"all\", got {other}"))),
    }
}

/// Decodes `{page, limit, sort}` for pagination.
///
/// # Errors
/// Returns `DbError::Validation` when page or limit is not a positive
/// integer.
pub fn parse_paginate_options(raw: &Value) -> Result<PaginateOptions, DbError> {
    let map = match raw {
        Value::Null => return Ok(PaginateOptions::default()),
        Value::Object(map) => map,
        other => return Err(DbError::Validation(format!("options must be an object, got {other}"))),
    };
    let mut opts = PaginateOptions::default();
    if let Some(page) = map.get("page") {
        opts.page = match page.as_i64() {
            Some(n) if n >= 1 => n as usize,
            _ => return Err(DbError::Validation("page must be a positive integer".into())),
        };
    }
    if let Some(limit) = map.get("limit") {
        opts.limit = match limit.as_i64() {
            Some(n) if n >= 1 => n as usize,
            _ => return Err(DbError::Validation("limit must be a positive integer".into())),
        };
    }
    if let Some(sort) = map.get("sort") {
        opts.sort = parse_sort(sort)?;
    }
    Ok(opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_and_null_filters_match_all() {
        assert!(matches!(parse_filter(&json!({})).unwrap(), Filter::True));
        assert!(matches!(parse_filter(&Value::Null).unwrap(), Filter::True));
        assert!(parse_filter(&json!([1])).is_err());
    }

    #[test]
    fn implicit_and_over_fields() {
        let f = parse_filter(&json!({"a": 1, "b": {"$gt": 2}})).unwrap();
        let Filter::And(clauses) = f else { panic!("expected And") };
        assert_eq!(clauses.len(), 2);
        assert!(matches!(&clauses[0], Filter::Equals { path, .. } if path == "a"));
        assert!(matches!(&clauses[1], Filter::Field { path, preds } if path == "b" && preds.len() == 1));
    }

    #[test]
    fn logical_operators_parse() {
        let f = parse_filter(&json!({"$or": [{"a": 1}, {"b": 2}], "$nor": [{"c": 3}]})).unwrap();
        let Filter::And(clauses) = f else { panic!("expected And") };
        assert!(matches!(&clauses[0], Filter::Or(v) if v.len() == 2));
        assert!(matches!(&clauses[1], Filter::Nor(v) if v.len() == 1));
        assert!(parse_filter(&json!({"$and": {"a": 1}})).is_err());
    }

    #[test]
    fn operator_map_vs_literal_object() {
        // every key starts with $: operator map
        let f = parse_filter(&json!({"x": {"$gte": 1, "$lt": 5}})).unwrap();
        assert!(matches!(f, Filter::Field { ref preds, .. } if preds.len() == 2));
        // plain nested object: literal deep equality
        let f = parse_filter(&json!({"x": {"a": 1}})).unwrap();
        assert!(matches!(f, Filter::Equals { .. }));
    }

    #[test]
    fn malformed_payloads_become_never() {
        let f = parse_filter(&json!({"x": {"$mod": [3]}})).unwrap();
        assert!(matches!(f, Filter::Field { ref preds, .. } if matches!(preds[0], Pred::Never)));
        let f = parse_filter(&json!({"x": {"$regex": "("}})).unwrap();
        assert!(matches!(f, Filter::Field { ref preds, .. } if matches!(preds[0], Pred::Never)));
        let f = parse_filter(&json!({"x": {"$in": 5}})).unwrap();
        assert!(matches!(f, Filter::Field { ref preds, .. } if matches!(preds[0], Pred::Never)));
    }

    #[test]
    fn regex_options_are_consumed() {
        let f = parse_filter(&json!({"x": {"$regex": "^ab", "$options": "i"}})).unwrap();
        let Filter::Field { preds, .. } = f else { panic!("expected Field") };
        assert_eq!(preds.len(), 1, "$options must not produce its own predicate");
        assert!(matches!(&preds[0], Pred::Regex(re) if re.is_match("AB")));
    }

    #[test]
    fn find_options_validation() {
        let opts = parse_find_options(&json!({"skip": 3, "limit": "all"})).unwrap();
        assert_eq!(opts.skip, 3);
        assert_eq!(opts.limit, Limit::All);
        assert!(parse_find_options(&json!({"skip": -1})).is_err());
        assert!(parse_find_options(&json!({"limit": "most"})).is_err());
        assert!(parse_find_options(&json!({"limit": -4})).is_err());
    }

    #[test]
    fn projection_modes() {
        assert!(matches!(
            parse_projection(&json!({"a": 1, "b": true})).unwrap(),
            Some(Projection::Include(v)) if v == ["a", "b"]
        ));
        assert!(matches!(
            parse_projection(&json!({"a": 0})).unwrap(),
            Some(Projection::Exclude(v)) if v == ["a"]
        ));
        assert!(matches!(
            parse_projection(&json!({"a": 1, "b": 0})).unwrap(),
            Some(Projection::Mixed)
        ));
        assert!(parse_projection(&json!({"a": 2})).is_err());
    }

    #[test]
    fn sort_preserves_key_order() {
        let specs = parse_sort(&json!({"b": -1, "a": 1})).unwrap().unwrap();
        assert_eq!(specs[0].field, "b");
        assert_eq!(specs[0].order, Order::Desc);
        assert_eq!(specs[1].field, "a");
        assert!(parse_sort(&json!({"a": 2})).is_err());
    }

    #[test]
    fn paginate_options_bounds() {
        let opts = parse_paginate_options(&json!({"page": 2, "limit": 25})).unwrap();
        assert_eq!((opts.page, opts.limit), (2, 25));
        assert!(parse_paginate_options(&json!({"page": 0})).is_err());
        assert!(parse_paginate_options(&json!({"limit": -2})).is_err());
    }
}
