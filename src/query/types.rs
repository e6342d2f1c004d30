use regex::Regex;
use serde_json::Value;

/// Decoded filter tree. A raw JSON filter is parsed once into this shape so
/// evaluation does not re-inspect key prefixes per document.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Empty filter: matches everything.
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    /// Per-field operator map, e.g. `{score: {$gte: 10}}`.
    Field { path: String, preds: Vec<Pred> },
    /// Bare value comparison, e.g. `{name: "alice"}`.
    Equals { path: String, value: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

/// One per-field operator predicate.
#[derive(Debug, Clone)]
pub enum Pred {
    Eq(Value),
    Ne(Value),
    Cmp { op: CmpOp, value: Value },
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Mod { divisor: f64, remainder: f64 },
    Not(Vec<Pred>),
    /// Malformed operator payload: matches nothing.
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

/// Result-set bound: a count, or the literal string `"all"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
    #[default]
    All,
    N(usize),
}

#[derive(Debug, Clone)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
    /// Include and exclude were mixed; unsupported, documents pass through.
    Mixed,
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Option<Vec<SortSpec>>,
    pub skip: usize,
    pub limit: Limit,
}

#[derive(Debug, Clone)]
pub struct PaginateOptions {
    pub page: usize,
    pub limit: usize,
    pub sort: Option<Vec<SortSpec>>,
}

impl Default for PaginateOptions {
    fn default() -> Self {
        Self { page: 1, limit: 10, sort: None }
    }
}
