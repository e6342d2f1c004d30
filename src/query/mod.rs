// Submodules for separation of concerns
mod cache;
mod eval;
mod exec;
mod parse;
mod project;
mod types;

pub use cache::QueryCache;
pub use eval::{compare_values, matches, values_equal};
pub use exec::{compare_docs, filter_positions, run_count, run_find};
pub(crate) use exec::{page_slice, sort_positions};
pub use parse::{parse_filter, parse_find_options, parse_paginate_options, parse_projection, parse_sort};
pub use project::apply_projection;
pub use types::{
    CmpOp, Filter, FindOptions, Limit, Order, PaginateOptions, Pred, Projection, SortSpec,
};
