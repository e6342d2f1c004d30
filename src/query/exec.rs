use super::cache::QueryCache;
use super::eval::{compare_values, matches};
use super::project::apply_projection;
use super::types::{Filter, FindOptions, Limit, Order, Projection, SortSpec};
use crate::document::Document;
use crate::document::path::resolve_doc;
use serde_json::Value;
use std::cmp::Ordering;

/// Positions of the documents matching `filter`, in insertion order.
/// Results are memoized in the collection's query cache; the cache is
/// cleared on every write, so hits are always current.
pub fn filter_positions(
    data: &[Document],
    cache: &mut QueryCache,
    raw_filter: &Value,
    filter: &Filter,
) -> Vec<usize> {
    let key = QueryCache::key(raw_filter, data.len());
    if let Some(hit) = cache.get(&key) {
        return hit.clone();
    }
    let positions: Vec<usize> =
        data.iter().enumerate().filter(|(_, d)| matches(d, filter)).map(|(i, _)| i).collect();
    cache.put(key, positions.clone());
    positions
}

pub fn run_count(
    data: &[Document],
    cache: &mut QueryCache,
    raw_filter: &Value,
    filter: &Filter,
) -> u64 {
    filter_positions(data, cache, raw_filter, filter).len() as u64
}

/// The full read pipeline, in fixed order:
/// filter → sort → skip → limit → project.
pub fn run_find(
    data: &[Document],
    cache: &mut QueryCache,
    raw_filter: &Value,
    filter: &Filter,
    opts: &FindOptions,
) -> Vec<Value> {
    let mut positions = filter_positions(data, cache, raw_filter, filter);
    if let Some(sort) = &opts.sort {
        sort_positions(data, &mut positions, sort);
    }
    let selected = page_slice(positions, opts.skip, opts.limit);
    project_positions(data, &selected, opts.projection.as_ref())
}

pub(crate) fn sort_positions(data: &[Document], positions: &mut [usize], sort: &[SortSpec]) {
    positions.sort_by(|&a, &b| compare_docs(&data[a], &data[b], sort));
}

/// Lexicographic comparison across the sort keys; absent sorts before
/// present, and direction flips the whole per-key ordering.
#[must_use]
pub fn compare_docs(a: &Document, b: &Document, sort: &[SortSpec]) -> Ordering {
    for spec in sort {
        let va = resolve_doc(a, &spec.field);
        let vb = resolve_doc(b, &spec.field);
        let ord = match (va.as_deref(), vb.as_deref()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare_values(x, y),
        };
        if ord != Ordering::Equal {
            return if spec.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

pub(crate) fn page_slice(positions: Vec<usize>, skip: usize, limit: Limit) -> Vec<usize> {
    if skip >= positions.len() {
        return Vec::new();
    }
    let end = match limit {
        Limit::All => positions.len(),
        Limit::N(n) => skip.saturating_add(n).min(positions.len()),
    };
    positions[skip..end].to_vec()
}

fn project_positions(
    data: &[Document],
    positions: &[usize],
    projection: Option<&Projection>,
) -> Vec<Value> {
    if matches!(projection, Some(Projection::Mixed)) {
        log::warn!("projection mixes include and exclude; returning documents unmodified");
    }
    positions
        .iter()
        .map(|&i| match projection {
            Some(p) => apply_projection(&data[i], p),
            None => data[i].to_value(),
        })
        .collect()
}
