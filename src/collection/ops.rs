use super::core::{Collection, CollectionState};
use crate::document::{Document, FIELD_ID, batch_prefix, coerce_id, random_id};
use crate::errors::DbError;
use crate::index::{KeyPart, SecondaryIndex, parse_index_spec};
use crate::query::{
    self, Limit, filter_positions, page_slice, parse_filter, parse_find_options,
    parse_paginate_options, sort_positions,
};
use crate::update::{UpdateSpec, apply_update, parse_update};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Full id lists are returned for batches up to this size; larger batches
/// report first/last id and the common prefix.
const MAX_ID_LIST: usize = 20;
const DEFAULT_MAX_RETURN: usize = 50;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertReceipt {
    pub inserted_count: u64,
    pub updated_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReceipt {
    pub updated_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_docs: Option<Vec<Value>>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReceipt {
    pub deleted_count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Page {
    pub data: Vec<Value>,
    pub pagination: PageMeta,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u64,
    pub limit: u64,
    pub total_items: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
    pub next_page: Option<u64>,
    pub prev_page: Option<u64>,
    /// 1-based inclusive bounds of the returned slice; 0 when empty.
    pub start_index: u64,
    pub end_index: u64,
}

/// `{returnIds, returnDocs, maxReturn}` for update calls. Unknown keys are
/// ignored so a transport can pass its whole request body through.
#[derive(Debug, Clone)]
pub struct UpdateReturnOptions {
    pub return_ids: bool,
    pub return_docs: bool,
    pub max_return: usize,
}

impl Default for UpdateReturnOptions {
    fn default() -> Self {
        Self { return_ids: false, return_docs: false, max_return: DEFAULT_MAX_RETURN }
    }
}

impl UpdateReturnOptions {
    fn parse(raw: &Value) -> Self {
        let mut opts = Self::default();
        if let Value::Object(map) = raw {
            opts.return_ids = map.get("returnIds").and_then(Value::as_bool).unwrap_or(false);
            opts.return_docs = map.get("returnDocs").and_then(Value::as_bool).unwrap_or(false);
            if let Some(n) = map.get("maxReturn").and_then(Value::as_u64) {
                opts.max_return = n as usize;
            }
        }
        opts
    }
}

impl Collection {
    /// Counts the documents matching `filters`.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for malformed filters.
    pub fn count(&self, filters: &Value) -> Result<u64, DbError> {
        let filter = parse_filter(filters)?;
        let mut guard = self.state.lock();
        let st = &mut *guard;
        Ok(query::run_count(&st.data, &mut st.cache, filters, &filter))
    }

    /// Runs the read pipeline: filter → sort → skip → limit → project.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for malformed filters or options.
    pub fn find(&self, filters: &Value, options: &Value) -> Result<Vec<Value>, DbError> {
        let filter = parse_filter(filters)?;
        let opts = parse_find_options(options)?;
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let out = query::run_find(&st.data, &mut st.cache, filters, &filter, &opts);
        log::debug!(target: "plumedb::ops",
            "find collection={} matched={}", self.name(), out.len());
        Ok(out)
    }

    /// First document of `find` with `limit = 1`.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for malformed filters or options.
    pub fn find_one(&self, filters: &Value, options: &Value) -> Result<Option<Value>, DbError> {
        let filter = parse_filter(filters)?;
        let mut opts = parse_find_options(options)?;
        opts.limit = Limit::N(1);
        let mut guard = self.state.lock();
        let st = &mut *guard;
        Ok(query::run_find(&st.data, &mut st.cache, filters, &filter, &opts).pop())
    }

    /// Constant-time lookup through the primary id index.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<Value> {
        let st = self.state.lock();
        st.id_index.get(id).map(|&pos| st.data[pos].to_value())
    }

    /// Inserts a document or a batch. A supplied id that already exists
    /// turns that entry into an upsert: fields merge over the stored
    /// document, `createdAt` is preserved and `updatedAt` refreshed.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for non-object payloads or unusable
    /// supplied ids.
    pub fn insert(&self, payload: &Value) -> Result<InsertReceipt, DbError> {
        let items = insert_items(payload)?;
        let supplied_ids: Vec<Option<String>> = items
            .iter()
            .map(|m| m.get(FIELD_ID).map(coerce_id).transpose())
            .collect::<Result<_, _>>()?;
        let now = Utc::now();
        let batch = items.len();

        let mut guard = self.state.lock();
        let st = &mut *guard;
        let prefix = if batch >= 2 { Some(fresh_prefix(st, now, batch)) } else { None };
        let mut inserted_ids: Vec<String> = Vec::new();
        let mut updated_count = 0u64;
        for (k, (fields, supplied)) in items.into_iter().zip(supplied_ids).enumerate() {
            match supplied {
                Some(id) if st.id_index.contains_key(&id) => {
                    let pos = st.id_index[&id];
                    upsert_at(st, pos, fields, now);
                    updated_count += 1;
                }
                supplied => {
                    let id = supplied.unwrap_or_else(|| match &prefix {
                        Some(p) => format!("{p}_{}", k + 1),
                        None => fresh_random_id(st),
                    });
                    insert_fresh(st, Document::new(id.clone(), fields, now));
                    inserted_ids.push(id);
                }
            }
        }
        self.mark_dirty_and_arm(st);
        log::debug!(target: "plumedb::ops",
            "insert collection={} inserted={} updated={}",
            self.name(), inserted_ids.len(), updated_count);
        Ok(insert_receipt(inserted_ids, updated_count))
    }

    /// Applies an update spec to every matching document.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for malformed filters or specs.
    pub fn update(
        &self,
        filters: &Value,
        spec_raw: &Value,
        options: &Value,
    ) -> Result<UpdateReceipt, DbError> {
        let filter = parse_filter(filters)?;
        let spec = parse_update(spec_raw)?;
        let opts = UpdateReturnOptions::parse(options);
        let now = Utc::now();
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let positions = filter_positions(&st.data, &mut st.cache, filters, &filter);
        if positions.is_empty() {
            return Ok(UpdateReceipt::default());
        }
        for &pos in &positions {
            update_at(st, pos, &spec, now);
        }
        self.mark_dirty_and_arm(st);
        log::debug!(target: "plumedb::ops",
            "update collection={} matched={}", self.name(), positions.len());
        Ok(update_receipt(st, &positions, &opts))
    }

    /// Constant-time single-document update.
    ///
    /// # Errors
    /// Returns `DbError::NoSuchDocument` for an unknown id.
    pub fn update_by_id(
        &self,
        id: &str,
        spec_raw: &Value,
        options: &Value,
    ) -> Result<UpdateReceipt, DbError> {
        let spec = parse_update(spec_raw)?;
        let opts = UpdateReturnOptions::parse(options);
        let now = Utc::now();
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let pos = *st.id_index.get(id).ok_or_else(|| DbError::NoSuchDocument(id.to_string()))?;
        update_at(st, pos, &spec, now);
        self.mark_dirty_and_arm(st);
        Ok(update_receipt(st, &[pos], &opts))
    }

    /// Removes every matching document and restores all index invariants.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for malformed filters.
    pub fn delete(&self, filters: &Value) -> Result<DeleteReceipt, DbError> {
        let filter = parse_filter(filters)?;
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let positions = filter_positions(&st.data, &mut st.cache, filters, &filter);
        if positions.is_empty() {
            return Ok(DeleteReceipt::default());
        }
        for &pos in positions.iter().rev() {
            st.data.remove(pos);
        }
        st.rebuild_indexes();
        self.mark_dirty_and_arm(st);
        log::debug!(target: "plumedb::ops",
            "delete collection={} deleted={}", self.name(), positions.len());
        Ok(DeleteReceipt { deleted_count: positions.len() as u64 })
    }

    /// Constant-time single-document removal.
    ///
    /// # Errors
    /// Returns `DbError::NoSuchDocument` for an unknown id.
    pub fn delete_by_id(&self, id: &str) -> Result<DeleteReceipt, DbError> {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let pos = *st.id_index.get(id).ok_or_else(|| DbError::NoSuchDocument(id.to_string()))?;
        st.data.remove(pos);
        st.rebuild_indexes();
        self.mark_dirty_and_arm(st);
        Ok(DeleteReceipt { deleted_count: 1 })
    }

    /// Runs the pipeline with `skip = (page-1)*limit` and returns the page
    /// plus its metadata block (1-based, inclusive indices).
    ///
    /// # Errors
    /// Returns `DbError::Validation` for malformed filters or options.
    pub fn paginate(&self, filters: &Value, options: &Value) -> Result<Page, DbError> {
        let filter = parse_filter(filters)?;
        let opts = parse_paginate_options(options)?;
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let mut positions = filter_positions(&st.data, &mut st.cache, filters, &filter);
        if let Some(sort) = &opts.sort {
            sort_positions(&st.data, &mut positions, sort);
        }
        let total = positions.len();
        let skip = (opts.page - 1).saturating_mul(opts.limit);
        let selected = page_slice(positions, skip, Limit::N(opts.limit));
        let data: Vec<Value> = selected.iter().map(|&p| st.data[p].to_value()).collect();
        let total_pages = total.div_ceil(opts.limit);
        let has_prev = opts.page > 1;
        let has_next = opts.page < total_pages;
        let pagination = PageMeta {
            page: opts.page as u64,
            limit: opts.limit as u64,
            total_items: total as u64,
            total_pages: total_pages as u64,
            has_next,
            has_prev,
            next_page: has_next.then(|| opts.page as u64 + 1),
            prev_page: has_prev.then(|| opts.page as u64 - 1),
            start_index: if data.is_empty() { 0 } else { skip as u64 + 1 },
            end_index: (skip + data.len()) as u64,
        };
        Ok(Page { data, pagination })
    }

    /// Registers a composite index and populates it by scanning the
    /// collection. Returns the index name.
    ///
    /// # Errors
    /// Returns `DbError::IndexExists` for a duplicate name and
    /// `DbError::Validation` for malformed specs.
    pub fn create_index(&self, spec: &Value) -> Result<String, DbError> {
        let (name, fields) = parse_index_spec(spec)?;
        let mut guard = self.state.lock();
        let st = &mut *guard;
        if st.indexes.iter().any(|ix| ix.name() == name) {
            return Err(DbError::IndexExists(name));
        }
        let mut index = SecondaryIndex::new(name.clone(), fields);
        index.rebuild(&st.data);
        log::debug!(target: "plumedb::ops",
            "create_index collection={} name={} entries={}",
            self.name(), name, index.entry_count());
        st.indexes.push(index);
        Ok(name)
    }
}

fn insert_items(payload: &Value) -> Result<Vec<Map<String, Value>>, DbError> {
    let items: Vec<Map<String, Value>> = match payload {
        Value::Object(map) => vec![map.clone()],
        Value::Array(entries) => entries
            .iter()
            .map(|v| match v {
                Value::Object(map) => Ok(map.clone()),
                other => {
                    Err(DbError::Validation(format!("insert expects documents, got {other}")))
                }
            })
            .collect::<Result<_, _>>()?,
        other => {
            return Err(DbError::Validation(format!(
                "insert expects a document or an array of documents, got {other}"
            )));
        }
    };
    if items.is_empty() {
        return Err(DbError::Validation("insert requires at least one document".into()));
    }
    Ok(items)
}

/// Batch-id prefix that cannot collide with ids already in the store.
fn fresh_prefix(st: &CollectionState, now: DateTime<Utc>, batch: usize) -> String {
    let mut millis = now.timestamp_millis().max(0) as u64;
    loop {
        let prefix = batch_prefix(millis);
        let collides = (1..=batch).any(|k| st.id_index.contains_key(&format!("{prefix}_{k}")));
        if !collides {
            return prefix;
        }
        millis += 1;
    }
}

fn fresh_random_id(st: &CollectionState) -> String {
    loop {
        let id = random_id();
        if !st.id_index.contains_key(&id) {
            return id;
        }
    }
}

fn insert_fresh(st: &mut CollectionState, doc: Document) {
    let pos = st.data.len();
    for index in &mut st.indexes {
        if let Some(key) = index.key_for(&doc) {
            index.add(key, pos);
        }
    }
    st.id_index.insert(doc.id.clone(), pos);
    st.data.push(doc);
}

fn upsert_at(st: &mut CollectionState, pos: usize, fields: Map<String, Value>, now: DateTime<Utc>) {
    let before = index_keys_at(st, pos);
    st.data[pos].merge(fields, now);
    reindex_at(st, pos, before);
}

fn update_at(st: &mut CollectionState, pos: usize, spec: &UpdateSpec, now: DateTime<Utc>) {
    let before = index_keys_at(st, pos);
    apply_update(&mut st.data[pos], spec, now);
    reindex_at(st, pos, before);
}

fn index_keys_at(st: &CollectionState, pos: usize) -> Vec<Option<Vec<KeyPart>>> {
    st.indexes.iter().map(|ix| ix.key_for(&st.data[pos])).collect()
}

fn reindex_at(st: &mut CollectionState, pos: usize, before: Vec<Option<Vec<KeyPart>>>) {
    let doc = &st.data[pos];
    for (index, old_key) in st.indexes.iter_mut().zip(before) {
        if let Some(key) = old_key {
            index.remove(&key, pos);
        }
        if let Some(key) = index.key_for(doc) {
            index.add(key, pos);
        }
    }
}

fn insert_receipt(inserted_ids: Vec<String>, updated_count: u64) -> InsertReceipt {
    let mut receipt = InsertReceipt {
        inserted_count: inserted_ids.len() as u64,
        updated_count,
        ..Default::default()
    };
    if inserted_ids.is_empty() {
        return receipt;
    }
    if inserted_ids.len() <= MAX_ID_LIST {
        receipt.inserted_ids = Some(inserted_ids);
    } else {
        receipt.prefix = Some(common_prefix(&inserted_ids));
        receipt.first_id = inserted_ids.first().cloned();
        receipt.last_id = inserted_ids.last().cloned();
    }
    receipt
}

fn common_prefix(ids: &[String]) -> String {
    let Some(first) = ids.first() else { return String::new() };
    let mut prefix = first.as_str();
    for id in &ids[1..] {
        let mut end = 0;
        for ((i, a), b) in prefix.char_indices().zip(id.chars()) {
            if a != b {
                break;
            }
            end = i + a.len_utf8();
        }
        prefix = &prefix[..end];
        if prefix.is_empty() {
            break;
        }
    }
    prefix.to_string()
}

fn update_receipt(
    st: &CollectionState,
    positions: &[usize],
    opts: &UpdateReturnOptions,
) -> UpdateReceipt {
    let mut receipt =
        UpdateReceipt { updated_count: positions.len() as u64, ..Default::default() };
    if !(opts.return_ids || opts.return_docs) {
        return receipt;
    }
    let capped = &positions[..positions.len().min(opts.max_return)];
    if opts.return_ids {
        receipt.updated_ids = Some(capped.iter().map(|&p| st.data[p].id.clone()).collect());
    }
    if opts.return_docs {
        receipt.updated_docs = Some(capped.iter().map(|&p| st.data[p].to_value()).collect());
    }
    receipt.truncated = positions.len() > opts.max_return;
    receipt
}
