use crate::document::Document;
use crate::errors::DbError;
use crate::index::SecondaryIndex;
use crate::persist::{self, PersisterHandle};
use crate::query::QueryCache;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// A named in-memory document store. All logical operations serialize on
/// the state mutex; the snapshot writer holds `save_lock` while touching
/// the collection's file.
pub struct Collection {
    name: String,
    pub(crate) file_path: PathBuf,
    pub(crate) state: Mutex<CollectionState>,
    pub(crate) save_lock: Mutex<()>,
    persister: PersisterHandle,
    save_delay: Duration,
    /// Handle to the owning `Arc`, passed to the persister when arming.
    weak_self: Weak<Self>,
}

pub(crate) struct CollectionState {
    pub data: Vec<Document>,
    pub id_index: HashMap<String, usize>,
    pub indexes: Vec<SecondaryIndex>,
    pub cache: QueryCache,
    pub dirty: bool,
    /// Bumped on every mutation; the persister uses it to detect writes
    /// that race with an in-flight snapshot.
    pub version: u64,
    pub last_save: Option<DateTime<Utc>>,
}

impl CollectionState {
    fn from_documents(data: Vec<Document>) -> Self {
        let id_index = data.iter().enumerate().map(|(i, d)| (d.id.clone(), i)).collect();
        Self {
            data,
            id_index,
            indexes: Vec::new(),
            cache: QueryCache::default(),
            dirty: false,
            version: 0,
            last_save: None,
        }
    }

    /// Renumbers the primary index and repopulates every secondary index
    /// after positions shifted.
    pub(crate) fn rebuild_indexes(&mut self) {
        self.id_index.clear();
        for (position, doc) in self.data.iter().enumerate() {
            self.id_index.insert(doc.id.clone(), position);
        }
        for index in &mut self.indexes {
            index.rebuild(&self.data);
        }
    }
}

impl Collection {
    pub(crate) fn new(
        name: String,
        file_path: PathBuf,
        persister: PersisterHandle,
        save_delay: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            name,
            file_path,
            state: Mutex::new(CollectionState::from_documents(Vec::new())),
            save_lock: Mutex::new(()),
            persister,
            save_delay,
            weak_self: weak.clone(),
        })
    }

    /// Opens a collection from its snapshot file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub(crate) fn load(
        name: String,
        file_path: PathBuf,
        persister: PersisterHandle,
        save_delay: Duration,
    ) -> Result<Arc<Self>, DbError> {
        let data = persist::load_documents(&file_path)?;
        log::debug!(target: "plumedb::ops", "loaded collection={name} documents={}", data.len());
        Ok(Arc::new_cyclic(|weak| Self {
            name,
            file_path,
            state: Mutex::new(CollectionState::from_documents(data)),
            save_lock: Mutex::new(()),
            persister,
            save_delay,
            weak_self: weak.clone(),
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    #[must_use]
    pub fn last_save(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_save
    }

    /// Registered index names, in creation order.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.state.lock().indexes.iter().map(|ix| ix.name().to_string()).collect()
    }

    /// Equality lookup over a secondary index, as document JSON values.
    #[must_use]
    pub fn index_lookup(&self, index_name: &str, values: &[serde_json::Value]) -> Vec<serde_json::Value> {
        let st = self.state.lock();
        let Some(index) = st.indexes.iter().find(|ix| ix.name() == index_name) else {
            return Vec::new();
        };
        index.lookup(values).into_iter().map(|p| st.data[p].to_value()).collect()
    }

    /// Verifies every secondary index against the stored documents.
    #[must_use]
    pub fn indexes_consistent(&self) -> bool {
        let st = self.state.lock();
        st.indexes.iter().all(|ix| ix.is_consistent(&st.data))
    }

    /// Marks an unpersisted mutation and (re)arms the debounce timer.
    pub(crate) fn mark_dirty_and_arm(&self, st: &mut CollectionState) {
        st.dirty = true;
        st.version += 1;
        st.cache.clear();
        if let Some(arc) = self.weak_self.upgrade() {
            self.persister.arm(arc, self.save_delay);
        }
    }
}
