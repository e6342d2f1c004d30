use crate::collection::Collection;
use crate::config::Config;
use crate::errors::DbError;
use crate::persist::{self, Persister};
use crate::utils::names::validate_collection_name;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Owns the collection registry and the snapshot persister. One engine
/// instance owns its storage directory exclusively.
pub struct Engine {
    config: Config,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    persister: Persister,
}

impl Engine {
    /// Creates the storage directory if missing and starts the persister.
    ///
    /// # Errors
    /// Returns an error if the storage directory cannot be created.
    pub fn new(config: Config) -> Result<Self, DbError> {
        std::fs::create_dir_all(&config.storage_path)?;
        Ok(Self {
            config,
            collections: RwLock::new(HashMap::new()),
            persister: Persister::spawn(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the named collection, lazily creating it; a `{name}.json`
    /// snapshot in the storage directory is loaded on first access.
    ///
    /// # Errors
    /// Returns `DbError::InvalidName` for names violating the grammar and
    /// I/O or parse errors from snapshot loading.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>, DbError> {
        validate_collection_name(name)?;
        if let Some(col) = self.collections.read().get(name) {
            return Ok(Arc::clone(col));
        }
        let mut registry = self.collections.write();
        // Lost the race: another caller opened it first.
        if let Some(col) = registry.get(name) {
            return Ok(Arc::clone(col));
        }
        let path = self.snapshot_path(name);
        let col = if path.exists() {
            Collection::load(
                name.to_string(),
                path,
                self.persister.handle(),
                self.config.save_delay,
            )?
        } else {
            Collection::new(
                name.to_string(),
                path,
                self.persister.handle(),
                self.config.save_delay,
            )
        };
        registry.insert(name.to_string(), Arc::clone(&col));
        Ok(col)
    }

    #[must_use]
    pub fn list_collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// Drops a collection's in-memory state and deletes its snapshot file.
    /// Deleting an absent file is fine, but a collection that exists
    /// neither in memory nor on disk is not found.
    ///
    /// # Errors
    /// Returns `DbError::NoSuchCollection` when nothing existed to drop.
    pub fn drop_collection(&self, name: &str) -> Result<bool, DbError> {
        validate_collection_name(name)?;
        let removed = self.collections.write().remove(name);
        self.persister.cancel(name);
        let existed_on_disk = match &removed {
            Some(col) => {
                {
                    let mut st = col.state.lock();
                    st.dirty = false;
                    st.version += 1;
                }
                // Excludes an in-flight snapshot writer, so the file
                // cannot reappear after the unlink.
                let _guard = col.save_lock.lock();
                persist::delete_snapshot(&self.snapshot_path(name))?
            }
            None => persist::delete_snapshot(&self.snapshot_path(name))?,
        };
        if removed.is_some() || existed_on_disk {
            log::debug!(target: "plumedb::ops", "drop collection={name}");
            Ok(true)
        } else {
            Err(DbError::NoSuchCollection(name.to_string()))
        }
    }

    /// Cancels all pending timers and flushes every dirty collection.
    /// Returns only after all snapshots are durably renamed into place.
    ///
    /// # Errors
    /// Returns the first snapshot error; remaining collections are still
    /// flushed.
    pub fn close(&self) -> Result<(), DbError> {
        self.persister.shutdown();
        let collections: Vec<Arc<Collection>> =
            self.collections.read().values().cloned().collect();
        let mut first_error = None;
        for col in collections {
            if let Err(e) = persist::save_now(&col, true) {
                log::error!("flush of collection {} failed: {e}", col.name());
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn snapshot_path(&self, name: &str) -> PathBuf {
        self.config.storage_path.join(format!("{name}.json"))
    }
}
