#![forbid(unsafe_code)]

//! plumedb: an embeddable, single-process, in-memory document database
//! with a MongoDB-style query/update surface and debounced per-collection
//! JSON snapshots.

pub mod collection;
pub mod config;
pub mod document;
pub mod engine;
pub mod errors;
pub mod index;
pub(crate) mod persist;
pub mod query;
pub mod response;
pub mod update;
pub mod utils;

pub use collection::{Collection, DeleteReceipt, InsertReceipt, Page, UpdateReceipt};
pub use config::Config;
pub use engine::Engine;
pub use errors::DbError;
pub use response::{ErrorBody, Response};

use serde_json::Value;
use std::sync::Arc;

/// The main database handle: the engine behind the stable envelope
/// surface. Every operation takes JSON payloads the way a transport
/// adapter would pass them and returns `{success, data, error}`.
pub struct Database {
    engine: Arc<Engine>,
}

impl Database {
    /// Opens a database over a storage directory.
    ///
    /// # Errors
    /// Returns an error if the storage directory cannot be created.
    pub fn open(config: Config) -> Result<Self, DbError> {
        if config.debug {
            utils::logger::configure_logging(
                Some(&config.storage_path.join("logs")),
                Some("debug"),
                None,
            );
        }
        Ok(Self { engine: Arc::new(Engine::new(config)?) })
    }

    /// Direct access to the engine, for embedding without the envelope.
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn count(&self, collection: &str, filters: &Value) -> Response<u64> {
        Response::from_result(
            self.engine.collection(collection).and_then(|c| c.count(filters)),
        )
    }

    /// An empty result set reports `success: false` with code 404 and an
    /// empty `data` list.
    pub fn find(&self, collection: &str, filters: &Value, options: &Value) -> Response<Vec<Value>> {
        match self.engine.collection(collection).and_then(|c| c.find(filters, options)) {
            Ok(docs) if docs.is_empty() => Response::fail(docs, &DbError::NoMatches),
            Ok(docs) => Response::ok(docs),
            Err(e) => Response::fail(Vec::new(), &e),
        }
    }

    pub fn find_one(
        &self,
        collection: &str,
        filters: &Value,
        options: &Value,
    ) -> Response<Option<Value>> {
        match self.engine.collection(collection).and_then(|c| c.find_one(filters, options)) {
            Ok(Some(doc)) => Response::ok(Some(doc)),
            Ok(None) => Response::fail(None, &DbError::NoMatches),
            Err(e) => Response::fail(None, &e),
        }
    }

    pub fn find_by_id(&self, collection: &str, id: &str) -> Response<Option<Value>> {
        match self.engine.collection(collection).map(|c| c.find_by_id(id)) {
            Ok(Some(doc)) => Response::ok(Some(doc)),
            Ok(None) => Response::fail(None, &DbError::NoSuchDocument(id.to_string())),
            Err(e) => Response::fail(None, &e),
        }
    }

    pub fn insert(&self, collection: &str, data: &Value) -> Response<InsertReceipt> {
        Response::from_result(
            self.engine.collection(collection).and_then(|c| c.insert(data)),
        )
    }

    pub fn update(
        &self,
        collection: &str,
        filters: &Value,
        spec: &Value,
        options: &Value,
    ) -> Response<UpdateReceipt> {
        Response::from_result(
            self.engine.collection(collection).and_then(|c| c.update(filters, spec, options)),
        )
    }

    pub fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        spec: &Value,
        options: &Value,
    ) -> Response<UpdateReceipt> {
        Response::from_result(
            self.engine
                .collection(collection)
                .and_then(|c| c.update_by_id(id, spec, options)),
        )
    }

    pub fn delete(&self, collection: &str, filters: &Value) -> Response<DeleteReceipt> {
        Response::from_result(
            self.engine.collection(collection).and_then(|c| c.delete(filters)),
        )
    }

    pub fn delete_by_id(&self, collection: &str, id: &str) -> Response<DeleteReceipt> {
        Response::from_result(
            self.engine.collection(collection).and_then(|c| c.delete_by_id(id)),
        )
    }

    pub fn paginate(&self, collection: &str, filters: &Value, options: &Value) -> Response<Page> {
        Response::from_result(
            self.engine.collection(collection).and_then(|c| c.paginate(filters, options)),
        )
    }

    /// Returns the created index name.
    pub fn create_index(&self, collection: &str, spec: &Value) -> Response<String> {
        Response::from_result(
            self.engine.collection(collection).and_then(|c| c.create_index(spec)),
        )
    }

    pub fn drop_collection(&self, collection: &str) -> Response<bool> {
        Response::from_result(self.engine.drop_collection(collection))
    }

    pub fn list_collections(&self) -> Response<Vec<String>> {
        Response::ok(self.engine.list_collection_names())
    }

    /// Flushes all dirty collections and stops the persister. Blocks until
    /// every snapshot is durably in place.
    ///
    /// # Errors
    /// Returns the first flush error, if any.
    pub fn close(&self) -> Result<(), DbError> {
        self.engine.close()
    }
}
