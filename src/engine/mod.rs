//! Storage engine seam
//!
//! The replication storage core never touches on-disk formats. Everything
//! it needs from the engine is expressed by the `StorageEngine` trait:
//! record-store insert/iterate/remove, index lookup and bulk builds,
//! collection create/drop, count/size accessors, execution identities and
//! the durability wait.
//!
//! The engine serialises access to each collection with its own locking;
//! each trait call is atomic with respect to other calls on the same
//! collection. Mutating calls may fail with `WriteConflict`, which callers
//! absorb with `write_conflict_retry`.
//!
//! `memory::MemoryEngine` is the in-process implementation.

mod context;
mod key;
pub mod memory;
mod retry;

use std::ops::Bound;
use std::thread::ThreadId;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{StorageError, StorageResult};
use crate::types::{Document, Namespace, ScanDirection, ID_FIELD};

pub use context::{Client, KillHandle, OperationContext};
pub use key::{IndexEntry, IndexKey, KeyField, KeyPattern, KeyValue, RecordId};
pub use retry::{write_conflict_retry, write_conflict_retry_uninterruptible};

/// Name of the identifier index
pub const ID_INDEX_NAME: &str = "_id_";

/// Engine-registered execution identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for one in-progress index build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBuildId(Uuid);

impl IndexBuildId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IndexBuildId {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a collection gets an `_id` index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoIndexId {
    /// `_id` index for regular collections, none for capped ones
    #[default]
    Default,
    Yes,
    No,
}

/// Options accepted at collection creation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionOptions {
    pub capped: bool,
    /// Byte limit for a capped collection
    pub capped_size: Option<u64>,
    pub auto_index_id: AutoIndexId,
}

impl CollectionOptions {
    /// Capped collection of `size` bytes
    pub fn capped(size: u64) -> Self {
        Self {
            capped: true,
            capped_size: Some(size),
            auto_index_id: AutoIndexId::Default,
        }
    }

    /// Whether creation builds an `_id` index
    pub fn wants_id_index(&self) -> bool {
        match self.auto_index_id {
            AutoIndexId::Yes => true,
            AutoIndexId::No => false,
            AutoIndexId::Default => !self.capped,
        }
    }
}

/// How `create_collection` treats the `_id` index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdIndexCreation {
    /// Build it immediately if the options call for one
    Auto,
    /// Leave it to a bulk index build started by the caller
    Deferred,
}

/// Index definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub key: KeyPattern,
    pub unique: bool,
    /// Only documents matching this filter are indexed
    pub partial_filter_expression: Option<Document>,
}

impl IndexSpec {
    /// Ascending, non-unique, non-partial index
    pub fn new(name: impl Into<String>, key: KeyPattern) -> Self {
        Self {
            name: name.into(),
            key,
            unique: false,
            partial_filter_expression: None,
        }
    }

    /// The unique `_id_` index
    pub fn id_index() -> Self {
        Self {
            name: ID_INDEX_NAME.to_string(),
            key: KeyPattern::single(ID_FIELD),
            unique: true,
            partial_filter_expression: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_partial_filter(mut self, filter: Document) -> Self {
        self.partial_filter_expression = Some(filter);
        self
    }

    pub fn is_partial(&self) -> bool {
        self.partial_filter_expression.is_some()
    }

    /// Parse an index spec document:
    /// `{ name, key: { field: 1 | -1, ... }, unique?, partialFilterExpression? }`.
    /// Other fields (`v`, `ns`) are accepted and ignored.
    pub fn from_document(spec: &Document) -> StorageResult<Self> {
        let name = spec
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| StorageError::bad_value("index spec requires a string 'name'"))?;
        let key_doc = spec
            .get("key")
            .and_then(Value::as_object)
            .ok_or_else(|| StorageError::bad_value(format!("index '{}' requires a 'key' document", name)))?;
        if key_doc.is_empty() {
            return Err(StorageError::bad_value(format!("index '{}' has an empty key pattern", name)));
        }
        let mut fields = Vec::with_capacity(key_doc.len());
        for (path, direction) in key_doc {
            let descending = match direction.as_f64() {
                Some(d) if d > 0.0 => false,
                Some(d) if d < 0.0 => true,
                _ => {
                    return Err(StorageError::bad_value(format!(
                        "index '{}' field '{}' must have direction 1 or -1",
                        name, path
                    )))
                }
            };
            fields.push(KeyField {
                path: path.clone(),
                descending,
            });
        }
        let unique = spec.get("unique").and_then(Value::as_bool).unwrap_or(false);
        let partial_filter_expression = match spec.get("partialFilterExpression") {
            None => None,
            Some(Value::Object(filter)) => Some(filter.clone()),
            Some(_) => {
                return Err(StorageError::bad_value(format!(
                    "index '{}' partialFilterExpression must be a document",
                    name
                )))
            }
        };
        Ok(Self {
            name: name.to_string(),
            key: KeyPattern::new(fields),
            unique,
            partial_filter_expression,
        })
    }
}

/// Storage engine primitives consumed by the replication storage core
pub trait StorageEngine: Send + Sync {
    // ---- execution identities ----

    /// Register a client bound to the calling thread
    fn attach_client(&self, description: &str) -> ClientId;

    /// Release a client. Unknown ids are ignored.
    fn detach_client(&self, client: ClientId);

    /// Thread the client is bound to, if still registered
    fn client_thread(&self, client: ClientId) -> Option<ThreadId>;

    // ---- catalog ----

    /// Never creates the database as a side effect
    fn database_exists(&self, db: &str) -> bool;

    fn collection_exists(&self, ns: &Namespace) -> bool;

    fn collection_options(&self, ns: &Namespace) -> Option<CollectionOptions>;

    /// Create a collection, implicitly creating its database
    fn create_collection(
        &self,
        ns: &Namespace,
        options: &CollectionOptions,
        id_index: IdIndexCreation,
    ) -> StorageResult<()>;

    /// Fails with `NamespaceNotFound` if absent
    fn drop_collection(&self, ns: &Namespace) -> StorageResult<()>;

    // ---- record store ----

    /// Insert all documents as one atomic unit, in order.
    ///
    /// Fails with `OperationCannotBeBatched` when the collection cannot
    /// take more than one document per unit.
    fn insert_records(&self, ns: &Namespace, docs: &[Document]) -> StorageResult<Vec<RecordId>>;

    fn record(&self, ns: &Namespace, id: RecordId) -> StorageResult<Option<Document>>;

    /// Next record strictly after `after` (or the first, if `None`) in the
    /// given natural-order direction
    fn next_record(
        &self,
        ns: &Namespace,
        after: Option<RecordId>,
        direction: ScanDirection,
    ) -> StorageResult<Option<(RecordId, Document)>>;

    /// Remove a record and its index entries; returns the removed document,
    /// or `None` if the record no longer exists
    fn remove_record(&self, ns: &Namespace, id: RecordId) -> StorageResult<Option<Document>>;

    fn record_count(&self, ns: &Namespace) -> StorageResult<u64>;

    /// Engine-defined approximate size of the stored documents
    fn data_size(&self, ns: &Namespace) -> StorageResult<u64>;

    // ---- singleton documents ----

    /// The first document of the collection; `None` if collection or document is absent
    fn find_singleton(&self, ns: &Namespace) -> StorageResult<Option<Document>>;

    /// Atomically read-modify-write the collection's single document,
    /// creating collection and document when absent. `update` receives the
    /// current document and returns the replacement, or `None` to leave it
    /// untouched. Returns whether a write happened.
    fn upsert_singleton(
        &self,
        ns: &Namespace,
        update: &mut dyn FnMut(Option<&Document>) -> Option<Document>,
    ) -> StorageResult<bool>;

    // ---- indexes ----

    /// A finished index by name
    fn find_index(&self, ns: &Namespace, name: &str) -> StorageResult<Option<IndexSpec>>;

    /// Finished plus in-progress indexes
    fn num_indexes_total(&self, ns: &Namespace) -> StorageResult<usize>;

    /// Number of entries in a finished index
    fn index_key_count(&self, ns: &Namespace, name: &str) -> StorageResult<u64>;

    /// First entry at or beyond `from` in the scan direction. `Excluded`
    /// skips an entry equal to the bound.
    fn seek_index(
        &self,
        ns: &Namespace,
        name: &str,
        from: Bound<&IndexEntry>,
        direction: ScanDirection,
    ) -> StorageResult<Option<IndexEntry>>;

    // ---- bulk index builds ----
    //
    // Build calls require `client` to be attached to the calling thread.

    /// Register unfinished indexes on an existing collection
    fn begin_index_builds(
        &self,
        client: ClientId,
        ns: &Namespace,
        specs: &[IndexSpec],
    ) -> StorageResult<Vec<IndexBuildId>>;

    /// Append documents to the record store and feed them to the builds.
    /// No uniqueness checks happen until commit.
    fn bulk_insert(
        &self,
        client: ClientId,
        ns: &Namespace,
        builds: &[IndexBuildId],
        docs: &[Document],
    ) -> StorageResult<u64>;

    /// Finish the builds. A unique index keeps the first record per key.
    fn commit_index_builds(
        &self,
        client: ClientId,
        ns: &Namespace,
        builds: &[IndexBuildId],
    ) -> StorageResult<()>;

    /// Discard the builds and their unfinished indexes
    fn abort_index_builds(
        &self,
        client: ClientId,
        ns: &Namespace,
        builds: &[IndexBuildId],
    ) -> StorageResult<()>;

    // ---- durability ----

    /// Block until all applied writes are on stable storage
    fn wait_until_durable(&self) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_id_index_rules() {
        assert!(CollectionOptions::default().wants_id_index());
        assert!(!CollectionOptions::capped(1024).wants_id_index());
        let mut opts = CollectionOptions::capped(1024);
        opts.auto_index_id = AutoIndexId::Yes;
        assert!(opts.wants_id_index());
        opts = CollectionOptions::default();
        opts.auto_index_id = AutoIndexId::No;
        assert!(!opts.wants_id_index());
    }

    #[test]
    fn test_index_spec_from_document() {
        let spec = IndexSpec::from_document(&doc(json!({
            "v": 2, "key": {"x": 1, "y": -1}, "name": "x_1_y_-1", "ns": "test.c",
            "partialFilterExpression": {"y": 1}
        })))
        .unwrap();
        assert_eq!(spec.name, "x_1_y_-1");
        assert_eq!(spec.key.len(), 2);
        assert!(spec.key.fields()[1].descending);
        assert!(spec.is_partial());
        assert!(!spec.unique);
    }

    #[test]
    fn test_index_spec_rejects_bad_input() {
        assert!(IndexSpec::from_document(&doc(json!({"key": {"x": 1}}))).is_err());
        assert!(IndexSpec::from_document(&doc(json!({"name": "a", "key": {}}))).is_err());
        assert!(IndexSpec::from_document(&doc(json!({"name": "a", "key": {"x": "text"}}))).is_err());
    }

    #[test]
    fn test_id_index_spec() {
        let spec = IndexSpec::id_index();
        assert_eq!(spec.name, ID_INDEX_NAME);
        assert!(spec.unique);
        assert_eq!(spec.key, KeyPattern::single("_id"));
    }
}
