//! Databases, collections and their indexes
//!
//! A collection owns its record store, its finished indexes and any index
//! builds still in progress. Every index is maintained on each insert and
//! removal; builds buffer their keys until commit.

use std::collections::BTreeMap;

use serde_json::Value;

use super::index_tree::IndexTree;
use super::record_store::RecordStore;
use crate::engine::{
    ClientId, CollectionOptions, IndexBuildId, IndexKey, IndexSpec, KeyValue, RecordId, ID_INDEX_NAME,
};
use crate::errors::{StorageError, StorageResult};
use crate::types::document::get_path;
use crate::types::{id_of, Document, Namespace};

/// A finished index
#[derive(Debug)]
pub struct Index {
    pub spec: IndexSpec,
    pub tree: IndexTree,
}

/// An index registered but not yet built
#[derive(Debug)]
pub struct IndexBuild {
    pub id: IndexBuildId,
    pub client: ClientId,
    pub spec: IndexSpec,
    pending: Vec<(IndexKey, RecordId)>,
}

#[derive(Debug)]
pub struct Collection {
    pub options: CollectionOptions,
    pub records: RecordStore,
    pub indexes: Vec<Index>,
    pub builds: Vec<IndexBuild>,
}

impl Collection {
    pub fn new(options: CollectionOptions, with_id_index: bool) -> Self {
        let indexes = if with_id_index {
            vec![Index {
                spec: IndexSpec::id_index(),
                tree: IndexTree::new(),
            }]
        } else {
            Vec::new()
        };
        Self {
            options,
            records: RecordStore::new(),
            indexes,
            builds: Vec::new(),
        }
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.spec.name == name)
    }

    pub fn num_indexes_total(&self) -> usize {
        self.indexes.len() + self.builds.len()
    }

    fn index_name_taken(&self, name: &str) -> bool {
        self.indexes.iter().any(|i| i.spec.name == name) || self.builds.iter().any(|b| b.spec.name == name)
    }

    /// Insert one document, enforcing `_id` presence and unique indexes
    pub fn insert(&mut self, doc: &Document) -> StorageResult<RecordId> {
        if self.index(ID_INDEX_NAME).is_some() && id_of(doc).is_none() {
            return Err(StorageError::internal("insert_document got document without _id"));
        }
        for index in self.indexes.iter().filter(|i| i.spec.unique && applies(&i.spec, doc)) {
            let key = index.spec.key.extract(doc);
            if index.tree.contains_key(&key) {
                return Err(StorageError::duplicate_key(format!(
                    "E11000 duplicate key error index: {}",
                    index.spec.name
                )));
            }
        }
        let id = self.records.insert(doc)?;
        self.index_record(id, doc);
        self.evict_capped()?;
        Ok(id)
    }

    /// Append a document without uniqueness checks; used while builds run
    pub fn append(&mut self, doc: &Document) -> StorageResult<RecordId> {
        let id = self.records.insert(doc)?;
        self.index_record(id, doc);
        Ok(id)
    }

    fn index_record(&mut self, id: RecordId, doc: &Document) {
        for index in self.indexes.iter_mut().filter(|i| applies(&i.spec, doc)) {
            index.tree.insert(index.spec.key.extract(doc), id);
        }
        for build in self.builds.iter_mut().filter(|b| applies(&b.spec, doc)) {
            build.pending.push((build.spec.key.extract(doc), id));
        }
    }

    /// Remove a record and every index entry pointing at it
    pub fn remove(&mut self, id: RecordId) -> StorageResult<Option<Document>> {
        let Some(doc) = self.records.remove(id)? else {
            return Ok(None);
        };
        for index in self.indexes.iter_mut().filter(|i| applies(&i.spec, &doc)) {
            let key = index.spec.key.extract(&doc);
            index.tree.remove(&key, id);
        }
        for build in self.builds.iter_mut() {
            build.pending.retain(|(_, r)| *r != id);
        }
        Ok(Some(doc))
    }

    /// Overwrite a record and re-key it in every index
    pub fn replace(&mut self, id: RecordId, doc: &Document) -> StorageResult<()> {
        let Some(old) = self.records.get(id)? else {
            return Err(StorageError::internal(format!("record {} not found", id.value())));
        };
        for index in self.indexes.iter_mut() {
            if applies(&index.spec, &old) {
                index.tree.remove(&index.spec.key.extract(&old), id);
            }
            if applies(&index.spec, doc) {
                index.tree.insert(index.spec.key.extract(doc), id);
            }
        }
        self.records.replace(id, doc)
    }

    /// Evict oldest records while a capped collection is over its size.
    /// The newest record always survives.
    fn evict_capped(&mut self) -> StorageResult<()> {
        if !self.options.capped {
            return Ok(());
        }
        let Some(limit) = self.options.capped_size else {
            return Ok(());
        };
        while self.records.data_size() > limit && self.records.len() > 1 {
            match self.records.first_id() {
                Some(oldest) => {
                    self.remove(oldest)?;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Register unfinished indexes
    pub fn begin_builds(&mut self, client: ClientId, specs: &[IndexSpec]) -> StorageResult<Vec<IndexBuildId>> {
        for (i, spec) in specs.iter().enumerate() {
            if self.index_name_taken(&spec.name) || specs[..i].iter().any(|s| s.name == spec.name) {
                return Err(StorageError::index_options_conflict(format!(
                    "index '{}' already exists",
                    spec.name
                )));
            }
        }
        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut pending = Vec::new();
            for entry in self.records.iter() {
                let (record, doc) = entry?;
                if applies(spec, &doc) {
                    pending.push((spec.key.extract(&doc), record));
                }
            }
            let id = IndexBuildId::new();
            self.builds.push(IndexBuild {
                id,
                client,
                spec: spec.clone(),
                pending,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    /// Sort buffered keys and install the finished indexes
    pub fn commit_builds(&mut self, builds: &[IndexBuildId]) -> StorageResult<()> {
        if let Some(missing) = builds.iter().find(|id| !self.builds.iter().any(|b| b.id == **id)) {
            return Err(StorageError::internal(format!("unknown index build {:?}", missing)));
        }
        let (finishing, remaining): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.builds).into_iter().partition(|b| builds.contains(&b.id));
        self.builds = remaining;
        for mut build in finishing {
            build.pending.sort();
            let mut tree = IndexTree::new();
            for (key, record) in build.pending {
                // Sorted by record within a key, so the first inserted wins.
                if build.spec.unique && tree.contains_key(&key) {
                    continue;
                }
                tree.insert(key, record);
            }
            self.indexes.push(Index { spec: build.spec, tree });
        }
        Ok(())
    }

    /// Discard builds; unknown ids are ignored
    pub fn abort_builds(&mut self, builds: &[IndexBuildId]) {
        self.builds.retain(|b| !builds.contains(&b.id));
    }

    pub fn build_owner(&self, build: IndexBuildId) -> Option<ClientId> {
        self.builds.iter().find(|b| b.id == build).map(|b| b.client)
    }
}

/// Whether a document belongs in the index: every field of a partial
/// filter must be present and equal
fn applies(spec: &IndexSpec, doc: &Document) -> bool {
    let Some(filter) = &spec.partial_filter_expression else {
        return true;
    };
    filter.iter().all(|(path, expected)| match get_path(doc, path) {
        Some(actual) => values_equal(actual, expected),
        None => false,
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    KeyValue::from_json(a) == KeyValue::from_json(b)
}

#[derive(Debug, Default)]
pub struct Database {
    collections: BTreeMap<String, Collection>,
}

/// All databases of one engine
#[derive(Debug, Default)]
pub struct Catalog {
    databases: BTreeMap<String, Database>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_exists(&self, db: &str) -> bool {
        self.databases.contains_key(db)
    }

    pub fn collection(&self, ns: &Namespace) -> Option<&Collection> {
        self.databases.get(ns.db())?.collections.get(ns.coll())
    }

    pub fn collection_mut(&mut self, ns: &Namespace) -> Option<&mut Collection> {
        self.databases.get_mut(ns.db())?.collections.get_mut(ns.coll())
    }

    pub fn require(&self, ns: &Namespace) -> StorageResult<&Collection> {
        self.collection(ns)
            .ok_or_else(|| StorageError::namespace_not_found(format!("Collection {} not found", ns)))
    }

    pub fn require_mut(&mut self, ns: &Namespace) -> StorageResult<&mut Collection> {
        self.collection_mut(ns)
            .ok_or_else(|| StorageError::namespace_not_found(format!("Collection {} not found", ns)))
    }

    /// Add a collection, creating its database if needed
    pub fn create(&mut self, ns: &Namespace, collection: Collection) -> StorageResult<()> {
        let db = self.databases.entry(ns.db().to_string()).or_default();
        if db.collections.contains_key(ns.coll()) {
            return Err(StorageError::namespace_exists(format!("Collection {} already exists", ns)));
        }
        db.collections.insert(ns.coll().to_string(), collection);
        Ok(())
    }

    pub fn drop_collection(&mut self, ns: &Namespace) -> StorageResult<()> {
        self.databases
            .get_mut(ns.db())
            .and_then(|db| db.collections.remove(ns.coll()))
            .map(|_| ())
            .ok_or_else(|| StorageError::namespace_not_found(format!("Collection {} not found", ns)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_requires_id_with_id_index() {
        let mut coll = Collection::new(CollectionOptions::default(), true);
        let err = coll.insert(&doc(json!({"x": 1}))).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert!(err.message().contains("without _id"));

        let mut no_index = Collection::new(CollectionOptions::default(), false);
        assert!(no_index.insert(&doc(json!({"x": 1}))).is_ok());
    }

    #[test]
    fn test_unique_index_rejects_duplicate() {
        let mut coll = Collection::new(CollectionOptions::default(), true);
        coll.insert(&doc(json!({"_id": 1}))).unwrap();
        let err = coll.insert(&doc(json!({"_id": 1.0}))).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateKey);
        assert_eq!(coll.records.len(), 1);
    }

    #[test]
    fn test_capped_eviction_keeps_newest() {
        let mut coll = Collection::new(CollectionOptions::capped(40), false);
        for i in 0..10 {
            coll.insert(&doc(json!({"_id": i, "pad": "xxxxxxxx"}))).unwrap();
        }
        assert!(coll.records.data_size() <= 40);
        let newest = coll.records.iter().last().unwrap().unwrap().1;
        assert_eq!(newest["_id"], json!(9));
    }

    #[test]
    fn test_partial_index_skips_non_matching() {
        let mut coll = Collection::new(CollectionOptions::default(), true);
        let spec = IndexSpec::new("x_1", crate::engine::KeyPattern::single("x"))
            .with_partial_filter(doc(json!({"kind": "a"})));
        let builds = coll.begin_builds(ClientId::new(), &[spec]).unwrap();
        coll.append(&doc(json!({"_id": 1, "x": 1, "kind": "a"}))).unwrap();
        coll.append(&doc(json!({"_id": 2, "x": 2, "kind": "b"}))).unwrap();
        coll.commit_builds(&builds).unwrap();
        assert_eq!(coll.index("x_1").unwrap().tree.entry_count(), 1);
    }

    #[test]
    fn test_unique_build_keeps_first_record() {
        let mut coll = Collection::new(CollectionOptions::default(), false);
        let builds = coll.begin_builds(ClientId::new(), &[IndexSpec::id_index()]).unwrap();
        assert_eq!(coll.num_indexes_total(), 1);
        coll.append(&doc(json!({"_id": 1, "v": "first"}))).unwrap();
        coll.append(&doc(json!({"_id": 1, "v": "second"}))).unwrap();
        coll.append(&doc(json!({"_id": 2}))).unwrap();
        coll.commit_builds(&builds).unwrap();

        let index = coll.index(ID_INDEX_NAME).unwrap();
        assert_eq!(index.tree.entry_count(), 2);
        let first = index
            .tree
            .seek(std::ops::Bound::Unbounded, crate::types::ScanDirection::Forward)
            .unwrap();
        let kept = coll.records.get(first.record).unwrap().unwrap();
        assert_eq!(kept["v"], json!("first"));
        assert_eq!(coll.records.len(), 3);
    }

    #[test]
    fn test_abort_is_idempotent() {
        let mut coll = Collection::new(CollectionOptions::default(), false);
        let builds = coll.begin_builds(ClientId::new(), &[IndexSpec::id_index()]).unwrap();
        coll.abort_builds(&builds);
        coll.abort_builds(&builds);
        assert_eq!(coll.num_indexes_total(), 0);
        assert!(coll.commit_builds(&builds).is_err());
    }

    #[test]
    fn test_catalog_create_and_drop() {
        let mut catalog = Catalog::new();
        let ns = Namespace::new("db", "c");
        assert!(!catalog.database_exists("db"));
        catalog.create(&ns, Collection::new(CollectionOptions::default(), true)).unwrap();
        assert!(catalog.database_exists("db"));
        let err = catalog
            .create(&ns, Collection::new(CollectionOptions::default(), true))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NamespaceExists);
        catalog.drop_collection(&ns).unwrap();
        assert_eq!(catalog.drop_collection(&ns).unwrap_err().code(), ErrorCode::NamespaceNotFound);
    }
}
