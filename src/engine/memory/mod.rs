//! In-process storage engine
//!
//! `MemoryEngine` implements every `StorageEngine` primitive over an
//! in-memory catalog guarded by a single `RwLock`, which makes each trait
//! call atomic with respect to every other.
//!
//! Records are serialized and checksummed; indexes are ordered trees keyed
//! by `IndexKey`. Tests can inject write conflicts and count durability
//! waits.

mod catalog;
mod checksum;
mod index_tree;
mod record_store;

use std::collections::HashMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

use serde_json::Value;
use uuid::Uuid;

use self::catalog::{Catalog, Collection};
use super::{
    ClientId, CollectionOptions, IdIndexCreation, IndexBuildId, IndexEntry, IndexSpec, RecordId,
    StorageEngine,
};
use crate::errors::{StorageError, StorageResult};
use crate::types::{id_of, Document, Namespace, ScanDirection, ID_FIELD};

/// Error number for a non-capped collection in an oplog namespace
pub const NON_CAPPED_OPLOG_ERROR: i32 = 28838;

/// In-memory `StorageEngine`
#[derive(Debug, Default)]
pub struct MemoryEngine {
    catalog: RwLock<Catalog>,
    clients: RwLock<HashMap<ClientId, ThreadId>>,
    pending_conflicts: AtomicU32,
    durable_waits: AtomicU64,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` mutating calls fail with `WriteConflict`
    pub fn inject_write_conflicts(&self, n: u32) {
        self.pending_conflicts.fetch_add(n, Ordering::SeqCst);
    }

    /// Injected conflicts not yet consumed
    pub fn pending_write_conflicts(&self) -> u32 {
        self.pending_conflicts.load(Ordering::SeqCst)
    }

    /// Number of `wait_until_durable` calls so far
    pub fn durable_wait_count(&self) -> u64 {
        self.durable_waits.load(Ordering::SeqCst)
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Catalog>> {
        self.catalog
            .read()
            .map_err(|_| StorageError::internal("catalog lock poisoned"))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Catalog>> {
        self.catalog
            .write()
            .map_err(|_| StorageError::internal("catalog lock poisoned"))
    }

    fn check_write_conflict(&self) -> StorageResult<()> {
        let injected = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::write_conflict("write conflict"));
        }
        Ok(())
    }

    fn require_client_on_thread(&self, client: ClientId) -> StorageResult<()> {
        if self.client_thread(client) == Some(thread::current().id()) {
            Ok(())
        } else {
            Err(StorageError::internal(format!(
                "client {} is not attached to the calling thread",
                client
            )))
        }
    }
}

fn with_id_first(id: Value, doc: Document) -> Document {
    let mut out = Document::new();
    out.insert(ID_FIELD.to_string(), id);
    for (k, v) in doc {
        if k != ID_FIELD {
            out.insert(k, v);
        }
    }
    out
}

impl StorageEngine for MemoryEngine {
    fn attach_client(&self, _description: &str) -> ClientId {
        let id = ClientId::new();
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, thread::current().id());
        id
    }

    fn detach_client(&self, client: ClientId) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&client);
    }

    fn client_thread(&self, client: ClientId) -> Option<ThreadId> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&client)
            .copied()
    }

    fn database_exists(&self, db: &str) -> bool {
        self.read().map(|c| c.database_exists(db)).unwrap_or(false)
    }

    fn collection_exists(&self, ns: &Namespace) -> bool {
        self.read().map(|c| c.collection(ns).is_some()).unwrap_or(false)
    }

    fn collection_options(&self, ns: &Namespace) -> Option<CollectionOptions> {
        self.read().ok()?.collection(ns).map(|c| c.options.clone())
    }

    fn create_collection(
        &self,
        ns: &Namespace,
        options: &CollectionOptions,
        id_index: IdIndexCreation,
    ) -> StorageResult<()> {
        if ns.is_oplog() && !options.capped {
            return Err(StorageError::engine(
                NON_CAPPED_OPLOG_ERROR,
                "cannot create a non-capped oplog collection",
            )
            .with_details(format!("ns: {}", ns)));
        }
        if options.capped && options.capped_size == Some(0) {
            return Err(StorageError::bad_value("capped collection size must be positive"));
        }
        let with_id_index = id_index == IdIndexCreation::Auto && options.wants_id_index();
        self.write()?
            .create(ns, Collection::new(options.clone(), with_id_index))
    }

    fn drop_collection(&self, ns: &Namespace) -> StorageResult<()> {
        self.write()?.drop_collection(ns)
    }

    fn insert_records(&self, ns: &Namespace, docs: &[Document]) -> StorageResult<Vec<RecordId>> {
        self.check_write_conflict()?;
        let mut catalog = self.write()?;
        let coll = catalog.require_mut(ns)?;
        if coll.options.capped && docs.len() > 1 {
            return Err(StorageError::cannot_be_batched(format!(
                "capped collection {} cannot take a multi-document batch",
                ns
            )));
        }
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            match coll.insert(doc) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    for id in ids.iter().rev() {
                        coll.remove(*id)?;
                    }
                    return Err(e);
                }
            }
        }
        Ok(ids)
    }

    fn record(&self, ns: &Namespace, id: RecordId) -> StorageResult<Option<Document>> {
        self.read()?.require(ns)?.records.get(id)
    }

    fn next_record(
        &self,
        ns: &Namespace,
        after: Option<RecordId>,
        direction: ScanDirection,
    ) -> StorageResult<Option<(RecordId, Document)>> {
        self.read()?.require(ns)?.records.next(after, direction)
    }

    fn remove_record(&self, ns: &Namespace, id: RecordId) -> StorageResult<Option<Document>> {
        self.check_write_conflict()?;
        self.write()?.require_mut(ns)?.remove(id)
    }

    fn record_count(&self, ns: &Namespace) -> StorageResult<u64> {
        Ok(self.read()?.require(ns)?.records.len())
    }

    fn data_size(&self, ns: &Namespace) -> StorageResult<u64> {
        Ok(self.read()?.require(ns)?.records.data_size())
    }

    fn find_singleton(&self, ns: &Namespace) -> StorageResult<Option<Document>> {
        let catalog = self.read()?;
        match catalog.collection(ns) {
            Some(coll) => Ok(coll.records.next(None, ScanDirection::Forward)?.map(|(_, d)| d)),
            None => Ok(None),
        }
    }

    fn upsert_singleton(
        &self,
        ns: &Namespace,
        update: &mut dyn FnMut(Option<&Document>) -> Option<Document>,
    ) -> StorageResult<bool> {
        self.check_write_conflict()?;
        let mut catalog = self.write()?;
        let current = match catalog.collection(ns) {
            Some(coll) => coll.records.next(None, ScanDirection::Forward)?,
            None => None,
        };
        let Some(replacement) = update(current.as_ref().map(|(_, d)| d)) else {
            return Ok(false);
        };
        match current {
            Some((id, old)) => {
                let doc = match (id_of(&replacement), id_of(&old)) {
                    (None, Some(old_id)) => with_id_first(old_id.clone(), replacement),
                    _ => replacement,
                };
                catalog.require_mut(ns)?.replace(id, &doc)?;
            }
            None => {
                let doc = match id_of(&replacement) {
                    Some(_) => replacement,
                    None => with_id_first(Value::String(Uuid::new_v4().to_string()), replacement),
                };
                if catalog.collection(ns).is_none() {
                    catalog.create(ns, Collection::new(CollectionOptions::default(), true))?;
                }
                catalog.require_mut(ns)?.insert(&doc)?;
            }
        }
        Ok(true)
    }

    fn find_index(&self, ns: &Namespace, name: &str) -> StorageResult<Option<IndexSpec>> {
        Ok(self.read()?.require(ns)?.index(name).map(|i| i.spec.clone()))
    }

    fn num_indexes_total(&self, ns: &Namespace) -> StorageResult<usize> {
        Ok(self.read()?.require(ns)?.num_indexes_total())
    }

    fn index_key_count(&self, ns: &Namespace, name: &str) -> StorageResult<u64> {
        let catalog = self.read()?;
        let index = catalog
            .require(ns)?
            .index(name)
            .ok_or_else(|| StorageError::index_not_found(format!("index {} not found on {}", name, ns)))?;
        Ok(index.tree.entry_count() as u64)
    }

    fn seek_index(
        &self,
        ns: &Namespace,
        name: &str,
        from: Bound<&IndexEntry>,
        direction: ScanDirection,
    ) -> StorageResult<Option<IndexEntry>> {
        let catalog = self.read()?;
        let index = catalog
            .require(ns)?
            .index(name)
            .ok_or_else(|| StorageError::index_not_found(format!("index {} not found on {}", name, ns)))?;
        Ok(index.tree.seek(from, direction))
    }

    fn begin_index_builds(
        &self,
        client: ClientId,
        ns: &Namespace,
        specs: &[IndexSpec],
    ) -> StorageResult<Vec<IndexBuildId>> {
        self.require_client_on_thread(client)?;
        self.write()?.require_mut(ns)?.begin_builds(client, specs)
    }

    fn bulk_insert(
        &self,
        client: ClientId,
        ns: &Namespace,
        builds: &[IndexBuildId],
        docs: &[Document],
    ) -> StorageResult<u64> {
        self.require_client_on_thread(client)?;
        self.check_write_conflict()?;
        let mut catalog = self.write()?;
        let coll = catalog.require_mut(ns)?;
        if let Some(unknown) = builds.iter().find(|b| coll.build_owner(**b).is_none()) {
            return Err(StorageError::internal(format!("unknown index build {:?} on {}", unknown, ns)));
        }
        for doc in docs {
            coll.append(doc)?;
        }
        Ok(docs.len() as u64)
    }

    fn commit_index_builds(
        &self,
        client: ClientId,
        ns: &Namespace,
        builds: &[IndexBuildId],
    ) -> StorageResult<()> {
        self.require_client_on_thread(client)?;
        self.check_write_conflict()?;
        self.write()?.require_mut(ns)?.commit_builds(builds)
    }

    fn abort_index_builds(
        &self,
        client: ClientId,
        ns: &Namespace,
        builds: &[IndexBuildId],
    ) -> StorageResult<()> {
        self.require_client_on_thread(client)?;
        self.check_write_conflict()?;
        if let Some(coll) = self.write()?.collection_mut(ns) {
            coll.abort_builds(builds);
        }
        Ok(())
    }

    fn wait_until_durable(&self) -> StorageResult<()> {
        self.durable_waits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{KeyPattern, ID_INDEX_NAME};
    use crate::errors::ErrorCode;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    fn ns() -> Namespace {
        Namespace::new("test", "coll")
    }

    fn engine_with_collection() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine
            .create_collection(&ns(), &CollectionOptions::default(), IdIndexCreation::Auto)
            .unwrap();
        engine
    }

    #[test]
    fn test_database_exists_does_not_create() {
        let engine = MemoryEngine::new();
        assert!(!engine.database_exists("test"));
        assert!(!engine.database_exists("test"));
        engine
            .create_collection(&ns(), &CollectionOptions::default(), IdIndexCreation::Auto)
            .unwrap();
        assert!(engine.database_exists("test"));
    }

    #[test]
    fn test_non_capped_oplog_rejected() {
        let engine = MemoryEngine::new();
        let oplog = Namespace::new("local", "oplog.rs");
        let err = engine
            .create_collection(&oplog, &CollectionOptions::default(), IdIndexCreation::Auto)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::EngineSpecific(NON_CAPPED_OPLOG_ERROR));
        assert!(!engine.collection_exists(&oplog));
    }

    #[test]
    fn test_capped_rejects_batches() {
        let engine = MemoryEngine::new();
        let capped = Namespace::new("test", "capped");
        engine
            .create_collection(&capped, &CollectionOptions::capped(1 << 20), IdIndexCreation::Auto)
            .unwrap();
        let err = engine
            .insert_records(&capped, &[doc(json!({"_id": 1})), doc(json!({"_id": 2}))])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OperationCannotBeBatched);
        assert_eq!(engine.record_count(&capped).unwrap(), 0);
        engine.insert_records(&capped, &[doc(json!({"_id": 1}))]).unwrap();
        assert_eq!(engine.record_count(&capped).unwrap(), 1);
        assert_eq!(engine.num_indexes_total(&capped).unwrap(), 0);
    }

    #[test]
    fn test_failed_batch_leaves_nothing_behind() {
        let engine = engine_with_collection();
        let err = engine
            .insert_records(&ns(), &[doc(json!({"_id": 1})), doc(json!({"x": 2}))])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(engine.record_count(&ns()).unwrap(), 0);
        assert_eq!(engine.index_key_count(&ns(), ID_INDEX_NAME).unwrap(), 0);
    }

    #[test]
    fn test_remove_missing_record_is_none() {
        let engine = engine_with_collection();
        let ids = engine.insert_records(&ns(), &[doc(json!({"_id": 1}))]).unwrap();
        assert_eq!(engine.remove_record(&ns(), ids[0]).unwrap(), Some(doc(json!({"_id": 1}))));
        assert_eq!(engine.remove_record(&ns(), ids[0]).unwrap(), None);
        assert_eq!(engine.index_key_count(&ns(), ID_INDEX_NAME).unwrap(), 0);
    }

    #[test]
    fn test_injected_conflicts_are_consumed() {
        let engine = engine_with_collection();
        engine.inject_write_conflicts(2);
        for _ in 0..2 {
            let err = engine.insert_records(&ns(), &[doc(json!({"_id": 1}))]).unwrap_err();
            assert!(err.is_write_conflict());
        }
        assert_eq!(engine.pending_write_conflicts(), 0);
        engine.insert_records(&ns(), &[doc(json!({"_id": 1}))]).unwrap();
    }

    #[test]
    fn test_upsert_singleton_creates_and_updates() {
        let engine = MemoryEngine::new();
        let meta = Namespace::new("local", "meta");

        let wrote = engine.upsert_singleton(&meta, &mut |_| None).unwrap();
        assert!(!wrote);
        assert!(!engine.collection_exists(&meta));

        engine
            .upsert_singleton(&meta, &mut |current| {
                assert!(current.is_none());
                Some(doc(json!({"flag": true})))
            })
            .unwrap();
        let first = engine.find_singleton(&meta).unwrap().unwrap();
        assert!(first.contains_key("_id"));

        engine
            .upsert_singleton(&meta, &mut |current| {
                let mut next = current.cloned().unwrap();
                next.remove("flag");
                Some(next)
            })
            .unwrap();
        let second = engine.find_singleton(&meta).unwrap().unwrap();
        assert_eq!(second.get("_id"), first.get("_id"));
        assert!(!second.contains_key("flag"));
        assert_eq!(engine.record_count(&meta).unwrap(), 1);
    }

    #[test]
    fn test_index_builds_require_thread_client() {
        let engine = std::sync::Arc::new(engine_with_collection());
        let spec = IndexSpec::new("x_1", KeyPattern::single("x"));
        let stray = ClientId::new();
        assert!(engine.begin_index_builds(stray, &ns(), &[spec.clone()]).is_err());

        let client = engine.attach_client("builder");
        let builds = engine.begin_index_builds(client, &ns(), &[spec]).unwrap();
        assert_eq!(engine.num_indexes_total(&ns()).unwrap(), 2);

        let from_other_thread = {
            let engine = std::sync::Arc::clone(&engine);
            let builds = builds.clone();
            thread::spawn(move || engine.abort_index_builds(client, &ns(), &builds))
                .join()
                .unwrap()
        };
        assert!(from_other_thread.is_err());

        engine.abort_index_builds(client, &ns(), &builds).unwrap();
        assert_eq!(engine.num_indexes_total(&ns()).unwrap(), 1);
        engine.detach_client(client);
    }

    #[test]
    fn test_durability_wait_counted() {
        let engine = MemoryEngine::new();
        assert_eq!(engine.durable_wait_count(), 0);
        engine.wait_until_durable().unwrap();
        assert_eq!(engine.durable_wait_count(), 1);
    }
}
