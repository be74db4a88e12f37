//! Collection create/drop and count/size accessors

use std::sync::Arc;

use crate::engine::{AutoIndexId, CollectionOptions, IdIndexCreation, OperationContext, StorageEngine};
use crate::errors::{ErrorCode, StorageError, StorageResult};
use crate::observability::{log_event, Event};
use crate::types::Namespace;

/// Creates, drops and measures collections
pub struct CollectionLifecycleManager {
    engine: Arc<dyn StorageEngine>,
    oplog_size_bytes: u64,
}

impl CollectionLifecycleManager {
    pub fn new(engine: Arc<dyn StorageEngine>, oplog_size_bytes: u64) -> Self {
        Self {
            engine,
            oplog_size_bytes,
        }
    }

    pub(crate) fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// Create a collection. Engine rejections of the options come back as
    /// ordinary errors.
    pub fn create_collection(
        &self,
        ctx: &OperationContext,
        ns: &Namespace,
        options: &CollectionOptions,
    ) -> StorageResult<()> {
        self.create(ctx, ns, options, IdIndexCreation::Auto)?;
        log_event(Event::CollectionCreated, &[("ns", &ns.to_string())]);
        Ok(())
    }

    /// Create a capped oplog collection of the configured size, without
    /// an `_id` index
    pub fn create_oplog(&self, ctx: &OperationContext, ns: &Namespace) -> StorageResult<()> {
        let options = CollectionOptions {
            auto_index_id: AutoIndexId::No,
            ..CollectionOptions::capped(self.oplog_size_bytes)
        };
        self.create(ctx, ns, &options, IdIndexCreation::Auto)?;
        log_event(
            Event::OplogCreated,
            &[("ns", &ns.to_string()), ("size_bytes", &self.oplog_size_bytes.to_string())],
        );
        Ok(())
    }

    pub(crate) fn create(
        &self,
        ctx: &OperationContext,
        ns: &Namespace,
        options: &CollectionOptions,
        id_index: IdIndexCreation,
    ) -> StorageResult<()> {
        ctx.check_for_interrupt()?;
        if self.engine.collection_exists(ns) {
            return Err(StorageError::namespace_exists(format!("Collection {} already exists", ns)));
        }
        self.engine.create_collection(ns, options, id_index).map_err(|e| {
            log_event(
                Event::CollectionCreateFailed,
                &[("ns", &ns.to_string()), ("reason", &e.to_string())],
            );
            e
        })
    }

    /// Drop a collection. Missing collections and databases are not an
    /// error, including a collection dropped concurrently by another
    /// caller, and the database is never created.
    pub fn drop_collection(&self, ctx: &OperationContext, ns: &Namespace) -> StorageResult<()> {
        ctx.check_for_interrupt()?;
        match self.engine.drop_collection(ns) {
            Ok(()) => {
                log_event(Event::CollectionDropped, &[("ns", &ns.to_string())]);
                Ok(())
            }
            Err(e) if e.code() == ErrorCode::NamespaceNotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Exact number of documents
    pub fn get_collection_count(&self, ctx: &OperationContext, ns: &Namespace) -> StorageResult<u64> {
        ctx.check_for_interrupt()?;
        self.require(ns)?;
        self.engine.record_count(ns)
    }

    /// Approximate stored size in bytes; zero only while empty
    pub fn get_collection_size(&self, ctx: &OperationContext, ns: &Namespace) -> StorageResult<u64> {
        ctx.check_for_interrupt()?;
        self.require(ns)?;
        self.engine.data_size(ns)
    }

    fn require(&self, ns: &Namespace) -> StorageResult<()> {
        if !self.engine.database_exists(ns.db()) {
            return Err(StorageError::namespace_not_found(format!("Database {} not found", ns.db())));
        }
        if !self.engine.collection_exists(ns) {
            return Err(StorageError::namespace_not_found(format!("Collection {} not found", ns)));
        }
        Ok(())
    }
}
