//! Replication storage interface
//!
//! The surface replication code talks to. Each concern lives in its own
//! component; `StorageInterface` composes them over one engine and one
//! configuration.
//!
//! ```ignore
//! let storage = StorageInterface::new(engine, ReplicationStorageConfig::default())?;
//! let ctx = storage.make_operation_context("initial sync");
//!
//! storage.set_initial_sync_flag(&ctx)?;
//! storage.create_collection(&ctx, &ns, &CollectionOptions::default())?;
//! storage.insert_documents(&ctx, &ns, docs)?;
//! let first = storage.find_documents(&ctx, &ns, &ScanRequest::by_index("_id_").limit(1))?;
//! ```

mod bulk_loader;
mod lifecycle;
mod natural_order;
mod scanner;
mod writer;

use std::sync::Arc;

use crate::config::ReplicationStorageConfig;
use crate::engine::{CollectionOptions, IndexSpec, OperationContext, StorageEngine};
use crate::errors::StorageResult;
use crate::observability::Logger;
use crate::replication::ReplicationMetadataStore;
use crate::types::{Document, Namespace, OpTime, ScanDirection, Timestamp};

pub use bulk_loader::BulkCollectionLoader;
pub use lifecycle::CollectionLifecycleManager;
pub use natural_order::NaturalOrderIterator;
pub use scanner::{KeyRangeScanner, RangeCursor, ScanMode, ScanRequest};
pub use writer::DocumentWriter;

/// Storage operations used by replication
pub struct StorageInterface {
    engine: Arc<dyn StorageEngine>,
    config: ReplicationStorageConfig,
    metadata: ReplicationMetadataStore,
    writer: DocumentWriter,
    scanner: KeyRangeScanner,
    lifecycle: CollectionLifecycleManager,
}

impl StorageInterface {
    /// Validate `config`, apply its log level and build the components
    pub fn new(engine: Arc<dyn StorageEngine>, config: ReplicationStorageConfig) -> StorageResult<Self> {
        config.validate()?;
        Logger::set_min_severity(config.log_level);
        Ok(Self::build(engine, config))
    }

    /// Default configuration; metadata in `local.replset.minvalid`
    pub fn with_defaults(engine: Arc<dyn StorageEngine>) -> Self {
        Self::build(engine, ReplicationStorageConfig::default())
    }

    fn build(engine: Arc<dyn StorageEngine>, config: ReplicationStorageConfig) -> Self {
        Self {
            metadata: ReplicationMetadataStore::new(Arc::clone(&engine), &config),
            writer: DocumentWriter::new(Arc::clone(&engine)),
            scanner: KeyRangeScanner::new(Arc::clone(&engine)),
            lifecycle: CollectionLifecycleManager::new(Arc::clone(&engine), config.oplog_size_bytes),
            engine,
            config,
        }
    }

    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    pub fn config(&self) -> &ReplicationStorageConfig {
        &self.config
    }

    /// New operation context bound to the calling thread
    pub fn make_operation_context(&self, description: impl Into<String>) -> OperationContext {
        OperationContext::new(&self.engine, description)
    }

    /// Namespace of the replication metadata document
    pub fn min_valid_namespace(&self) -> &Namespace {
        self.metadata.namespace()
    }

    pub fn metadata(&self) -> &ReplicationMetadataStore {
        &self.metadata
    }

    pub fn scanner(&self) -> &KeyRangeScanner {
        &self.scanner
    }

    pub fn lifecycle(&self) -> &CollectionLifecycleManager {
        &self.lifecycle
    }

    // ---- replication metadata ----

    pub fn get_initial_sync_flag(&self, ctx: &OperationContext) -> StorageResult<bool> {
        self.metadata.get_initial_sync_flag(ctx)
    }

    pub fn set_initial_sync_flag(&self, ctx: &OperationContext) -> StorageResult<()> {
        self.metadata.set_initial_sync_flag(ctx)
    }

    pub fn clear_initial_sync_flag(&self, ctx: &OperationContext) -> StorageResult<()> {
        self.metadata.clear_initial_sync_flag(ctx)
    }

    pub fn get_min_valid(&self, ctx: &OperationContext) -> StorageResult<OpTime> {
        self.metadata.get_min_valid(ctx)
    }

    pub fn set_min_valid(&self, ctx: &OperationContext, min_valid: OpTime) -> StorageResult<()> {
        self.metadata.set_min_valid(ctx, min_valid)
    }

    pub fn set_min_valid_to_at_least(&self, ctx: &OperationContext, min_valid: OpTime) -> StorageResult<()> {
        self.metadata.set_min_valid_to_at_least(ctx, min_valid)
    }

    pub fn get_applied_through(&self, ctx: &OperationContext) -> StorageResult<OpTime> {
        self.metadata.get_applied_through(ctx)
    }

    pub fn set_applied_through(&self, ctx: &OperationContext, optime: OpTime) -> StorageResult<()> {
        self.metadata.set_applied_through(ctx, optime)
    }

    pub fn get_oplog_delete_from_point(&self, ctx: &OperationContext) -> StorageResult<Timestamp> {
        self.metadata.get_oplog_delete_from_point(ctx)
    }

    pub fn set_oplog_delete_from_point(&self, ctx: &OperationContext, timestamp: Timestamp) -> StorageResult<()> {
        self.metadata.set_oplog_delete_from_point(ctx, timestamp)
    }

    /// Wait until the metadata writes so far are durable
    pub fn flush_metadata(&self, ctx: &OperationContext) -> StorageResult<()> {
        self.metadata.flush(ctx)
    }

    // ---- documents ----

    pub fn insert_document(&self, ctx: &OperationContext, ns: &Namespace, doc: Document) -> StorageResult<()> {
        self.writer.insert_document(ctx, ns, doc)
    }

    pub fn insert_documents(&self, ctx: &OperationContext, ns: &Namespace, docs: Vec<Document>) -> StorageResult<()> {
        self.writer.insert_documents(ctx, ns, docs)
    }

    pub fn find_documents(
        &self,
        ctx: &OperationContext,
        ns: &Namespace,
        request: &ScanRequest,
    ) -> StorageResult<Vec<Document>> {
        self.scanner.find_documents(ctx, ns, request)
    }

    pub fn delete_documents(
        &self,
        ctx: &OperationContext,
        ns: &Namespace,
        request: &ScanRequest,
    ) -> StorageResult<Vec<Document>> {
        self.scanner.delete_documents(ctx, ns, request)
    }

    /// Iterate `ns` record by record in natural order
    pub fn natural_order_iterator(&self, ns: &Namespace, direction: ScanDirection) -> NaturalOrderIterator {
        NaturalOrderIterator::new(Arc::clone(&self.engine), ns.clone(), direction)
    }

    /// Every document of `ns` in natural order
    pub fn natural_order_documents(
        &self,
        ctx: &OperationContext,
        ns: &Namespace,
        direction: ScanDirection,
    ) -> StorageResult<Vec<Document>> {
        ctx.check_for_interrupt()?;
        self.natural_order_iterator(ns, direction).collect_remaining()
    }

    // ---- collections ----

    /// Start a bulk load into a new collection
    pub fn create_collection_for_bulk_loading(
        &self,
        ns: &Namespace,
        options: &CollectionOptions,
        id_index_spec: Option<IndexSpec>,
        secondary_index_specs: Vec<IndexSpec>,
    ) -> StorageResult<BulkCollectionLoader> {
        BulkCollectionLoader::create(&self.lifecycle, ns, options, id_index_spec, secondary_index_specs)
    }

    pub fn create_collection(
        &self,
        ctx: &OperationContext,
        ns: &Namespace,
        options: &CollectionOptions,
    ) -> StorageResult<()> {
        self.lifecycle.create_collection(ctx, ns, options)
    }

    pub fn create_oplog(&self, ctx: &OperationContext, ns: &Namespace) -> StorageResult<()> {
        self.lifecycle.create_oplog(ctx, ns)
    }

    pub fn drop_collection(&self, ctx: &OperationContext, ns: &Namespace) -> StorageResult<()> {
        self.lifecycle.drop_collection(ctx, ns)
    }

    pub fn get_collection_count(&self, ctx: &OperationContext, ns: &Namespace) -> StorageResult<u64> {
        self.lifecycle.get_collection_count(ctx, ns)
    }

    pub fn get_collection_size(&self, ctx: &OperationContext, ns: &Namespace) -> StorageResult<u64> {
        self.lifecycle.get_collection_size(ctx, ns)
    }
}
