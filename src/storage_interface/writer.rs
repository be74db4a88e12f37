//! Document insertion
//!
//! A batch is first offered to the engine as a single atomic unit. If the
//! collection cannot take batches, the documents go in one per unit, in
//! order. A failure part-way through surfaces as-is; documents already
//! inserted stay.

use std::sync::Arc;

use crate::engine::{write_conflict_retry, OperationContext, StorageEngine};
use crate::errors::{ErrorCode, StorageError, StorageResult};
use crate::observability::{log_event, Event};
use crate::types::{Document, Namespace};

/// Inserts documents into existing collections
pub struct DocumentWriter {
    engine: Arc<dyn StorageEngine>,
}

impl DocumentWriter {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self { engine }
    }

    pub fn insert_document(&self, ctx: &OperationContext, ns: &Namespace, doc: Document) -> StorageResult<()> {
        self.insert_documents(ctx, ns, vec![doc])
    }

    pub fn insert_documents(&self, ctx: &OperationContext, ns: &Namespace, docs: Vec<Document>) -> StorageResult<()> {
        if docs.is_empty() {
            return Ok(());
        }
        if !self.engine.collection_exists(ns) {
            return Err(StorageError::namespace_not_found(format!(
                "The collection must exist before inserting documents, ns: {}",
                ns
            )));
        }
        if docs.len() == 1 {
            return self.insert_one(ctx, ns, &docs[0]);
        }

        let batch = write_conflict_retry(ctx, "insertDocuments", ns, || {
            self.engine.insert_records(ns, &docs)
        });
        match batch {
            Ok(_) => Ok(()),
            Err(e) if e.code() == ErrorCode::OperationCannotBeBatched => {
                log_event(
                    Event::InsertBatchFallback,
                    &[("count", &docs.len().to_string()), ("ns", &ns.to_string())],
                );
                docs.iter().try_for_each(|doc| self.insert_one(ctx, ns, doc))
            }
            Err(e) => Err(e),
        }
    }

    fn insert_one(&self, ctx: &OperationContext, ns: &Namespace, doc: &Document) -> StorageResult<()> {
        write_conflict_retry(ctx, "insertDocument", ns, || {
            self.engine.insert_records(ns, std::slice::from_ref(doc))
        })
        .map(|_| ())
    }
}
