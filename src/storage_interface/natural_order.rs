//! Record-at-a-time natural order iteration
//!
//! Used by tooling to inspect collection contents, typically the oplog
//! newest-first. Exhaustion is reported as `CollectionIsEmpty`, a terminal
//! signal rather than a failure.

use std::sync::Arc;

use crate::engine::{RecordId, StorageEngine};
use crate::errors::{ErrorCode, StorageError, StorageResult};
use crate::types::{Document, Namespace, ScanDirection};

pub struct NaturalOrderIterator {
    engine: Arc<dyn StorageEngine>,
    ns: Namespace,
    direction: ScanDirection,
    after: Option<RecordId>,
}

impl NaturalOrderIterator {
    pub fn new(engine: Arc<dyn StorageEngine>, ns: Namespace, direction: ScanDirection) -> Self {
        Self {
            engine,
            ns,
            direction,
            after: None,
        }
    }

    /// Next document and its record id, or `CollectionIsEmpty` at the end
    pub fn next_document(&mut self) -> StorageResult<(Document, RecordId)> {
        match self.engine.next_record(&self.ns, self.after, self.direction)? {
            Some((record, doc)) => {
                self.after = Some(record);
                Ok((doc, record))
            }
            None => Err(StorageError::collection_is_empty(format!(
                "no more documents in {}",
                self.ns
            ))),
        }
    }

    /// Drain the remaining documents
    pub fn collect_remaining(mut self) -> StorageResult<Vec<Document>> {
        let mut docs = Vec::new();
        loop {
            match self.next_document() {
                Ok((doc, _)) => docs.push(doc),
                Err(e) if e.code() == ErrorCode::CollectionIsEmpty => return Ok(docs),
                Err(e) => return Err(e),
            }
        }
    }
}
