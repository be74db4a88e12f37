//! Bounded, directional range scans
//!
//! One range walk serves both `find_documents` and `delete_documents`; the
//! `ScanMode` decides what happens to each visited record. The walk is a
//! lazy cursor that remembers the last index entry (or record id) it
//! returned and seeks strictly past it for the next one, so removing the
//! current record never disturbs the rest of the scan.
//!
//! Seeding an index scan from a start key:
//!
//! ```text
//! direction  start included   initial position
//! forward    yes              >= (start ++ MinKey.., RecordId::MIN)
//! forward    no               >  (start ++ MaxKey.., RecordId::MAX)
//! backward   yes              <= (start ++ MaxKey.., RecordId::MAX)
//! backward   no               <  (start ++ MinKey.., RecordId::MIN)
//! ```

use std::ops::Bound;
use std::sync::Arc;

use crate::engine::{
    write_conflict_retry, IndexEntry, KeyPattern, KeyValue, OperationContext, RecordId, StorageEngine,
};
use crate::errors::{StorageError, StorageResult};
use crate::observability::{trace_event, Event};
use crate::types::{BoundInclusion, Document, Namespace, ScanDirection};

/// What the walk does with each visited record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Return the document
    Find,
    /// Remove the record and return its document
    Delete,
}

impl ScanMode {
    fn op_name(&self) -> &'static str {
        match self {
            ScanMode::Find => "findDocuments",
            ScanMode::Delete => "deleteDocuments",
        }
    }
}

/// Parameters of one range scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    /// Index to walk; `None` walks the collection in natural order
    pub index_name: Option<String>,
    pub direction: ScanDirection,
    /// Key document whose values line up with the index key pattern.
    /// Empty means no start key.
    pub start_key: Document,
    pub bound_inclusion: BoundInclusion,
    /// Maximum number of documents; 0 returns nothing
    pub limit: usize,
}

impl ScanRequest {
    /// Forward scan over the named index
    pub fn by_index(name: impl Into<String>) -> Self {
        Self {
            index_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Forward scan in natural order
    pub fn natural() -> Self {
        Self::default()
    }

    pub fn direction(mut self, direction: ScanDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn start_key(mut self, key: Document) -> Self {
        self.start_key = key;
        self
    }

    pub fn bound_inclusion(mut self, inclusion: BoundInclusion) -> Self {
        self.bound_inclusion = inclusion;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Runs find and delete range scans
pub struct KeyRangeScanner {
    engine: Arc<dyn StorageEngine>,
}

impl KeyRangeScanner {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self { engine }
    }

    /// Up to `limit` documents from the range, in scan order
    pub fn find_documents(
        &self,
        ctx: &OperationContext,
        ns: &Namespace,
        request: &ScanRequest,
    ) -> StorageResult<Vec<Document>> {
        self.scan(ctx, ns, request, ScanMode::Find)
    }

    /// Remove up to `limit` documents from the range, returning them in the
    /// order `find_documents` would have
    pub fn delete_documents(
        &self,
        ctx: &OperationContext,
        ns: &Namespace,
        request: &ScanRequest,
    ) -> StorageResult<Vec<Document>> {
        self.scan(ctx, ns, request, ScanMode::Delete)
    }

    fn scan(
        &self,
        ctx: &OperationContext,
        ns: &Namespace,
        request: &ScanRequest,
        mode: ScanMode,
    ) -> StorageResult<Vec<Document>> {
        let cursor = self.open(ctx, ns, request, mode)?;
        let docs = cursor.take(request.limit).collect::<StorageResult<Vec<_>>>()?;
        trace_event(
            Event::ScanComplete,
            &[
                ("direction", request.direction.as_str()),
                ("index", request.index_name.as_deref().unwrap_or("$natural")),
                ("mode", mode.op_name()),
                ("ns", &ns.to_string()),
                ("returned", &docs.len().to_string()),
            ],
        );
        Ok(docs)
    }

    /// Validate the request and position a cursor at the start of the range
    pub fn open<'a>(
        &'a self,
        ctx: &'a OperationContext,
        ns: &'a Namespace,
        request: &ScanRequest,
        mode: ScanMode,
    ) -> StorageResult<RangeCursor<'a>> {
        if !self.engine.collection_exists(ns) {
            return Err(StorageError::namespace_not_found(format!(
                "Collection [{}] not found. Unable to {}.",
                ns,
                mode.op_name()
            )));
        }
        let source = match &request.index_name {
            Some(name) => self.index_source(ns, name, request)?,
            None => natural_source(ns, request)?,
        };
        Ok(RangeCursor {
            engine: self.engine.as_ref(),
            ctx,
            ns,
            direction: request.direction,
            mode,
            source,
            done: false,
        })
    }

    fn index_source(&self, ns: &Namespace, name: &str, request: &ScanRequest) -> StorageResult<Source> {
        let spec = self.engine.find_index(ns, name)?.ok_or_else(|| {
            StorageError::index_not_found(format!("Index not found, ns: {}, index: {}", ns, name))
        })?;
        if spec.is_partial() {
            return Err(StorageError::index_options_conflict(format!(
                "Partial index is not allowed for this operation, ns: {}, index: {}",
                ns, name
            )));
        }
        let position = initial_position(&spec.key, request)?;
        Ok(Source::Index {
            name: name.to_string(),
            position,
        })
    }
}

fn natural_source(ns: &Namespace, request: &ScanRequest) -> StorageResult<Source> {
    if !request.start_key.is_empty() {
        return Err(StorageError::no_such_key(format!(
            "non-empty start key {} not allowed for a collection scan, ns: {}",
            serde_json::Value::Object(request.start_key.clone()),
            ns
        )));
    }
    if request.bound_inclusion != BoundInclusion::IncludeStartKeyOnly {
        return Err(StorageError::invalid_options(format!(
            "bound inclusion must be {} for a collection scan, got {}, ns: {}",
            BoundInclusion::IncludeStartKeyOnly.as_str(),
            request.bound_inclusion.as_str(),
            ns
        )));
    }
    Ok(Source::Natural { after: None })
}

fn initial_position(pattern: &KeyPattern, request: &ScanRequest) -> StorageResult<Bound<IndexEntry>> {
    let start = &request.start_key;
    if start.is_empty() {
        return Ok(Bound::Unbounded);
    }
    if start.len() > pattern.len() {
        return Err(StorageError::bad_value(format!(
            "start key has {} fields but the index key pattern has {}",
            start.len(),
            pattern.len()
        )));
    }
    let low = |fill| pattern.bound_from(start, fill);
    let include = request.bound_inclusion.includes_start();
    Ok(match (request.direction, include) {
        (ScanDirection::Forward, true) => {
            Bound::Included(IndexEntry::new(low(KeyValue::MinKey), RecordId::MIN))
        }
        (ScanDirection::Forward, false) => {
            Bound::Excluded(IndexEntry::new(low(KeyValue::MaxKey), RecordId::MAX))
        }
        (ScanDirection::Backward, true) => {
            Bound::Included(IndexEntry::new(low(KeyValue::MaxKey), RecordId::MAX))
        }
        (ScanDirection::Backward, false) => {
            Bound::Excluded(IndexEntry::new(low(KeyValue::MinKey), RecordId::MIN))
        }
    })
}

/// Where the cursor reads from and how far it has got
#[derive(Debug)]
enum Source {
    Index {
        name: String,
        position: Bound<IndexEntry>,
    },
    Natural {
        after: Option<RecordId>,
    },
}

/// Lazy cursor over one range; yields documents until the range ends or
/// an error occurs
pub struct RangeCursor<'a> {
    engine: &'a dyn StorageEngine,
    ctx: &'a OperationContext,
    ns: &'a Namespace,
    direction: ScanDirection,
    mode: ScanMode,
    source: Source,
    done: bool,
}

impl<'a> RangeCursor<'a> {
    fn step(&mut self) -> StorageResult<Option<Document>> {
        loop {
            self.ctx.check_for_interrupt()?;
            match &mut self.source {
                Source::Index { name, position } => {
                    let Some(entry) =
                        self.engine
                            .seek_index(self.ns, name, position.as_ref(), self.direction)?
                    else {
                        return Ok(None);
                    };
                    let record = entry.record;
                    *position = Bound::Excluded(entry);
                    let doc = match self.mode {
                        ScanMode::Find => self.engine.record(self.ns, record)?,
                        ScanMode::Delete => self.remove(record)?,
                    };
                    // An entry whose record vanished after the seek is skipped.
                    if let Some(doc) = doc {
                        return Ok(Some(doc));
                    }
                }
                Source::Natural { after } => {
                    let Some((record, doc)) = self.engine.next_record(self.ns, *after, self.direction)? else {
                        return Ok(None);
                    };
                    *after = Some(record);
                    match self.mode {
                        ScanMode::Find => return Ok(Some(doc)),
                        ScanMode::Delete => {
                            if let Some(removed) = self.remove(record)? {
                                return Ok(Some(removed));
                            }
                        }
                    }
                }
            }
        }
    }

    fn remove(&self, record: RecordId) -> StorageResult<Option<Document>> {
        write_conflict_retry(self.ctx, self.mode.op_name(), self.ns, || {
            self.engine.remove_record(self.ns, record)
        })
    }
}

impl<'a> Iterator for RangeCursor<'a> {
    type Item = StorageResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(doc)) => Some(Ok(doc)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
