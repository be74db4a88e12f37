//! Replication metadata store
//!
//! One singleton document per namespace holds the replication checkpoint:
//!
//! ```text
//! {
//!   _id: <any>,
//!   ts: <Timestamp>, t: <term>,        // minValid
//!   doingInitialSync: true,            // only while set
//!   begin: { ts: <Timestamp>, t: <term> },   // applied-through
//!   oplogDeleteFromPoint: <Timestamp>
//! }
//! ```
//!
//! Absence of the document or of a field reads as the zero value. Writes
//! create the document on demand with a null minValid. Every write runs
//! under the write-conflict retry loop and waits for durability only when
//! configured to.

use std::sync::Arc;

use serde_json::Value;

use super::{BEGIN_FIELD, INITIAL_SYNC_FLAG_FIELD, OPLOG_DELETE_FROM_POINT_FIELD};
use crate::config::{Durability, ReplicationStorageConfig};
use crate::engine::{write_conflict_retry, OperationContext, StorageEngine};
use crate::errors::{StorageError, StorageResult};
use crate::observability::{log_event, trace_event, Event};
use crate::types::{Document, Namespace, OpTime, Timestamp, TIMESTAMP_FIELD};

/// Reads and writes the replication metadata document
pub struct ReplicationMetadataStore {
    engine: Arc<dyn StorageEngine>,
    ns: Namespace,
    durability: Durability,
}

impl ReplicationMetadataStore {
    pub fn new(engine: Arc<dyn StorageEngine>, config: &ReplicationStorageConfig) -> Self {
        Self {
            engine,
            ns: config.min_valid_namespace.clone(),
            durability: config.durability,
        }
    }

    /// Namespace holding the metadata document
    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    // ---- initial sync flag ----

    pub fn get_initial_sync_flag(&self, ctx: &OperationContext) -> StorageResult<bool> {
        let doc = self.read(ctx)?;
        Ok(doc
            .as_ref()
            .and_then(|d| d.get(INITIAL_SYNC_FLAG_FIELD))
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    pub fn set_initial_sync_flag(&self, ctx: &OperationContext) -> StorageResult<()> {
        self.update(ctx, "setInitialSyncFlag", |current| {
            let mut doc = base_document(current);
            doc.insert(INITIAL_SYNC_FLAG_FIELD.to_string(), Value::Bool(true));
            Some(doc)
        })?;
        log_event(Event::InitialSyncFlagSet, &[("ns", &self.ns.to_string())]);
        Ok(())
    }

    /// Remove the flag, leaving every other field untouched
    pub fn clear_initial_sync_flag(&self, ctx: &OperationContext) -> StorageResult<()> {
        self.update(ctx, "clearInitialSyncFlag", |current| {
            let mut doc = current?.clone();
            doc.remove(INITIAL_SYNC_FLAG_FIELD)?;
            Some(doc)
        })?;
        log_event(Event::InitialSyncFlagCleared, &[("ns", &self.ns.to_string())]);
        Ok(())
    }

    // ---- minValid ----

    pub fn get_min_valid(&self, ctx: &OperationContext) -> StorageResult<OpTime> {
        match self.read(ctx)? {
            Some(doc) => min_valid_of(&doc),
            None => Ok(OpTime::null()),
        }
    }

    /// Overwrite minValid unconditionally
    pub fn set_min_valid(&self, ctx: &OperationContext, min_valid: OpTime) -> StorageResult<()> {
        self.update(ctx, "setMinValid", |current| {
            let mut doc = base_document(current);
            min_valid.append_to(&mut doc);
            Some(doc)
        })?;
        self.trace_min_valid(min_valid);
        Ok(())
    }

    /// Raise minValid to `min_valid` unless it is already at or beyond it.
    /// The comparison and the write happen in one engine call.
    pub fn set_min_valid_to_at_least(&self, ctx: &OperationContext, min_valid: OpTime) -> StorageResult<()> {
        let mut malformed: Option<StorageError> = None;
        let wrote = self.update(ctx, "setMinValidToAtLeast", |current| {
            malformed = None;
            let existing = match current.map(min_valid_of).transpose() {
                Ok(existing) => existing.unwrap_or_else(OpTime::null),
                Err(e) => {
                    malformed = Some(e);
                    return None;
                }
            };
            if min_valid <= existing {
                return None;
            }
            let mut doc = base_document(current);
            min_valid.append_to(&mut doc);
            Some(doc)
        })?;
        if let Some(e) = malformed {
            return Err(e);
        }
        if wrote {
            self.trace_min_valid(min_valid);
        }
        Ok(())
    }

    fn trace_min_valid(&self, min_valid: OpTime) {
        trace_event(
            Event::MinValidUpdated,
            &[("min_valid", &min_valid.to_string()), ("ns", &self.ns.to_string())],
        );
    }

    // ---- applied through ----

    pub fn get_applied_through(&self, ctx: &OperationContext) -> StorageResult<OpTime> {
        let doc = self.read(ctx)?;
        match doc.as_ref().and_then(|d| d.get(BEGIN_FIELD)) {
            Some(Value::Object(begin)) => OpTime::from_document(begin),
            Some(_) => Err(StorageError::bad_value(format!(
                "field '{}' of the replication metadata document must be an optime",
                BEGIN_FIELD
            ))),
            None => Ok(OpTime::null()),
        }
    }

    /// Record the applied-through point. A null optime is stored as such.
    pub fn set_applied_through(&self, ctx: &OperationContext, optime: OpTime) -> StorageResult<()> {
        self.update(ctx, "setAppliedThrough", |current| {
            let mut doc = base_document(current);
            doc.insert(BEGIN_FIELD.to_string(), Value::Object(optime.to_document()));
            Some(doc)
        })?;
        trace_event(
            Event::AppliedThroughUpdated,
            &[("applied_through", &optime.to_string()), ("ns", &self.ns.to_string())],
        );
        Ok(())
    }

    // ---- oplog delete-from point ----

    pub fn get_oplog_delete_from_point(&self, ctx: &OperationContext) -> StorageResult<Timestamp> {
        let doc = self.read(ctx)?;
        match doc.as_ref().and_then(|d| d.get(OPLOG_DELETE_FROM_POINT_FIELD)) {
            Some(value) => Timestamp::from_value(value),
            None => Ok(Timestamp::default()),
        }
    }

    pub fn set_oplog_delete_from_point(&self, ctx: &OperationContext, timestamp: Timestamp) -> StorageResult<()> {
        self.update(ctx, "setOplogDeleteFromPoint", |current| {
            let mut doc = base_document(current);
            doc.insert(OPLOG_DELETE_FROM_POINT_FIELD.to_string(), timestamp.to_value());
            Some(doc)
        })?;
        trace_event(
            Event::OplogDeleteFromPointUpdated,
            &[("ns", &self.ns.to_string()), ("timestamp", &timestamp.to_string())],
        );
        Ok(())
    }

    /// Block until every metadata write so far is durable
    pub fn flush(&self, ctx: &OperationContext) -> StorageResult<()> {
        ctx.check_for_interrupt()?;
        self.engine.wait_until_durable()
    }

    fn read(&self, ctx: &OperationContext) -> StorageResult<Option<Document>> {
        write_conflict_retry(ctx, "readMinValid", &self.ns, || self.engine.find_singleton(&self.ns))
    }

    /// Read-modify-write the singleton; `None` from `f` skips the write
    fn update<F>(&self, ctx: &OperationContext, op_name: &str, mut f: F) -> StorageResult<bool>
    where
        F: FnMut(Option<&Document>) -> Option<Document>,
    {
        let wrote = write_conflict_retry(ctx, op_name, &self.ns, || {
            self.engine.upsert_singleton(&self.ns, &mut f)
        })?;
        if wrote && self.durability == Durability::WaitUntilDurable {
            self.engine.wait_until_durable()?;
        }
        Ok(wrote)
    }
}

/// The current document, or a fresh one carrying the null minValid
fn base_document(current: Option<&Document>) -> Document {
    match current {
        Some(doc) => doc.clone(),
        None => OpTime::null().to_document(),
    }
}

fn min_valid_of(doc: &Document) -> StorageResult<OpTime> {
    if doc.contains_key(TIMESTAMP_FIELD) {
        OpTime::from_document(doc)
    } else {
        Ok(OpTime::null())
    }
}
