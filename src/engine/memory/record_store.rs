//! Record store: documents keyed by insertion-ordered `RecordId`
//!
//! Records are kept serialized with a CRC32 checksum, verified on every
//! read. Natural order is `RecordId` order, which is insertion order
//! because ids are never reused.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::checksum::{compute_checksum, verify_checksum};
use crate::engine::RecordId;
use crate::errors::{StorageError, StorageResult};
use crate::types::{Document, ScanDirection};

#[derive(Debug, Clone)]
struct StoredRecord {
    body: Vec<u8>,
    checksum: u32,
}

impl StoredRecord {
    fn encode(doc: &Document) -> StorageResult<Self> {
        let body = serde_json::to_vec(doc)
            .map_err(|e| StorageError::internal(format!("failed to serialize document: {}", e)))?;
        let checksum = compute_checksum(&body);
        Ok(Self { body, checksum })
    }

    fn decode(&self, id: RecordId) -> StorageResult<Document> {
        if !verify_checksum(&self.body, self.checksum) {
            return Err(StorageError::data_corruption("record checksum mismatch")
                .with_details(format!("record_id: {}", id.value())));
        }
        serde_json::from_slice(&self.body).map_err(|e| {
            StorageError::data_corruption(format!("record is not a valid document: {}", e))
                .with_details(format!("record_id: {}", id.value()))
        })
    }
}

/// In-memory record store for one collection
#[derive(Debug, Default)]
pub struct RecordStore {
    records: BTreeMap<RecordId, StoredRecord>,
    next_id: u64,
    data_size: u64,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: 1,
            data_size: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of serialized document sizes
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn insert(&mut self, doc: &Document) -> StorageResult<RecordId> {
        let record = StoredRecord::encode(doc)?;
        let id = RecordId::new(self.next_id);
        self.next_id += 1;
        self.data_size += record.body.len() as u64;
        self.records.insert(id, record);
        Ok(id)
    }

    /// Overwrite a record in place, keeping its position
    pub fn replace(&mut self, id: RecordId, doc: &Document) -> StorageResult<()> {
        let record = StoredRecord::encode(doc)?;
        let old = self
            .records
            .get_mut(&id)
            .ok_or_else(|| StorageError::internal(format!("record {} not found", id.value())))?;
        self.data_size = self.data_size - old.body.len() as u64 + record.body.len() as u64;
        *old = record;
        Ok(())
    }

    pub fn get(&self, id: RecordId) -> StorageResult<Option<Document>> {
        self.records.get(&id).map(|r| r.decode(id)).transpose()
    }

    pub fn remove(&mut self, id: RecordId) -> StorageResult<Option<Document>> {
        let Some(record) = self.records.remove(&id) else {
            return Ok(None);
        };
        self.data_size -= record.body.len() as u64;
        record.decode(id).map(Some)
    }

    /// Next record strictly after `after` in natural order
    pub fn next(
        &self,
        after: Option<RecordId>,
        direction: ScanDirection,
    ) -> StorageResult<Option<(RecordId, Document)>> {
        let bound = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        let found = match direction {
            ScanDirection::Forward => self.records.range((bound, Bound::Unbounded)).next(),
            ScanDirection::Backward => self.records.range((Bound::Unbounded, bound)).next_back(),
        };
        match found {
            Some((id, record)) => Ok(Some((*id, record.decode(*id)?))),
            None => Ok(None),
        }
    }

    /// Oldest record id
    pub fn first_id(&self) -> Option<RecordId> {
        self.records.keys().next().copied()
    }

    /// All records in natural order
    pub fn iter(&self) -> impl Iterator<Item = StorageResult<(RecordId, Document)>> + '_ {
        self.records.iter().map(|(id, r)| r.decode(*id).map(|d| (*id, d)))
    }

    #[cfg(test)]
    pub(crate) fn corrupt(&mut self, id: RecordId) {
        if let Some(record) = self.records.get_mut(&id) {
            if let Some(byte) = record.body.first_mut() {
                *byte ^= 0xff;
            }
        }
    }
}
