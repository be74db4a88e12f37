//! BTreeMap-based index structure
//!
//! `BTreeMap<IndexKey, Vec<RecordId>>`, record ids kept sorted ascending
//! under each key. Iteration order is (key, record id), matching
//! `IndexEntry` ordering.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::engine::{IndexEntry, IndexKey, RecordId};
use crate::types::ScanDirection;

#[derive(Debug, Default, Clone)]
pub struct IndexTree {
    tree: BTreeMap<IndexKey, Vec<RecordId>>,
}

impl IndexTree {
    pub fn new() -> Self {
        Self {
            tree: BTreeMap::new(),
        }
    }

    /// Insert a record id under `key`, keeping ids sorted
    pub fn insert(&mut self, key: IndexKey, record: RecordId) {
        let records = self.tree.entry(key).or_default();
        if let Err(pos) = records.binary_search(&record) {
            records.insert(pos, record);
        }
    }

    /// Remove a record id; drops the key once it has no records
    pub fn remove(&mut self, key: &IndexKey, record: RecordId) {
        if let Some(records) = self.tree.get_mut(key) {
            if let Ok(pos) = records.binary_search(&record) {
                records.remove(pos);
            }
            if records.is_empty() {
                self.tree.remove(key);
            }
        }
    }

    pub fn contains_key(&self, key: &IndexKey) -> bool {
        self.tree.contains_key(key)
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> usize {
        self.tree.len()
    }

    /// Number of (key, record) entries
    pub fn entry_count(&self) -> usize {
        self.tree.values().map(Vec::len).sum()
    }

    /// First entry at or beyond `from` in `direction`
    pub fn seek(&self, from: Bound<&IndexEntry>, direction: ScanDirection) -> Option<IndexEntry> {
        match direction {
            ScanDirection::Forward => self.seek_forward(from),
            ScanDirection::Backward => self.seek_backward(from),
        }
    }

    fn seek_forward(&self, from: Bound<&IndexEntry>) -> Option<IndexEntry> {
        let (start, inclusive) = match from {
            Bound::Unbounded => {
                let (key, records) = self.tree.iter().next()?;
                return Some(IndexEntry::new(key.clone(), *records.first()?));
            }
            Bound::Included(e) => (e, true),
            Bound::Excluded(e) => (e, false),
        };
        for (key, records) in self.tree.range((Bound::Included(&start.key), Bound::Unbounded)) {
            let candidate = if *key == start.key {
                records
                    .iter()
                    .find(|r| if inclusive { **r >= start.record } else { **r > start.record })
            } else {
                records.first()
            };
            if let Some(record) = candidate {
                return Some(IndexEntry::new(key.clone(), *record));
            }
        }
        None
    }

    fn seek_backward(&self, from: Bound<&IndexEntry>) -> Option<IndexEntry> {
        let (start, inclusive) = match from {
            Bound::Unbounded => {
                let (key, records) = self.tree.iter().next_back()?;
                return Some(IndexEntry::new(key.clone(), *records.last()?));
            }
            Bound::Included(e) => (e, true),
            Bound::Excluded(e) => (e, false),
        };
        for (key, records) in self.tree.range((Bound::Unbounded, Bound::Included(&start.key))).rev() {
            let candidate = if *key == start.key {
                records
                    .iter()
                    .rev()
                    .find(|r| if inclusive { **r <= start.record } else { **r < start.record })
            } else {
                records.last()
            };
            if let Some(record) = candidate {
                return Some(IndexEntry::new(key.clone(), *record));
            }
        }
        None
    }
}
