//! Timestamp and OpTime
//!
//! An OpTime orders replicated operations: election term first, then the
//! (seconds, counter) timestamp. The null OpTime has a zero timestamp and
//! the uninitialized term, and sorts before every real OpTime.
//!
//! Encoding inside documents:
//!
//! ```text
//! Timestamp: { "$timestamp": { "t": <secs>, "i": <inc> } }
//! OpTime:    { "ts": <Timestamp>, "t": <term> }
//! ```

use std::fmt;

use serde_json::{json, Value};

use crate::errors::{StorageError, StorageResult};
use crate::types::document::Document;

/// Term used before any election has been observed
pub const UNINITIALIZED_TERM: i64 = -1;

/// Field holding an OpTime's timestamp
pub const TIMESTAMP_FIELD: &str = "ts";

/// Field holding an OpTime's term
pub const TERM_FIELD: &str = "t";

/// Wall-clock seconds plus an ordinal within that second
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    secs: u32,
    inc: u32,
}

impl Timestamp {
    pub fn new(secs: u32, inc: u32) -> Self {
        Self { secs, inc }
    }

    pub fn secs(&self) -> u32 {
        self.secs
    }

    pub fn inc(&self) -> u32 {
        self.inc
    }

    pub fn is_null(&self) -> bool {
        self.secs == 0 && self.inc == 0
    }

    pub fn to_value(&self) -> Value {
        json!({ "$timestamp": { "t": self.secs, "i": self.inc } })
    }

    pub fn from_value(value: &Value) -> StorageResult<Self> {
        let inner = value
            .get("$timestamp")
            .ok_or_else(|| StorageError::bad_value(format!("expected a timestamp, got {}", value)))?;
        let part = |name: &str| -> StorageResult<u32> {
            inner
                .get(name)
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    StorageError::bad_value(format!("timestamp field '{}' missing or out of range", name))
                })
        };
        Ok(Self::new(part("t")?, part("i")?))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}, {})", self.secs, self.inc)
    }
}

/// Position of an operation in the replicated history
///
/// Field order matters: the derived ordering compares term, then timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpTime {
    term: i64,
    timestamp: Timestamp,
}

impl OpTime {
    pub fn new(timestamp: Timestamp, term: i64) -> Self {
        Self { term, timestamp }
    }

    /// The zero OpTime
    pub fn null() -> Self {
        Self::new(Timestamp::default(), UNINITIALIZED_TERM)
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn term(&self) -> i64 {
        self.term
    }

    pub fn is_null(&self) -> bool {
        self.timestamp.is_null()
    }

    /// Encode as `{ts, t}`
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        self.append_to(&mut doc);
        doc
    }

    /// Write `ts` and `t` into an existing document, replacing any previous values
    pub fn append_to(&self, doc: &mut Document) {
        doc.insert(TIMESTAMP_FIELD.to_string(), self.timestamp.to_value());
        doc.insert(TERM_FIELD.to_string(), Value::from(self.term));
    }

    /// Decode from a document carrying `ts` and `t`
    pub fn from_document(doc: &Document) -> StorageResult<Self> {
        let ts = doc
            .get(TIMESTAMP_FIELD)
            .ok_or_else(|| StorageError::bad_value("optime is missing field 'ts'"))?;
        let term = doc
            .get(TERM_FIELD)
            .and_then(Value::as_i64)
            .ok_or_else(|| StorageError::bad_value("optime is missing integer field 't'"))?;
        Ok(Self::new(Timestamp::from_value(ts)?, term))
    }
}

impl Default for OpTime {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for OpTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ts: {}, t: {} }}", self.timestamp, self.term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_optime() {
        let null = OpTime::null();
        assert!(null.is_null());
        assert_eq!(null.term(), UNINITIALIZED_TERM);
        assert_eq!(OpTime::default(), null);
        assert!(null < OpTime::new(Timestamp::new(1, 0), 0));
    }

    #[test]
    fn test_ordering_term_then_timestamp() {
        let a = OpTime::new(Timestamp::new(100, 0), 1);
        let b = OpTime::new(Timestamp::new(50, 0), 2);
        let c = OpTime::new(Timestamp::new(100, 1), 1);
        assert!(a < b);
        assert!(a < c);
        assert!(c < b);
    }

    #[test]
    fn test_document_encoding() {
        let op = OpTime::new(Timestamp::new(123, 4), 7);
        let doc = op.to_document();
        assert_eq!(doc["ts"], json!({"$timestamp": {"t": 123, "i": 4}}));
        assert_eq!(doc["t"], json!(7));
        assert_eq!(OpTime::from_document(&doc).unwrap(), op);
    }

    #[test]
    fn test_null_survives_encoding() {
        let doc = OpTime::null().to_document();
        assert_eq!(OpTime::from_document(&doc).unwrap(), OpTime::null());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let mut doc = Document::new();
        doc.insert("ts".into(), json!(5));
        doc.insert("t".into(), json!(1));
        assert!(OpTime::from_document(&doc).is_err());
        assert!(OpTime::from_document(&Document::new()).is_err());
    }
}
