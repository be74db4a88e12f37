//! Documents are ordered JSON objects
//!
//! Field order is preserved (serde_json `preserve_order`), so a document
//! round-trips through the record store exactly as inserted.

use serde_json::{Map, Value};

use crate::errors::{StorageError, StorageResult};

/// An ordered mapping of field name to value
pub type Document = Map<String, Value>;

/// Field that identifies a document within its collection
pub const ID_FIELD: &str = "_id";

/// Convert a JSON value into a document, rejecting non-objects
pub fn to_document(value: Value) -> StorageResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::bad_value(format!(
            "expected a document, got {}",
            other
        ))),
    }
}

/// Returns the identifier value if present
pub fn id_of(doc: &Document) -> Option<&Value> {
    doc.get(ID_FIELD)
}

/// Resolve a dotted path (`a.b.c`) inside a document
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
