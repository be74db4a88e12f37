//! Core data model shared by the engine and the storage interface

pub mod document;
mod namespace;
mod optime;
mod scan;

pub use document::{id_of, to_document, Document, ID_FIELD};
pub use namespace::{Namespace, LOCAL_DB, OPLOG_PREFIX};
pub use optime::{OpTime, Timestamp, TERM_FIELD, TIMESTAMP_FIELD, UNINITIALIZED_TERM};
pub use scan::{BoundInclusion, ScanDirection};
