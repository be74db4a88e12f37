//! Replication checkpoint metadata
//!
//! The field names below are an on-disk contract shared with tooling that
//! reads the metadata namespace directly.

mod metadata;

pub use metadata::ReplicationMetadataStore;

/// Present and `true` while an initial sync is in progress
pub const INITIAL_SYNC_FLAG_FIELD: &str = "doingInitialSync";

/// Applied-through optime, stored as an `{ts, t}` subdocument
pub const BEGIN_FIELD: &str = "begin";

/// Bare timestamp from which the oplog is to be truncated
pub const OPLOG_DELETE_FROM_POINT_FIELD: &str = "oplogDeleteFromPoint";

/// MinValid lives at the top level of the document under the OpTime fields
pub use crate::types::{TERM_FIELD as MIN_VALID_TERM_FIELD, TIMESTAMP_FIELD as MIN_VALID_TIMESTAMP_FIELD};
