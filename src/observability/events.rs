//! Observable events emitted by the storage core

use std::fmt;

/// Lifecycle points that produce a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Collection lifecycle
    CollectionCreated,
    CollectionCreateFailed,
    CollectionDropped,
    OplogCreated,

    // Writes
    /// Batch rejected as a unit, inserting one document at a time
    InsertBatchFallback,
    /// Transient write conflict, operation will be retried
    WriteConflictRetry,

    // Replication metadata
    MinValidUpdated,
    InitialSyncFlagSet,
    InitialSyncFlagCleared,
    AppliedThroughUpdated,
    OplogDeleteFromPointUpdated,

    // Bulk loading
    BulkLoadBegin,
    BulkLoadCommit,
    BulkLoadAbandon,
    /// A loader call ran on a thread without the loader's own client
    TransientClientAttached,

    // Scans
    ScanComplete,
}

impl Event {
    /// Returns the event name written to the log
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::CollectionCreated => "COLLECTION_CREATED",
            Event::CollectionCreateFailed => "COLLECTION_CREATE_FAILED",
            Event::CollectionDropped => "COLLECTION_DROPPED",
            Event::OplogCreated => "OPLOG_CREATED",
            Event::InsertBatchFallback => "INSERT_BATCH_FALLBACK",
            Event::WriteConflictRetry => "WRITE_CONFLICT_RETRY",
            Event::MinValidUpdated => "MIN_VALID_UPDATED",
            Event::InitialSyncFlagSet => "INITIAL_SYNC_FLAG_SET",
            Event::InitialSyncFlagCleared => "INITIAL_SYNC_FLAG_CLEARED",
            Event::AppliedThroughUpdated => "APPLIED_THROUGH_UPDATED",
            Event::OplogDeleteFromPointUpdated => "OPLOG_DELETE_FROM_POINT_UPDATED",
            Event::BulkLoadBegin => "BULK_LOAD_BEGIN",
            Event::BulkLoadCommit => "BULK_LOAD_COMMIT",
            Event::BulkLoadAbandon => "BULK_LOAD_ABANDON",
            Event::TransientClientAttached => "TRANSIENT_CLIENT_ATTACHED",
            Event::ScanComplete => "SCAN_COMPLETE",
        }
    }

    /// Events reporting a failed operation are logged at ERROR
    pub fn is_failure(&self) -> bool {
        matches!(self, Event::CollectionCreateFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_screaming_snake_case() {
        let events = [
            Event::CollectionCreated,
            Event::InsertBatchFallback,
            Event::WriteConflictRetry,
            Event::BulkLoadAbandon,
            Event::TransientClientAttached,
        ];
        for e in events {
            let name = e.as_str();
            assert!(name.chars().all(|c| c.is_ascii_uppercase() || c == '_'), "{}", name);
        }
    }

    #[test]
    fn test_failure_events() {
        assert!(Event::CollectionCreateFailed.is_failure());
        assert!(!Event::CollectionCreated.is_failure());
    }
}
