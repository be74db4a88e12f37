//! aerorepl - storage core for database replication
//!
//! Replication metadata, document insertion, bounded range scans, bulk
//! collection loading and collection lifecycle, over a pluggable
//! `StorageEngine`.

pub mod config;
pub mod engine;
pub mod errors;
pub mod observability;
pub mod replication;
pub mod storage_interface;
pub mod types;

pub use config::{Durability, ReplicationStorageConfig};
pub use engine::memory::MemoryEngine;
pub use engine::{OperationContext, StorageEngine};
pub use errors::{ErrorCode, StorageError, StorageResult};
pub use storage_interface::{BulkCollectionLoader, ScanRequest, StorageInterface};
