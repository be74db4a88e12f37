//! Configuration Loading Tests

use std::io::Write;
use std::sync::Arc;

use aerorepl::config::{Durability, ReplicationStorageConfig};
use aerorepl::engine::StorageEngine;
use aerorepl::errors::ErrorCode;
use aerorepl::types::{Namespace, OpTime, Timestamp};
use aerorepl::{MemoryEngine, StorageInterface};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// A config file drives the storage interface it builds.
#[test]
fn test_load_and_apply() {
    let file = write_config(
        r#"{
            "min_valid_namespace": "local.mv_from_file",
            "durability": "wait_until_durable"
        }"#,
    );
    let config = ReplicationStorageConfig::load(file.path()).unwrap();
    assert_eq!(config.min_valid_namespace, Namespace::new("local", "mv_from_file"));
    assert_eq!(config.durability, Durability::WaitUntilDurable);

    let memory = Arc::new(MemoryEngine::new());
    let engine: Arc<dyn StorageEngine> = memory.clone();
    let storage = StorageInterface::new(engine, config).unwrap();
    let ctx = storage.make_operation_context("config-test");
    storage
        .set_min_valid(&ctx, OpTime::new(Timestamp::new(1, 1), 1))
        .unwrap();

    assert!(memory.collection_exists(&Namespace::new("local", "mv_from_file")));
    assert_eq!(memory.durable_wait_count(), 1);
}

/// An unreadable path is BadValue carrying the path.
#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = ReplicationStorageConfig::load(&path).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadValue);
    assert!(err.details().unwrap().contains("absent.json"));
}

/// Malformed or invalid contents are rejected.
#[test]
fn test_load_invalid_contents() {
    let file = write_config("{ not json");
    let err = ReplicationStorageConfig::load(file.path()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadValue);

    let file = write_config(r#"{"oplog_size_bytes": 0}"#);
    let err = ReplicationStorageConfig::load(file.path()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadValue);
}
