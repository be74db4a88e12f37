//! Collection Lifecycle Tests
//!
//! Creation, oplog creation, idempotent drops and the exact count and
//! approximate size queries.

use std::sync::Arc;
use std::thread;

use aerorepl::config::{ReplicationStorageConfig, DEFAULT_OPLOG_SIZE_BYTES};
use aerorepl::engine::{CollectionOptions, OperationContext, StorageEngine};
use aerorepl::errors::ErrorCode;
use aerorepl::types::{Document, Namespace};
use aerorepl::{MemoryEngine, StorageInterface};
use serde_json::{json, Value};

// =============================================================================
// Test Utilities
// =============================================================================

fn setup() -> (Arc<MemoryEngine>, StorageInterface, OperationContext) {
    let memory = Arc::new(MemoryEngine::new());
    let engine: Arc<dyn StorageEngine> = memory.clone();
    let storage = StorageInterface::with_defaults(engine);
    let ctx = storage.make_operation_context("lifecycle-test");
    (memory, storage, ctx)
}

fn doc(v: Value) -> Document {
    v.as_object().cloned().unwrap()
}

fn ns() -> Namespace {
    Namespace::new("test", "lifecycle")
}

fn oplog() -> Namespace {
    Namespace::new("local", "oplog.rs")
}

// =============================================================================
// Creation
// =============================================================================

/// A new collection exists, is empty and carries an _id index.
#[test]
fn test_create_collection() {
    let (memory, storage, ctx) = setup();
    storage
        .create_collection(&ctx, &ns(), &CollectionOptions::default())
        .unwrap();
    assert!(memory.collection_exists(&ns()));
    assert_eq!(storage.get_collection_count(&ctx, &ns()).unwrap(), 0);
    assert_eq!(storage.get_collection_size(&ctx, &ns()).unwrap(), 0);
    assert_eq!(memory.num_indexes_total(&ns()).unwrap(), 1);
}

/// Creating an existing collection is NamespaceExists.
#[test]
fn test_create_existing_collection() {
    let (_, storage, ctx) = setup();
    storage
        .create_collection(&ctx, &ns(), &CollectionOptions::default())
        .unwrap();
    let err = storage
        .create_collection(&ctx, &ns(), &CollectionOptions::default())
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NamespaceExists);
}

/// An oplog namespace must be capped.
#[test]
fn test_non_capped_oplog_rejected() {
    let (memory, storage, ctx) = setup();
    let err = storage
        .create_collection(&ctx, &oplog(), &CollectionOptions::default())
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::EngineSpecific(28838));
    assert!(err
        .message()
        .contains("cannot create a non-capped oplog collection"));
    assert!(!memory.collection_exists(&oplog()));
}

/// create_oplog makes a capped collection of the configured size without indexes.
#[test]
fn test_create_oplog() {
    let (memory, storage, ctx) = setup();
    storage.create_oplog(&ctx, &oplog()).unwrap();

    let options = memory.collection_options(&oplog()).unwrap();
    assert!(options.capped);
    assert_eq!(options.capped_size, Some(DEFAULT_OPLOG_SIZE_BYTES));
    assert_eq!(memory.num_indexes_total(&oplog()).unwrap(), 0);

    let err = storage.create_oplog(&ctx, &oplog()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NamespaceExists);
}

/// The oplog size comes from configuration.
#[test]
fn test_create_oplog_with_configured_size() {
    let memory = Arc::new(MemoryEngine::new());
    let engine: Arc<dyn StorageEngine> = memory.clone();
    let config = ReplicationStorageConfig {
        oplog_size_bytes: 64 * 1024,
        ..ReplicationStorageConfig::default()
    };
    let storage = StorageInterface::new(engine, config).unwrap();
    let ctx = storage.make_operation_context("sized-oplog");
    storage.create_oplog(&ctx, &oplog()).unwrap();
    assert_eq!(
        memory.collection_options(&oplog()).unwrap().capped_size,
        Some(64 * 1024)
    );
}

/// A zero-sized capped collection is rejected.
#[test]
fn test_zero_capped_size_rejected() {
    let (memory, storage, ctx) = setup();
    let err = storage
        .create_collection(&ctx, &ns(), &CollectionOptions::capped(0))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadValue);
    assert!(!memory.collection_exists(&ns()));
}

// =============================================================================
// Drop
// =============================================================================

/// Dropping a collection removes it.
#[test]
fn test_drop_collection() {
    let (memory, storage, ctx) = setup();
    storage
        .create_collection(&ctx, &ns(), &CollectionOptions::default())
        .unwrap();
    storage.drop_collection(&ctx, &ns()).unwrap();
    assert!(!memory.collection_exists(&ns()));
}

/// Dropping in a missing database succeeds and creates nothing.
#[test]
fn test_drop_in_missing_database() {
    let (memory, storage, ctx) = setup();
    storage.drop_collection(&ctx, &ns()).unwrap();
    assert!(!memory.database_exists(ns().db()));
}

/// Dropping a missing collection in an existing database succeeds.
#[test]
fn test_drop_missing_collection() {
    let (memory, storage, ctx) = setup();
    storage
        .create_collection(&ctx, &ns(), &CollectionOptions::default())
        .unwrap();
    let other = ns().sibling("other");
    storage.drop_collection(&ctx, &other).unwrap();
    storage.drop_collection(&ctx, &other).unwrap();
    assert!(memory.collection_exists(&ns()));
}

/// Concurrent drops of the same collection all succeed.
#[test]
fn test_concurrent_drops() {
    let (memory, storage, ctx) = setup();
    for round in 0..20 {
        storage
            .create_collection(&ctx, &ns(), &CollectionOptions::default())
            .unwrap();
        thread::scope(|s| {
            for worker in 0..4 {
                let storage = &storage;
                s.spawn(move || {
                    let ctx = storage.make_operation_context(format!("dropper-{}-{}", round, worker));
                    storage.drop_collection(&ctx, &ns()).unwrap();
                });
            }
        });
        assert!(!memory.collection_exists(&ns()));
    }
}

// =============================================================================
// Count and Size
// =============================================================================

/// Count and size on a missing database name the database.
#[test]
fn test_count_and_size_missing_database() {
    let (_, storage, ctx) = setup();
    let err = storage.get_collection_count(&ctx, &ns()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NamespaceNotFound);
    assert_eq!(err.message(), "Database test not found");

    let err = storage.get_collection_size(&ctx, &ns()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NamespaceNotFound);
}

/// Count and size on a missing collection name the collection.
#[test]
fn test_count_and_size_missing_collection() {
    let (_, storage, ctx) = setup();
    storage
        .create_collection(&ctx, &ns(), &CollectionOptions::default())
        .unwrap();
    let other = ns().sibling("other");
    let err = storage.get_collection_count(&ctx, &other).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NamespaceNotFound);
    assert_eq!(err.message(), "Collection test.other not found");

    let err = storage.get_collection_size(&ctx, &other).unwrap_err();
    assert_eq!(err.message(), "Collection test.other not found");
}

/// Count is exact and size grows with content.
#[test]
fn test_count_and_size_track_inserts() {
    let (_, storage, ctx) = setup();
    storage
        .create_collection(&ctx, &ns(), &CollectionOptions::default())
        .unwrap();
    storage
        .insert_documents(
            &ctx,
            &ns(),
            (0..10).map(|i| doc(json!({"_id": i, "payload": "x"}))).collect(),
        )
        .unwrap();
    assert_eq!(storage.get_collection_count(&ctx, &ns()).unwrap(), 10);
    let size = storage.get_collection_size(&ctx, &ns()).unwrap();
    assert!(size > 0);

    storage
        .insert_document(&ctx, &ns(), doc(json!({"_id": 10, "payload": "a longer payload"})))
        .unwrap();
    assert!(storage.get_collection_size(&ctx, &ns()).unwrap() > size);
}
