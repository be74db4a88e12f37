//! Replication storage configuration
//!
//! Supplied once at construction and immutable afterwards. Nothing here is
//! process-global except the log level, which is applied to the logger
//! when the storage interface is built.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{StorageError, StorageResult};
use crate::observability::Severity;
use crate::types::Namespace;

/// Default home of the replication metadata document
pub const DEFAULT_MIN_VALID_NAMESPACE: &str = "local.replset.minvalid";

/// Default oplog capped size (192 MiB)
pub const DEFAULT_OPLOG_SIZE_BYTES: u64 = 192 * 1024 * 1024;

/// Whether metadata writes wait for the engine to make them durable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Return as soon as the write is applied
    #[default]
    None,
    /// Block on the engine's durability wait after every metadata write
    WaitUntilDurable,
}

/// Configuration for the storage interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationStorageConfig {
    /// Namespace holding the replication metadata document
    pub min_valid_namespace: Namespace,

    /// Capped size used when creating an oplog
    pub oplog_size_bytes: u64,

    /// Durability of metadata writes
    pub durability: Durability,

    /// Minimum severity written by the logger
    pub log_level: Severity,
}

impl Default for ReplicationStorageConfig {
    fn default() -> Self {
        Self {
            min_valid_namespace: default_min_valid_namespace(),
            oplog_size_bytes: DEFAULT_OPLOG_SIZE_BYTES,
            durability: Durability::None,
            log_level: Severity::Info,
        }
    }
}

/// Parsed form of `DEFAULT_MIN_VALID_NAMESPACE`
pub fn default_min_valid_namespace() -> Namespace {
    Namespace::new("local", "replset.minvalid")
}

impl ReplicationStorageConfig {
    /// Default configuration with the metadata document in `ns`
    pub fn with_min_valid_namespace(ns: Namespace) -> Self {
        Self {
            min_valid_namespace: ns,
            ..Self::default()
        }
    }

    /// Load from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> StorageResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StorageError::bad_value(format!("invalid storage config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            StorageError::bad_value(format!("cannot read storage config: {}", e))
                .with_details(format!("path: {}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> StorageResult<()> {
        if self.min_valid_namespace.db().is_empty() || self.min_valid_namespace.coll().is_empty() {
            return Err(StorageError::bad_value(
                "min_valid_namespace must name a database and a collection",
            ));
        }
        if self.oplog_size_bytes == 0 {
            return Err(StorageError::bad_value("oplog_size_bytes must be positive"));
        }
        Ok(())
    }
}
