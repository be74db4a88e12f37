//! Namespace: the (database, collection) pair a document lives in

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{StorageError, StorageResult};

/// Database reserved for node-local, never-replicated collections
pub const LOCAL_DB: &str = "local";

/// Collection-name prefix reserved for oplogs inside the local database
pub const OPLOG_PREFIX: &str = "oplog.";

/// A fully qualified collection name, `db.collection`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace {
    db: String,
    coll: String,
}

impl Namespace {
    /// Build from separate database and collection names
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }

    /// Parse `db.collection`. The collection part may itself contain dots.
    pub fn parse(full: &str) -> StorageResult<Self> {
        match full.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Self::new(db, coll)),
            _ => Err(StorageError::bad_value(format!(
                "invalid namespace '{}': expected <db>.<collection>",
                full
            ))),
        }
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    pub fn coll(&self) -> &str {
        &self.coll
    }

    /// Whether this namespace is reserved for an oplog and must be capped
    pub fn is_oplog(&self) -> bool {
        self.db == LOCAL_DB && self.coll.starts_with(OPLOG_PREFIX)
    }

    /// Sibling collection in the same database
    pub fn sibling(&self, coll: impl Into<String>) -> Self {
        Self::new(self.db.clone(), coll)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.coll)
    }
}

impl FromStr for Namespace {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Namespace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Namespace::parse(&s).map_err(|e| serde::de::Error::custom(e.message().to_string()))
    }
}
