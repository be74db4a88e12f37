//! Error types for the replication storage core
//!
//! Every failure is returned as a `StorageError` carrying a specific
//! `ErrorCode` plus a human-readable reason. Only `WriteConflict` is
//! transient: the retry combinator absorbs it, everything else propagates.
//!
//! Numeric codes match the values replication tooling already understands.

use std::fmt;

use thiserror::Error;

/// Severity levels for storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, caller continues
    Error,
    /// Data can no longer be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Error codes surfaced by the storage core and the engine beneath it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Target database or collection does not exist
    NamespaceNotFound,
    /// Collection already exists
    NamespaceExists,
    /// Named index does not exist on the collection
    IndexNotFound,
    /// Index options make it unusable for the request (partial index)
    IndexOptionsConflict,
    /// A start key was given where none is allowed
    NoSuchKey,
    /// Request options are inconsistent
    InvalidOptions,
    /// Engine rejected a document
    InternalError,
    /// Iteration exhausted
    CollectionIsEmpty,
    /// Target cannot absorb a multi-document batch atomically
    OperationCannotBeBatched,
    /// Transient conflict with a concurrent writer
    WriteConflict,
    /// Unique index already holds the key
    DuplicateKey,
    /// Operation was killed
    Interrupted,
    /// Operation deadline passed
    ExceededTimeLimit,
    /// Stored record failed checksum verification
    DataCorruption,
    /// Invalid argument or configuration value
    BadValue,
    /// Engine-specific rejection identified only by number
    EngineSpecific(i32),
}

impl ErrorCode {
    /// Returns the stable string name of this code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::NamespaceNotFound => "NamespaceNotFound",
            ErrorCode::NamespaceExists => "NamespaceExists",
            ErrorCode::IndexNotFound => "IndexNotFound",
            ErrorCode::IndexOptionsConflict => "IndexOptionsConflict",
            ErrorCode::NoSuchKey => "NoSuchKey",
            ErrorCode::InvalidOptions => "InvalidOptions",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::CollectionIsEmpty => "CollectionIsEmpty",
            ErrorCode::OperationCannotBeBatched => "OperationCannotBeBatched",
            ErrorCode::WriteConflict => "WriteConflict",
            ErrorCode::DuplicateKey => "DuplicateKey",
            ErrorCode::Interrupted => "Interrupted",
            ErrorCode::ExceededTimeLimit => "ExceededTimeLimit",
            ErrorCode::DataCorruption => "DataCorruption",
            ErrorCode::BadValue => "BadValue",
            ErrorCode::EngineSpecific(_) => "Location",
        }
    }

    /// Returns the numeric code
    pub fn number(&self) -> i32 {
        match self {
            ErrorCode::InternalError => 1,
            ErrorCode::BadValue => 2,
            ErrorCode::NoSuchKey => 4,
            ErrorCode::Interrupted => 11601,
            ErrorCode::NamespaceNotFound => 26,
            ErrorCode::IndexNotFound => 27,
            ErrorCode::NamespaceExists => 48,
            ErrorCode::ExceededTimeLimit => 50,
            ErrorCode::InvalidOptions => 72,
            ErrorCode::IndexOptionsConflict => 85,
            ErrorCode::CollectionIsEmpty => 91,
            ErrorCode::WriteConflict => 112,
            ErrorCode::OperationCannotBeBatched => 127,
            ErrorCode::DataCorruption => 12,
            ErrorCode::DuplicateKey => 11000,
            ErrorCode::EngineSpecific(n) => *n,
        }
    }

    /// Returns the severity level for this code
    pub fn severity(&self) -> Severity {
        match self {
            ErrorCode::DataCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::EngineSpecific(n) => write!(f, "Location{}", n),
            other => write!(f, "{}", other.code()),
        }
    }
}

/// Storage error with code, reason and optional context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{severity}] {code}: {message}{}", details_suffix(.details))]
pub struct StorageError {
    code: ErrorCode,
    severity: Severity,
    message: String,
    details: Option<String>,
}

fn details_suffix(details: &Option<String>) -> String {
    match details {
        Some(d) => format!(" ({})", d),
        None => String::new(),
    }
}

impl StorageError {
    /// Create an error with the given code and reason
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach context to the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn namespace_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NamespaceNotFound, message)
    }

    pub fn namespace_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NamespaceExists, message)
    }

    pub fn index_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IndexNotFound, message)
    }

    pub fn index_options_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IndexOptionsConflict, message)
    }

    pub fn no_such_key(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NoSuchKey, message)
    }

    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidOptions, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn collection_is_empty(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CollectionIsEmpty, message)
    }

    pub fn cannot_be_batched(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OperationCannotBeBatched, message)
    }

    pub fn write_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::WriteConflict, message)
    }

    pub fn duplicate_key(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DuplicateKey, message)
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Interrupted, message)
    }

    pub fn exceeded_time_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExceededTimeLimit, message)
    }

    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DataCorruption, message)
    }

    pub fn bad_value(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadValue, message)
    }

    /// Engine rejection identified only by its numeric location code
    pub fn engine(number: i32, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EngineSpecific(number), message)
    }

    /// Returns the error code
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the human-readable reason
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Whether the retry combinator should absorb this error
    pub fn is_write_conflict(&self) -> bool {
        self.code == ErrorCode::WriteConflict
    }

    /// Whether the error came from cancellation of the calling context
    pub fn is_interruption(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::Interrupted | ErrorCode::ExceededTimeLimit
        )
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_codes() {
        assert_eq!(ErrorCode::NamespaceNotFound.number(), 26);
        assert_eq!(ErrorCode::NamespaceExists.number(), 48);
        assert_eq!(ErrorCode::IndexNotFound.number(), 27);
        assert_eq!(ErrorCode::EngineSpecific(28838).number(), 28838);
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(StorageError::data_corruption("checksum mismatch").is_fatal());
        assert!(!StorageError::internal("bad document").is_fatal());
        assert!(!StorageError::write_conflict("conflict").is_fatal());
    }

    #[test]
    fn test_write_conflict_classification() {
        assert!(StorageError::write_conflict("retry me").is_write_conflict());
        assert!(!StorageError::cannot_be_batched("capped").is_write_conflict());
        assert!(StorageError::interrupted("killed").is_interruption());
    }

    #[test]
    fn test_display_contains_code_and_reason() {
        let err = StorageError::namespace_not_found("Collection local.x not found")
            .with_details("op: count");
        let display = err.to_string();
        assert!(display.starts_with("[ERROR] NamespaceNotFound"));
        assert!(display.contains("Collection local.x not found"));
        assert!(display.ends_with("(op: count)"));
    }

    #[test]
    fn test_engine_specific_display() {
        let err = StorageError::engine(28838, "cannot create a non-capped oplog collection");
        assert_eq!(err.code(), ErrorCode::EngineSpecific(28838));
        assert!(err.to_string().contains("Location28838"));
    }
}
