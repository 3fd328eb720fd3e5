//! Error types for catalog operations

use std::time::Duration;
use thiserror::Error;

/// Validation errors. Raised before any remote write is attempted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid image URL format: {url}")]
    InvalidImageUrl { url: String },

    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Failures reported by the backing tree store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Write rejected: {reason}")]
    WriteRejected { reason: String },

    #[error("Read failed at {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Could not decode value at {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("Failed to generate key under {path}")]
    KeyGenerationFailed { path: String },

    #[error("Tag source request failed: {reason}")]
    TagSource { reason: String },
}

/// Local cache errors. These never reach the caller of a mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache entry {key} holds {found}, expected {expected}")]
    ShapeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Cache entry {key} failed validation: {source}")]
    Invalid {
        key: String,
        #[source]
        source: ValidationError,
    },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Durable persistence errors. Logged and swallowed by the persister.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistError {
    #[error("Failed to open durable store: {reason}")]
    Open { reason: String },

    #[error("Durable store I/O failed: {reason}")]
    Io { reason: String },

    #[error("Snapshot serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Durable operation {operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("Background worker unavailable: {reason}")]
    WorkerUnavailable { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for catalog operations.
#[derive(Debug, Clone, Error)]
pub enum PrintsError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl PrintsError {
    /// True for errors raised before the network was touched.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for catalog operations.
pub type PrintsResult<T> = Result<T, PrintsError>;
