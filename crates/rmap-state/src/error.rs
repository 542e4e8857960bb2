//! Error types for rmap-state

use thiserror::Error;

/// Errors that can occur while connecting to the persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the collaborator traits in [`crate::storage_traits`].
///
/// Callers in the resolver downgrade every variant to a miss; the variants
/// exist so the miss can be logged with a reason and so `Unauthorized` and
/// `QuotaExceeded` can steer resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The caller is not allowed to read the requested record (HTTP 401/403).
    #[error("not authorized to read {pid}")]
    Unauthorized { pid: String },

    /// The key/value store refused a write because it is full.
    #[error("storage quota exceeded while writing {key}")]
    QuotaExceeded { key: String },

    /// Transport-level failure talking to a remote service.
    #[error("network error: {0}")]
    Network(String),

    /// A remote document could not be parsed.
    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    /// Remote service answered with an unexpected HTTP status.
    #[error("unexpected status {status} for {pid}")]
    Status { pid: String, status: u16 },

    /// Backend-specific failure (database, file system, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}
