//! Error types for journal core operations.
//!
//! Library-level failures are expressed as a `thiserror` enum so callers can
//! tell caller mistakes (bad queries, reading past the end) apart from I/O
//! trouble in one of the backing stores. Collaborator traits such as
//! [`ObjectStore`](crate::store::ObjectStore) return `anyhow::Result`; those
//! errors are folded into the variants below at the seam.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using JournalError
pub type Result<T> = std::result::Result<T, JournalError>;

/// Core error types for journal operations.
#[derive(Error, Debug)]
pub enum JournalError {
    // === Query Errors ===
    /// The query cannot be routed or translated
    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// A read was attempted outside of the result set
    #[error("position {position} is out of range (length {length})")]
    PositionOutOfRange { position: usize, length: usize },

    // === Result Set Lifecycle Errors ===
    /// `find` was called on a scanning backend before `setup()`
    #[error("result set has not been set up")]
    NotSetUp,

    /// The result set was stopped and can no longer be read
    #[error("result set already stopped")]
    Stopped,

    // === Object Store Errors ===
    /// No object store connection was provided to the journal context
    #[error("object store is not available")]
    ObjectStoreUnavailable,

    /// A call into the object store failed
    #[error("object store error: {operation} failed: {reason}")]
    ObjectStore { operation: String, reason: String },

    // === Remote Share Errors ===
    /// No remote share client was provided, or the share cannot be written
    #[error("remote share {host} is not available")]
    RemoteShareUnavailable { host: String },

    /// Fetching metadata from a remote share failed
    #[error("remote share {host} failed: {reason}")]
    RemoteShare { host: String, reason: String },

    // === Filesystem Errors ===
    /// A sidecar metadata file could not be parsed
    #[error("corrupt metadata at {path}: {reason}")]
    CorruptMetadata { path: PathBuf, reason: String },

    /// The entry's file does not exist
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Entries without a file cannot be copied to removable devices
    #[error("entries without a file cannot be copied to removable devices")]
    NoFile,

    /// An entry with this name is already present
    #[error("entry already present with the name {name}")]
    AlreadyExists { name: String },

    // === Configuration Errors ===
    /// Configuration file parsing or validation failed
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl JournalError {
    /// Returns true if this error was caused by the caller rather than a backend
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            JournalError::InvalidQuery { .. }
                | JournalError::PositionOutOfRange { .. }
                | JournalError::NotSetUp
                | JournalError::Stopped
        )
    }

    /// Returns true if retrying the same operation later might succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            JournalError::Io(_)
                | JournalError::ObjectStore { .. }
                | JournalError::RemoteShare { .. }
        )
    }

    /// Create an invalid query error
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        JournalError::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// Wrap a failed object store call
    pub fn object_store(operation: impl Into<String>, err: anyhow::Error) -> Self {
        JournalError::ObjectStore {
            operation: operation.into(),
            reason: format!("{:#}", err),
        }
    }

    /// Wrap a failed remote share fetch
    pub fn remote_share(host: impl Into<String>, err: anyhow::Error) -> Self {
        JournalError::RemoteShare {
            host: host.into(),
            reason: format!("{:#}", err),
        }
    }

    /// Create a serialization error
    pub fn serialization(reason: impl Into<String>) -> Self {
        JournalError::Serialization(reason.into())
    }
}

impl From<serde_json::Error> for JournalError {
    fn from(err: serde_json::Error) -> Self {
        JournalError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_errors() {
        assert!(JournalError::invalid_query("no mount point").is_caller_error());
        assert!(JournalError::NotSetUp.is_caller_error());
        assert!(JournalError::PositionOutOfRange {
            position: 3,
            length: 2
        }
        .is_caller_error());

        let err = JournalError::object_store("find", anyhow::anyhow!("bus closed"));
        assert!(!err.is_caller_error());
        assert!(err.is_transient());
    }

    #[test]
    fn test_remote_share_error() {
        let err = JournalError::remote_share(
            "10.0.0.7",
            anyhow::anyhow!("refused").context("connecting"),
        );
        assert!(err.is_transient());
        assert!(!err.is_caller_error());
        assert_eq!(err.to_string(), "remote share 10.0.0.7 failed: connecting: refused");
        assert!(!JournalError::NoFile.is_transient());
    }

    #[test]
    fn test_object_store_message() {
        let err = JournalError::object_store("delete", anyhow::anyhow!("no such object"));
        assert_eq!(
            err.to_string(),
            "object store error: delete failed: no such object"
        );
    }
}
