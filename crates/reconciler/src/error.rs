//! Error types for the reconciler crate.

use thiserror::Error;

use crate::object::{ObjectKey, ObjectKind};

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by an [`ObjectStore`](crate::store::ObjectStore).
///
/// `NotFound` never escapes a read (reads return `None`); it only appears when
/// an update targets an object that has disappeared.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: ObjectKind, key: ObjectKey },

    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: ObjectKind, key: ObjectKey },

    #[error("conflict writing {kind} '{key}': {reason}")]
    Conflict {
        kind: ObjectKind,
        key: ObjectKey,
        reason: String,
    },

    #[error("store unavailable: {reason}")]
    Transient { reason: String },

    #[error("store rejected {kind} '{key}': {reason}")]
    Invalid {
        kind: ObjectKind,
        key: ObjectKey,
        reason: String,
    },
}

impl StoreError {
    /// Create a not found error.
    pub fn not_found(kind: ObjectKind, key: ObjectKey) -> Self {
        Self::NotFound { kind, key }
    }

    /// Create an already exists error.
    pub fn already_exists(kind: ObjectKind, key: ObjectKey) -> Self {
        Self::AlreadyExists { kind, key }
    }

    /// Create a conflict error.
    pub fn conflict(kind: ObjectKind, key: ObjectKey, reason: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            key,
            reason: reason.into(),
        }
    }

    /// Create a transient error.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Create an invalid object error.
    pub fn invalid(kind: ObjectKind, key: ObjectKey, reason: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            key,
            reason: reason.into(),
        }
    }
}

/// Reconciler error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A store call failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The MediaServer cannot be materialized as declared.
    #[error("invalid MediaServer '{key}': {reason}")]
    InvalidDocument { key: ObjectKey, reason: String },

    /// An object lacks metadata the operator relies on.
    #[error("{kind} is missing {field}")]
    MissingMetadata {
        kind: ObjectKind,
        field: &'static str,
    },

    /// The store answered a lookup with an object of another kind.
    #[error("expected {expected} but store returned {found}")]
    KindMismatch {
        expected: ObjectKind,
        found: ObjectKind,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create an invalid document error.
    pub fn invalid_document(key: ObjectKey, reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            key,
            reason: reason.into(),
        }
    }

    /// Create a missing metadata error.
    pub const fn missing_metadata(kind: ObjectKind, field: &'static str) -> Self {
        Self::MissingMetadata { kind, field }
    }

    /// Create a kind mismatch error.
    pub const fn kind_mismatch(expected: ObjectKind, found: ObjectKind) -> Self {
        Self::KindMismatch { expected, found }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::conflict(
            ObjectKind::DaemonSet,
            ObjectKey::new("ns", "cam1-streamer"),
            "resourceVersion mismatch",
        );
        assert!(err.to_string().contains("DaemonSet"));
        assert!(err.to_string().contains("ns/cam1-streamer"));
        assert!(err.to_string().contains("resourceVersion mismatch"));
    }

    #[test]
    fn test_store_error_converts() {
        let err: Error = StoreError::transient("connection reset").into();
        assert!(matches!(err, Error::Store(StoreError::Transient { .. })));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_invalid_document_display() {
        let err = Error::invalid_document(ObjectKey::new("ns", "cam1"), "duplicate volume 'media'");
        assert!(err.to_string().contains("ns/cam1"));
        assert!(err.to_string().contains("media"));
    }
}
