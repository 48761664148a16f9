//! Storage error handling
//!
//! Provides typed errors for record store operations with descriptive
//! messages and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// The database has not been opened yet (or failed to open)
    #[error("Record store is not available yet; the write was rejected")]
    Unavailable,

    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stored value could not be encoded or decoded
    #[error("Invalid stored {kind} '{id}': {source}")]
    InvalidRecord {
        kind: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The index document could not be encoded
    #[error("Failed to encode {kind} index: {source}")]
    IndexEncode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StorageError {
    /// Create an error from an I/O error raised while preparing `path`
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            _ => StorageError::CreateDirectory {
                path,
                source: error,
            },
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::Unavailable => {
                Some("Wait for the store to finish opening and retry the write.")
            }
            StorageError::PermissionDenied { .. } => {
                Some("Check file and directory permissions. You may need to run with different permissions or change ownership.")
            }
            StorageError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            _ => None,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_classification() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::from_io(io_err, PathBuf::from("/test/path"));

        assert!(matches!(err, StorageError::PermissionDenied { .. }));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_other_io_is_create_directory() {
        let io_err = io::Error::new(io::ErrorKind::Other, "read-only file system");
        let err = StorageError::from_io(io_err, PathBuf::from("/ro/data"));

        assert!(matches!(err, StorageError::CreateDirectory { .. }));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_unavailable_display() {
        let err = StorageError::Unavailable;
        assert!(err.to_string().contains("not available"));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_invalid_record_display() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = StorageError::InvalidRecord {
            kind: "entry",
            id: "abc".to_string(),
            source,
        };

        let msg = err.to_string();
        assert!(msg.contains("entry"));
        assert!(msg.contains("abc"));
    }
}
