//! Sync errors

use thiserror::Error;

use crate::remote::RemoteError;
use crate::storage::StorageError;

/// Errors that abort a sync run or a remote fetch
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Local store error: {0}")]
    Storage(#[from] StorageError),

    /// A record body was requested that was never downloaded, while offline
    #[error("Content is not available offline")]
    Offline,
}

/// Result type for sync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Whether retrying once connectivity returns may succeed
    pub fn is_connectivity(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_connectivity(),
            SyncError::Offline => true,
            SyncError::Storage(_) => false,
        }
    }
}
