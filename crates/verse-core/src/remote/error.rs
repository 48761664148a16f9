//! Remote store errors

use thiserror::Error;

/// Errors raised by a [`RemoteStore`](super::RemoteStore)
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The store could not be reached (offline, DNS, refused connection)
    #[error("Remote store is unreachable: {0}")]
    Unreachable(String),

    /// The store answered with an error status
    #[error("Remote store returned {status}: {message}")]
    Status { status: u16, message: String },

    /// A document could not be encoded or decoded
    #[error("Invalid remote document '{id}': {reason}")]
    InvalidDocument { id: String, reason: String },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A live subscription ended
    #[error("Change feed closed")]
    FeedClosed,

    /// Required connection settings are missing
    #[error("Remote store is not configured: missing {0}")]
    NotConfigured(&'static str),
}

/// Result type for remote operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

impl RemoteError {
    /// Whether the failure is a connectivity problem worth retrying later
    pub fn is_connectivity(&self) -> bool {
        match self {
            RemoteError::Unreachable(_) | RemoteError::FeedClosed => true,
            RemoteError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            RemoteError::Status { status, .. } => matches!(status, 408 | 429 | 502 | 503 | 504),
            RemoteError::InvalidDocument { .. } | RemoteError::NotConfigured(_) => false,
        }
    }
}
