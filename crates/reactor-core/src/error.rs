//! Common error types for backend synchronization

use thiserror::Error;

/// Result type for backend operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while talking to the game-state backend
#[derive(Debug, Error)]
pub enum SyncError {
    /// The backend state changed between our read and our write.
    /// The caller must discard its local copy and re-poll.
    #[error("backend state was modified concurrently")]
    ConcurrentModification,

    /// Request-level failure (connection refused, HTTP error status, ...)
    #[error("backend request failed: {0}")]
    Request(String),

    /// The backend returned a document we could not decode
    #[error("invalid state document: {0}")]
    InvalidState(String),

    /// Filesystem error (mock backend state files)
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
