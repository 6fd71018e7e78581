//! Error types for the store layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Record or document not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An insert collided with an existing identity.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The write was rejected before touching storage.
    #[error("invalid write: {0}")]
    Invalid(String),

    /// Failure reported by the backing store.
    #[error("backend error: {0}")]
    Backend(String),

    /// The store has been closed.
    #[error("store closed")]
    Closed,
}
