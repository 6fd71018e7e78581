//! Error types for the sync layer.

use crate::session::SyncStatus;
use tandem_store::StoreError;
use tandem_types::MappingError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Query or save against the local store failed.
    #[error("local store error: {0}")]
    LocalStore(#[source] StoreError),

    /// Insert, update, remove or transaction against the remote store failed.
    #[error("remote store error: {0}")]
    RemoteStore(#[source] StoreError),

    /// A record or document has a missing, unsupported or duplicate identity.
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Invalid session state transition.
    #[error("cannot {action} a session that is {from}")]
    Lifecycle {
        from: SyncStatus,
        action: &'static str,
    },

    /// No async runtime was available, or a blocking task failed.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl SyncError {
    pub(crate) fn local(err: StoreError) -> Self {
        Self::LocalStore(err)
    }

    pub(crate) fn remote(err: StoreError) -> Self {
        Self::RemoteStore(err)
    }
}
