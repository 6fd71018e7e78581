//! Remote live-query feed.

use crate::batch::RemoteChangeBatch;
use crate::error::{SyncError, SyncResult};
use tandem_store::{RemoteStore, Subscription};
use tracing::trace;

/// Resolves each feed notification's indices into a [`RemoteChangeBatch`].
///
/// Notifications that resolve to no documents are dropped.
pub struct RemoteChangeFeed {
    subscription: Box<dyn Subscription>,
}

impl RemoteChangeFeed {
    pub fn register<F>(remote: &dyn RemoteStore, deliver: F) -> SyncResult<Self>
    where
        F: Fn(RemoteChangeBatch) + Send + Sync + 'static,
    {
        let subscription = remote
            .subscribe(Box::new(move |event| {
                let batch = RemoteChangeBatch::from_event(event);
                if batch.is_empty() {
                    return;
                }
                trace!(
                    documents = event.documents.len(),
                    inserted = batch.inserted.len(),
                    updated = batch.updated.len(),
                    deleted = batch.deleted.len(),
                    "remote change observed"
                );
                deliver(batch);
            }))
            .map_err(SyncError::remote)?;
        Ok(Self { subscription })
    }

    /// Cancels the subscription. Idempotent.
    pub fn stop(&mut self) {
        self.subscription.stop();
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }
}
