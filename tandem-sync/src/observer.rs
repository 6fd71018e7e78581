//! Local change observation.

use crate::batch::LocalChangeBatch;
use crate::error::{SyncError, SyncResult};
use tandem_store::{LocalStore, Subscription};
use tracing::trace;

/// Delivers each committed local save as one [`LocalChangeBatch`].
///
/// Empty commits are filtered out. Delivery happens on the thread that
/// called `save()`, so `deliver` should hand the batch off rather than
/// process it inline.
pub struct LocalChangeObserver {
    subscription: Box<dyn Subscription>,
}

impl LocalChangeObserver {
    pub fn register<F>(local: &dyn LocalStore, deliver: F) -> SyncResult<Self>
    where
        F: Fn(LocalChangeBatch) + Send + Sync + 'static,
    {
        let subscription = local
            .observe(Box::new(move |changes| {
                if changes.is_empty() {
                    return;
                }
                trace!(
                    inserted = changes.inserted.len(),
                    updated = changes.updated.len(),
                    deleted = changes.deleted.len(),
                    "local commit observed"
                );
                deliver(changes.clone());
            }))
            .map_err(SyncError::local)?;
        Ok(Self { subscription })
    }

    /// Cancels the observation. Idempotent.
    pub fn stop(&mut self) {
        self.subscription.stop();
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }
}
