//! In-memory replicated document collection.

use crate::error::{StoreError, StoreResult};
use crate::remote::{FeedEvent, FeedHandler, RemoteStore, RemoteTransaction, WriteBlock};
use crate::subscription::{HandlerRegistry, Subscription};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tandem_types::{FieldDiff, Identity, RemoteDocument, ID_FIELD};
use tracing::debug;

#[derive(Default)]
struct RemoteState {
    documents: BTreeMap<Identity, RemoteDocument>,
    write_count: u64,
    field_write_count: u64,
}

struct Shared {
    state: Mutex<RemoteState>,
    delivery: Mutex<()>,
    subscribers: Arc<HandlerRegistry<FeedEvent>>,
}

/// A [`RemoteStore`] held entirely in memory.
///
/// Clones share the same collection, so several sessions bound to clones
/// of one store behave like replicas of one replicated collection.
#[derive(Clone)]
pub struct MemoryRemoteStore {
    shared: Arc<Shared>,
}

/// Scratch copy a write block operates on.
struct MemoryTransaction {
    documents: BTreeMap<Identity, RemoteDocument>,
    operations: u64,
    field_writes: u64,
}

impl RemoteTransaction for MemoryTransaction {
    fn find_all(&self) -> StoreResult<Vec<RemoteDocument>> {
        Ok(self.documents.values().cloned().collect())
    }

    fn find_by_id(&self, id: &Identity) -> StoreResult<Option<RemoteDocument>> {
        Ok(self.documents.get(id).cloned())
    }

    fn insert(&mut self, document: RemoteDocument) -> StoreResult<()> {
        if self.documents.contains_key(document.id()) {
            return Err(StoreError::Conflict(format!(
                "document {} already exists",
                document.id()
            )));
        }
        self.operations += 1;
        self.documents.insert(document.id().clone(), document);
        Ok(())
    }

    fn update(&mut self, id: &Identity, diff: &FieldDiff) -> StoreResult<bool> {
        if diff.sets().any(|(f, _)| f == ID_FIELD) || diff.removals().any(|f| f == ID_FIELD) {
            return Err(StoreError::Invalid(format!("cannot modify `{ID_FIELD}`")));
        }
        let Some(document) = self.documents.get_mut(id) else {
            return Ok(false);
        };
        let mut body = document.body();
        diff.apply_to(&mut body);
        document.set_body(body);
        self.operations += 1;
        self.field_writes += diff.len() as u64;
        Ok(true)
    }

    fn remove(&mut self, id: &Identity) -> StoreResult<bool> {
        if self.documents.remove(id).is_some() {
            self.operations += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

impl MemoryRemoteStore {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RemoteState::default()),
                delivery: Mutex::new(()),
                subscribers: HandlerRegistry::new(),
            }),
        }
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.shared.state.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of committed writes that performed at least one operation.
    pub fn write_count(&self) -> u64 {
        self.shared.state.lock().write_count
    }

    /// Number of field-level set/remove operations applied by updates.
    pub fn field_write_count(&self) -> u64 {
        self.shared.state.lock().field_write_count
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn write(&self, block: &mut WriteBlock<'_>) -> StoreResult<()> {
        // Delivery before state: a subscriber mid-emission may read the store.
        let _delivery = self.shared.delivery.lock();
        let mut state = self.shared.state.lock();
        let mut txn = MemoryTransaction {
            documents: state.documents.clone(),
            operations: 0,
            field_writes: 0,
        };
        block(&mut txn)?;
        if txn.operations == 0 {
            return Ok(());
        }

        let event = FeedEvent::between(&state.documents, &txn.documents);
        state.documents = txn.documents;
        state.write_count += 1;
        state.field_write_count += txn.field_writes;
        debug!(
            operations = txn.operations,
            inserted = event.insertions.len(),
            updated = event.updates.len(),
            deleted = event.deletions.len(),
            "remote write committed"
        );
        if event.is_empty() {
            return Ok(());
        }

        drop(state);
        self.shared.subscribers.emit(&event);
        Ok(())
    }

    fn find_all(&self) -> StoreResult<Vec<RemoteDocument>> {
        Ok(self.shared.state.lock().documents.values().cloned().collect())
    }

    fn find_by_id(&self, id: &Identity) -> StoreResult<Option<RemoteDocument>> {
        Ok(self.shared.state.lock().documents.get(id).cloned())
    }

    fn subscribe(&self, handler: Box<FeedHandler>) -> StoreResult<Box<dyn Subscription>> {
        Ok(Box::new(self.shared.subscribers.register(handler)))
    }
}
