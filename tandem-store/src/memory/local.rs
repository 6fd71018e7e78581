//! In-memory local store.

use crate::error::{StoreError, StoreResult};
use crate::local::{LocalChangeHandler, LocalChangeSet, LocalStore};
use crate::subscription::{HandlerRegistry, Subscription};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tandem_types::{FieldDiff, FieldMap, FieldValue, LocalRecord, RecordId};
use tracing::debug;

#[derive(Default)]
struct LocalState {
    next_id: u64,
    committed: BTreeMap<RecordId, FieldMap>,
    working: BTreeMap<RecordId, FieldMap>,
    inserted: BTreeSet<RecordId>,
    updated: BTreeSet<RecordId>,
    deleted: BTreeMap<RecordId, FieldMap>,
    commit_count: u64,
}

impl LocalState {
    fn is_dirty(&self) -> bool {
        !self.inserted.is_empty() || !self.updated.is_empty() || !self.deleted.is_empty()
    }

    fn clear_staged(&mut self) {
        self.inserted.clear();
        self.updated.clear();
        self.deleted.clear();
    }
}

struct Shared {
    state: Mutex<LocalState>,
    delivery: Mutex<()>,
    observers: Arc<HandlerRegistry<LocalChangeSet>>,
}

/// A [`LocalStore`] held entirely in memory.
///
/// Clones share the same store.
#[derive(Clone)]
pub struct MemoryLocalStore {
    shared: Arc<Shared>,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LocalState::default()),
                delivery: Mutex::new(()),
                observers: HandlerRegistry::new(),
            }),
        }
    }

    /// Creates a record and saves immediately.
    pub fn insert(&self, fields: FieldMap) -> StoreResult<RecordId> {
        let id = self.create(fields)?;
        self.save()?;
        Ok(id)
    }

    /// Number of records in the working context.
    pub fn len(&self) -> usize {
        self.shared.state.lock().working.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of saves that committed at least one change.
    pub fn commit_count(&self) -> u64 {
        self.shared.state.lock().commit_count
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.shared.observers.len()
    }
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for MemoryLocalStore {
    fn query_all(&self, sort_by: &str) -> StoreResult<Vec<LocalRecord>> {
        let state = self.shared.state.lock();
        let mut records: Vec<LocalRecord> = state
            .working
            .iter()
            .map(|(id, fields)| LocalRecord::new(*id, fields.clone()))
            .collect();
        records.sort_by(|a, b| {
            let ka = a.fields.get(sort_by).unwrap_or(&FieldValue::Null);
            let kb = b.fields.get(sort_by).unwrap_or(&FieldValue::Null);
            ka.total_cmp(kb).then(a.id.cmp(&b.id))
        });
        Ok(records)
    }

    fn get(&self, id: RecordId) -> StoreResult<Option<LocalRecord>> {
        let state = self.shared.state.lock();
        Ok(state
            .working
            .get(&id)
            .map(|fields| LocalRecord::new(id, fields.clone())))
    }

    fn create(&self, fields: FieldMap) -> StoreResult<RecordId> {
        let mut state = self.shared.state.lock();
        state.next_id += 1;
        let id = RecordId::new(state.next_id);
        state.working.insert(id, fields);
        state.inserted.insert(id);
        Ok(id)
    }

    fn update(&self, id: RecordId, diff: &FieldDiff) -> StoreResult<()> {
        let mut state = self.shared.state.lock();
        let fields = state
            .working
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        diff.apply_to(fields);
        if !state.inserted.contains(&id) {
            state.updated.insert(id);
        }
        Ok(())
    }

    fn delete(&self, id: RecordId) -> StoreResult<()> {
        let mut state = self.shared.state.lock();
        let fields = state
            .working
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if !state.inserted.remove(&id) {
            state.updated.remove(&id);
            let last = state.committed.get(&id).cloned().unwrap_or(fields);
            state.deleted.insert(id, last);
        }
        Ok(())
    }

    fn has_changes(&self) -> bool {
        self.shared.state.lock().is_dirty()
    }

    fn save(&self) -> StoreResult<()> {
        // Delivery before state: a handler mid-emission may read the store.
        let _delivery = self.shared.delivery.lock();
        let mut state = self.shared.state.lock();
        if !state.is_dirty() {
            return Ok(());
        }

        let record = |id: &RecordId, fields: &FieldMap| LocalRecord::new(*id, fields.clone());
        let changes = LocalChangeSet {
            inserted: state
                .inserted
                .iter()
                .filter_map(|id| state.working.get(id).map(|f| record(id, f)))
                .collect(),
            updated: state
                .updated
                .iter()
                .filter_map(|id| {
                    let fields = state.working.get(id)?;
                    // A record edited back to its committed value is not a change.
                    (state.committed.get(id) != Some(fields)).then(|| record(id, fields))
                })
                .collect(),
            deleted: state.deleted.iter().map(|(id, f)| record(id, f)).collect(),
        };

        state.committed = state.working.clone();
        state.clear_staged();
        if changes.is_empty() {
            return Ok(());
        }
        state.commit_count += 1;
        debug!(
            inserted = changes.inserted.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            "local save committed"
        );

        drop(state);
        self.shared.observers.emit(&changes);
        Ok(())
    }

    fn rollback(&self) {
        let mut state = self.shared.state.lock();
        state.working = state.committed.clone();
        state.clear_staged();
    }

    fn observe(&self, handler: Box<LocalChangeHandler>) -> StoreResult<Box<dyn Subscription>> {
        Ok(Box::new(self.shared.observers.register(handler)))
    }
}
