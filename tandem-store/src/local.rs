//! Local store interface.
//!
//! The local store is synchronous and transactional: mutations are staged in
//! a working context and become visible to observers only on [`LocalStore::save`].

use crate::error::StoreResult;
use crate::subscription::Subscription;
use serde::{Deserialize, Serialize};
use tandem_types::{FieldDiff, FieldMap, LocalRecord, RecordId};

/// Records committed by one save, grouped by change kind.
///
/// Deleted records carry their last committed fields so their identity can
/// still be read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalChangeSet {
    pub inserted: Vec<LocalRecord>,
    pub updated: Vec<LocalRecord>,
    pub deleted: Vec<LocalRecord>,
}

impl LocalChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of changed records.
    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }
}

/// Handler invoked once per committed save.
pub type LocalChangeHandler = dyn Fn(&LocalChangeSet) + Send + Sync;

/// A synchronous, single-writer keyed object store.
pub trait LocalStore: Send + Sync {
    /// Returns every record in the working context, ordered ascending by
    /// the `sort_by` field (records without it first).
    fn query_all(&self, sort_by: &str) -> StoreResult<Vec<LocalRecord>>;

    /// Returns one record from the working context.
    fn get(&self, id: RecordId) -> StoreResult<Option<LocalRecord>>;

    /// Stages a new record.
    fn create(&self, fields: FieldMap) -> StoreResult<RecordId>;

    /// Stages a field-level change to an existing record.
    fn update(&self, id: RecordId, diff: &FieldDiff) -> StoreResult<()>;

    /// Stages a deletion.
    fn delete(&self, id: RecordId) -> StoreResult<()>;

    /// Whether anything is staged.
    fn has_changes(&self) -> bool;

    /// Commits everything staged as one unit and notifies observers.
    ///
    /// Saving with nothing staged commits nothing and notifies nobody.
    fn save(&self) -> StoreResult<()>;

    /// Discards everything staged.
    fn rollback(&self);

    /// Registers a handler fired once per committed save.
    fn observe(&self, handler: Box<LocalChangeHandler>) -> StoreResult<Box<dyn Subscription>>;
}
