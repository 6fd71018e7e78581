//! Remote store interface.
//!
//! The remote store is a replicated document collection. Writes run as
//! atomic transaction blocks; subscribers receive the full ordered document
//! list after each committed change together with index-based change info.

use crate::error::StoreResult;
use crate::subscription::Subscription;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tandem_types::{FieldDiff, Identity, RemoteDocument};

/// One live-query notification.
///
/// `insertions` and `updates` index into `documents`; `deletions` index into
/// `old_documents`. Both lists are ordered ascending by identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedEvent {
    pub documents: Vec<RemoteDocument>,
    pub insertions: Vec<usize>,
    pub updates: Vec<usize>,
    pub deletions: Vec<usize>,
    pub old_documents: Vec<RemoteDocument>,
}

impl FeedEvent {
    /// Computes the change info between two states of a collection.
    pub fn between(
        old: &BTreeMap<Identity, RemoteDocument>,
        new: &BTreeMap<Identity, RemoteDocument>,
    ) -> Self {
        let old_documents: Vec<RemoteDocument> = old.values().cloned().collect();
        let documents: Vec<RemoteDocument> = new.values().cloned().collect();

        let mut insertions = Vec::new();
        let mut updates = Vec::new();
        for (idx, doc) in documents.iter().enumerate() {
            match old.get(doc.id()) {
                None => insertions.push(idx),
                Some(prev) if prev.fields() != doc.fields() => updates.push(idx),
                Some(_) => {}
            }
        }
        let deletions = old_documents
            .iter()
            .enumerate()
            .filter(|(_, doc)| !new.contains_key(doc.id()))
            .map(|(idx, _)| idx)
            .collect();

        Self {
            documents,
            insertions,
            updates,
            deletions,
            old_documents,
        }
    }

    /// Whether the event carries no change.
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.updates.is_empty() && self.deletions.is_empty()
    }
}

/// Handler invoked for every committed change to the collection.
pub type FeedHandler = dyn Fn(&FeedEvent) + Send + Sync;

/// Operations available inside one atomic remote write.
pub trait RemoteTransaction {
    fn find_all(&self) -> StoreResult<Vec<RemoteDocument>>;

    fn find_by_id(&self, id: &Identity) -> StoreResult<Option<RemoteDocument>>;

    /// Inserts a new document. Fails with `Conflict` if the identity exists.
    fn insert(&mut self, document: RemoteDocument) -> StoreResult<()>;

    /// Applies a field diff. Returns false if the document does not exist.
    fn update(&mut self, id: &Identity, diff: &FieldDiff) -> StoreResult<bool>;

    /// Removes a document. Returns false if it did not exist.
    fn remove(&mut self, id: &Identity) -> StoreResult<bool>;
}

/// Block executed inside [`RemoteStore::write`].
pub type WriteBlock<'a> = dyn FnMut(&mut dyn RemoteTransaction) -> StoreResult<()> + 'a;

/// A replicated document collection.
pub trait RemoteStore: Send + Sync {
    /// Runs `block` atomically. If it returns an error nothing is applied.
    ///
    /// The block must not call back into the same store.
    fn write(&self, block: &mut WriteBlock<'_>) -> StoreResult<()>;

    /// All documents, ordered ascending by identity.
    fn find_all(&self) -> StoreResult<Vec<RemoteDocument>>;

    fn find_by_id(&self, id: &Identity) -> StoreResult<Option<RemoteDocument>>;

    /// Registers a live-query handler.
    fn subscribe(&self, handler: Box<FeedHandler>) -> StoreResult<Box<dyn Subscription>>;

    /// Inserts one document as its own write.
    fn insert(&self, document: RemoteDocument) -> StoreResult<()> {
        let mut pending = Some(document);
        self.write(&mut |txn: &mut dyn RemoteTransaction| match pending.take() {
            Some(doc) => txn.insert(doc),
            None => Ok(()),
        })
    }

    /// Updates one document as its own write.
    fn update(&self, id: &Identity, diff: &FieldDiff) -> StoreResult<bool> {
        let mut found = false;
        self.write(&mut |txn: &mut dyn RemoteTransaction| {
            found = txn.update(id, diff)?;
            Ok(())
        })?;
        Ok(found)
    }

    /// Removes one document as its own write.
    fn remove(&self, id: &Identity) -> StoreResult<bool> {
        let mut found = false;
        self.write(&mut |txn: &mut dyn RemoteTransaction| {
            found = txn.remove(id)?;
            Ok(())
        })?;
        Ok(found)
    }
}
