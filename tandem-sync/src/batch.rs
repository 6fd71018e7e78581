//! Change batches flowing into the engine, and the snapshot flowing out.

use serde::{Deserialize, Serialize};
use tandem_store::{FeedEvent, LocalChangeSet};
use tandem_types::{LocalRecord, RemoteDocument};
use tracing::warn;

/// One local commit: inserted, updated and deleted records.
pub type LocalChangeBatch = LocalChangeSet;

/// One remote feed notification, resolved from indices to documents.
///
/// `deleted` holds the documents as they were before removal, so their
/// identity is still known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteChangeBatch {
    pub inserted: Vec<RemoteDocument>,
    pub updated: Vec<RemoteDocument>,
    pub deleted: Vec<RemoteDocument>,
}

impl RemoteChangeBatch {
    /// Resolves a feed event's indices. Out-of-range indices are skipped.
    pub fn from_event(event: &FeedEvent) -> Self {
        let pick = |docs: &[RemoteDocument], indices: &[usize], kind: &str| {
            indices
                .iter()
                .filter_map(|&idx| {
                    let doc = docs.get(idx);
                    if doc.is_none() {
                        warn!(index = idx, kind, len = docs.len(), "feed index out of range");
                    }
                    doc.cloned()
                })
                .collect::<Vec<_>>()
        };
        Self {
            inserted: pick(&event.documents, &event.insertions, "insertion"),
            updated: pick(&event.documents, &event.updates, "update"),
            deleted: pick(&event.old_documents, &event.deletions, "deletion"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of changed documents.
    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }
}

/// Both stores as observed at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub records: Vec<LocalRecord>,
    pub documents: Vec<RemoteDocument>,
}

/// Work item for a session's dispatcher.
#[derive(Debug, Clone)]
pub(crate) enum SessionEvent {
    Local(LocalChangeBatch),
    Remote(RemoteChangeBatch),
}
