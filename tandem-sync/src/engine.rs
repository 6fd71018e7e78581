//! Initial convergence and steady-state propagation.
//!
//! The engine owns no state beyond its two store handles. Every step re-reads
//! the changed entry from its source (a queued notification may be stale),
//! diffs it against the destination's current state, and skips the write
//! entirely when the diff is empty. That is what breaks the echo cycle: a
//! local write propagates to the remote store, the remote feed reports it
//! back, and the second local write degenerates into a no-op that produces
//! no further notification.

use crate::adapter::RecordAdapter;
use crate::batch::{LocalChangeBatch, RemoteChangeBatch, Snapshot};
use crate::config::{ExistencePolicy, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::index::{IdentityIndex, Lookup};
use std::collections::BTreeSet;
use std::sync::Arc;
use tandem_store::{LocalStore, RemoteStore, RemoteTransaction, StoreError};
use tandem_types::{Identity, LocalRecord, MappingError, RemoteDocument};
use tracing::{debug, info, warn};

/// Summary of one initial convergence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    /// Local records inserted as new remote documents.
    pub documents_inserted: usize,
    /// Remote documents removed for having no local record.
    pub documents_removed: usize,
    /// Matched documents that received at least one field write.
    pub documents_updated: usize,
    /// Field-level set/remove operations across all updated documents.
    pub field_writes: usize,
    /// Remote documents materialized locally (`ExistencePolicy::Union` only).
    pub records_created: usize,
}

impl ConvergenceReport {
    /// Whether the stores were already converged.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Summary of one propagated batch.
///
/// Failures are scoped to the record or document that caused them and are
/// collected here; the rest of the batch is still processed.
#[derive(Debug, Clone, Default)]
pub struct PropagationReport {
    /// Writes staged against the local store.
    pub local_writes: usize,
    /// Writes issued against the remote store.
    pub remote_writes: usize,
    /// Writes skipped because the destination already matched.
    pub skipped: usize,
    /// Per-event failures.
    pub errors: Vec<SyncError>,
}

impl PropagationReport {
    /// Total writes on both sides.
    pub fn writes(&self) -> usize {
        self.local_writes + self.remote_writes
    }

    /// Whether every event in the batch propagated without error.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record_error(&mut self, err: SyncError) {
        warn!("sync step failed: {}", err);
        self.errors.push(err);
    }
}

/// Keeps a local store and a remote collection consistent.
pub struct ReconciliationEngine {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    adapter: RecordAdapter,
    config: SyncConfig,
}

impl ReconciliationEngine {
    /// Creates an engine over the two stores.
    pub fn new(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self {
            local,
            remote,
            adapter: RecordAdapter::new(config.primary_key.clone()),
            config,
        }
    }

    /// Collection name, primary key and existence policy in use.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Field mapping between local records and remote documents.
    pub fn adapter(&self) -> &RecordAdapter {
        &self.adapter
    }

    /// The local store handle.
    pub fn local(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }

    /// The remote collection handle.
    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Reads both stores.
    pub fn snapshot(&self) -> SyncResult<Snapshot> {
        Ok(Snapshot {
            records: self
                .local
                .query_all(&self.config.primary_key)
                .map_err(SyncError::local)?,
            documents: self.remote.find_all().map_err(SyncError::remote)?,
        })
    }

    // ── Initial convergence ──────────────────────────────────────

    /// Brings the remote collection in line with the local store.
    ///
    /// The remote read and every remote write happen inside one atomic
    /// remote transaction; any failure aborts it and nothing is applied.
    pub fn converge(&self) -> SyncResult<ConvergenceReport> {
        let primary_key = &self.config.primary_key;
        let records = self.local.query_all(primary_key).map_err(SyncError::local)?;
        let index = IdentityIndex::strict(records, primary_key)?;
        let policy = self.config.existence_policy;

        let mut report = ConvergenceReport::default();
        let mut adopted: Vec<RemoteDocument> = Vec::new();
        let mut failure: Option<SyncError> = None;

        let result = self.remote.write(&mut |txn: &mut dyn RemoteTransaction| {
            report = ConvergenceReport::default();
            adopted.clear();
            match self.converge_in(txn, &index, policy, &mut report, &mut adopted) {
                Ok(()) => Ok(()),
                Err(err) => {
                    let abort = StoreError::Invalid(format!("convergence aborted: {err}"));
                    failure = Some(err);
                    Err(abort)
                }
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }
        result.map_err(SyncError::remote)?;

        if !adopted.is_empty() {
            report.records_created = self.adopt_documents(&adopted)?;
        }

        info!(
            collection = %self.config.collection,
            inserted = report.documents_inserted,
            removed = report.documents_removed,
            updated = report.documents_updated,
            created = report.records_created,
            "initial convergence complete"
        );
        Ok(report)
    }

    fn converge_in(
        &self,
        txn: &mut dyn RemoteTransaction,
        index: &IdentityIndex,
        policy: ExistencePolicy,
        report: &mut ConvergenceReport,
        adopted: &mut Vec<RemoteDocument>,
    ) -> SyncResult<()> {
        let documents = txn.find_all().map_err(SyncError::remote)?;
        let remote_ids: BTreeSet<&Identity> = documents.iter().map(|d| d.id()).collect();

        // 1. Documents with no local record.
        for doc in documents.iter().filter(|d| !index.contains(d.id())) {
            match policy {
                ExistencePolicy::LocalWins => {
                    debug!(id = %doc.id(), "removing unmatched remote document");
                    txn.remove(doc.id()).map_err(SyncError::remote)?;
                    report.documents_removed += 1;
                }
                ExistencePolicy::Union => adopted.push(doc.clone()),
            }
        }

        // 2. Records with no remote document.
        for (identity, record) in index.iter().filter(|(id, _)| !remote_ids.contains(id)) {
            debug!(id = %identity, "inserting unmatched local record");
            txn.insert(self.adapter.to_remote_document(record)?)
                .map_err(SyncError::remote)?;
            report.documents_inserted += 1;
        }

        // 3. Matched pairs: field-level diff, local to remote.
        for doc in &documents {
            let Lookup::Found(record) = index.lookup(doc.id()) else {
                continue;
            };
            let diff = self.adapter.local_to_remote_diff(record, doc);
            if diff.is_empty() {
                continue;
            }
            debug!(id = %doc.id(), fields = diff.len(), "updating matched remote document");
            txn.update(doc.id(), &diff).map_err(SyncError::remote)?;
            report.documents_updated += 1;
            report.field_writes += diff.len();
        }
        Ok(())
    }

    fn adopt_documents(&self, documents: &[RemoteDocument]) -> SyncResult<usize> {
        for doc in documents {
            debug!(id = %doc.id(), "creating local record from unmatched remote document");
            if let Err(err) = self.local.create(self.adapter.to_local_fields(doc)) {
                self.local.rollback();
                return Err(SyncError::local(err));
            }
        }
        if let Err(err) = self.local.save() {
            self.local.rollback();
            return Err(SyncError::local(err));
        }
        Ok(documents.len())
    }

    // ── Local → remote ───────────────────────────────────────────

    /// Propagates one local commit to the remote collection.
    ///
    /// Records are re-read before diffing; the batch only says which records
    /// changed. A record deleted since the commit is skipped, its deletion
    /// arrives in a later batch. Deletions run first, and a deletion whose
    /// identity is still carried by a live record (a record replaced under
    /// the same key) leaves the document for that record's upsert.
    pub fn apply_local_changes(&self, batch: &LocalChangeBatch) -> PropagationReport {
        let mut report = PropagationReport::default();
        if !batch.deleted.is_empty() {
            match self.live_identities() {
                Ok(live) => {
                    for record in &batch.deleted {
                        if let Err(err) = self.push_deletion(record, &live, &mut report) {
                            report.record_error(err);
                        }
                    }
                }
                Err(err) => report.record_error(err),
            }
        }
        for record in batch.inserted.iter().chain(&batch.updated) {
            if let Err(err) = self.push_record(record, &mut report) {
                report.record_error(err);
            }
        }
        debug!(
            collection = %self.config.collection,
            remote_writes = report.remote_writes,
            skipped = report.skipped,
            "applied local batch"
        );
        report
    }

    fn push_record(&self, changed: &LocalRecord, report: &mut PropagationReport) -> SyncResult<()> {
        match self.local.get(changed.id).map_err(SyncError::local)? {
            Some(record) => self.upsert_document(&record, report),
            None => {
                report.skipped += 1;
                Ok(())
            }
        }
    }

    /// Inserts the record's document if missing, otherwise diffs against the
    /// current document and writes only changed fields.
    fn upsert_document(&self, record: &LocalRecord, report: &mut PropagationReport) -> SyncResult<()> {
        let identity = self.adapter.identity(record)?;
        let current = self.remote.find_by_id(&identity).map_err(SyncError::remote)?;
        let Some(document) = current else {
            match self.remote.insert(self.adapter.to_remote_document(record)?) {
                Ok(()) => {
                    debug!(id = %identity, "inserted remote document");
                    report.remote_writes += 1;
                    return Ok(());
                }
                // A peer inserted the same identity since our read.
                Err(StoreError::Conflict(_)) => {
                    debug!(id = %identity, "insert raced with remote insertion; updating instead");
                    return self.push_update(&identity, record, report);
                }
                Err(err) => return Err(SyncError::remote(err)),
            }
        };
        self.push_diff(&identity, record, &document, report)
    }

    fn push_update(
        &self,
        identity: &Identity,
        record: &LocalRecord,
        report: &mut PropagationReport,
    ) -> SyncResult<()> {
        match self.remote.find_by_id(identity).map_err(SyncError::remote)? {
            Some(document) => self.push_diff(identity, record, &document, report),
            None => Err(SyncError::remote(StoreError::NotFound(identity.to_string()))),
        }
    }

    fn push_diff(
        &self,
        identity: &Identity,
        record: &LocalRecord,
        document: &RemoteDocument,
        report: &mut PropagationReport,
    ) -> SyncResult<()> {
        let diff = self.adapter.local_to_remote_diff(record, document);
        if diff.is_empty() {
            report.skipped += 1;
            return Ok(());
        }
        let found = self.remote.update(identity, &diff).map_err(SyncError::remote)?;
        if found {
            debug!(id = %identity, fields = diff.len(), "updated remote document");
            report.remote_writes += 1;
        } else {
            // Removed concurrently; the feed will deliver the deletion.
            debug!(id = %identity, "remote document vanished before update");
            report.skipped += 1;
        }
        Ok(())
    }

    /// Identities of the records currently in the local store. Unmappable
    /// records are left out; their own upserts report them.
    fn live_identities(&self) -> SyncResult<IdentityIndex> {
        let records = self
            .local
            .query_all(&self.config.primary_key)
            .map_err(SyncError::local)?;
        Ok(IdentityIndex::lenient(records, &self.config.primary_key).0)
    }

    fn push_deletion(
        &self,
        record: &LocalRecord,
        live: &IdentityIndex,
        report: &mut PropagationReport,
    ) -> SyncResult<()> {
        let identity = self.adapter.identity(record)?;
        if live.contains(&identity) {
            debug!(id = %identity, record = %record.id, "identity still held locally; keeping remote document");
            report.skipped += 1;
            return Ok(());
        }
        if self.remote.remove(&identity).map_err(SyncError::remote)? {
            debug!(id = %identity, "removed remote document");
            report.remote_writes += 1;
        } else {
            report.skipped += 1;
        }
        Ok(())
    }

    // ── Remote → local ───────────────────────────────────────────

    /// Applies one remote feed batch to the local store and saves it as one
    /// unit.
    ///
    /// Feed delivery may be delayed or duplicated, so each document is
    /// re-read from the remote store and every write is an upsert against
    /// the current local record. A document removed since the notification
    /// is skipped, as is a deletion whose document has reappeared.
    pub fn apply_remote_changes(&self, batch: &RemoteChangeBatch) -> PropagationReport {
        let mut report = PropagationReport::default();
        let records = match self.local.query_all(&self.config.primary_key) {
            Ok(records) => records,
            Err(err) => {
                report.record_error(SyncError::local(err));
                return report;
            }
        };
        let (mut index, mapping_errors) = IdentityIndex::lenient(records, &self.config.primary_key);
        for err in mapping_errors {
            report.record_error(err.into());
        }

        for doc in batch.inserted.iter().chain(&batch.updated) {
            if let Err(err) = self.pull_document(doc, &mut index, &mut report) {
                report.record_error(err);
            }
        }
        for doc in &batch.deleted {
            if let Err(err) = self.pull_deletion(doc, &mut index, &mut report) {
                report.record_error(err);
            }
        }

        if self.local.has_changes() {
            if let Err(err) = self.local.save() {
                self.local.rollback();
                report.local_writes = 0;
                report.record_error(SyncError::local(err));
            }
        }
        debug!(
            collection = %self.config.collection,
            local_writes = report.local_writes,
            skipped = report.skipped,
            "applied remote batch"
        );
        report
    }

    fn pull_document(
        &self,
        notified: &RemoteDocument,
        index: &mut IdentityIndex,
        report: &mut PropagationReport,
    ) -> SyncResult<()> {
        match self.remote.find_by_id(notified.id()).map_err(SyncError::remote)? {
            Some(doc) => self.upsert_record(&doc, index, report),
            None => {
                report.skipped += 1;
                Ok(())
            }
        }
    }

    fn upsert_record(
        &self,
        doc: &RemoteDocument,
        index: &mut IdentityIndex,
        report: &mut PropagationReport,
    ) -> SyncResult<()> {
        match index.lookup(doc.id()) {
            Lookup::Found(record) => {
                let diff = self.adapter.remote_to_local_diff(doc, record);
                if diff.is_empty() {
                    report.skipped += 1;
                    return Ok(());
                }
                let record_id = record.id;
                self.local.update(record_id, &diff).map_err(SyncError::local)?;
                index.apply(doc.id(), &diff);
                debug!(id = %doc.id(), record = %record_id, fields = diff.len(), "updated local record");
                report.local_writes += 1;
            }
            Lookup::Missing => {
                let fields = self.adapter.to_local_fields(doc);
                let record_id = self.local.create(fields.clone()).map_err(SyncError::local)?;
                index.insert(doc.id().clone(), LocalRecord::new(record_id, fields));
                debug!(id = %doc.id(), record = %record_id, "created local record");
                report.local_writes += 1;
            }
            Lookup::Ambiguous => {
                return Err(MappingError::DuplicateIdentity(doc.id().clone()).into());
            }
        }
        Ok(())
    }

    fn pull_deletion(
        &self,
        doc: &RemoteDocument,
        index: &mut IdentityIndex,
        report: &mut PropagationReport,
    ) -> SyncResult<()> {
        if self.remote.find_by_id(doc.id()).map_err(SyncError::remote)?.is_some() {
            report.skipped += 1;
            return Ok(());
        }
        match index.lookup(doc.id()) {
            Lookup::Found(record) => {
                let record_id = record.id;
                self.local.delete(record_id).map_err(SyncError::local)?;
                index.remove(doc.id());
                debug!(id = %doc.id(), record = %record_id, "deleted local record");
                report.local_writes += 1;
            }
            Lookup::Missing => report.skipped += 1,
            Lookup::Ambiguous => {
                return Err(MappingError::DuplicateIdentity(doc.id().clone()).into());
            }
        }
        Ok(())
    }
}

