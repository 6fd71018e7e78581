//! Shared test helpers for sync tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tandem_store::{
    FeedHandler, LocalChangeHandler, LocalStore, MemoryLocalStore, MemoryRemoteStore,
    RemoteStore, RemoteTransaction, StoreError, StoreResult, Subscription, WriteBlock,
};
use tandem_sync::{ReconciliationEngine, SyncConfig};
use tandem_types::{FieldDiff, FieldMap, Identity, LocalRecord, RecordId, RemoteDocument};

/// Builds a field map from a JSON object literal.
pub fn fields(value: serde_json::Value) -> FieldMap {
    FieldMap::from_json(value).unwrap()
}

/// Builds a remote document from a JSON object literal carrying `_id`.
pub fn doc(value: serde_json::Value) -> RemoteDocument {
    RemoteDocument::from_fields(fields(value)).unwrap()
}

/// Installs a test subscriber once. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn make_engine(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteStore>) -> ReconciliationEngine {
    ReconciliationEngine::new(local, remote, SyncConfig::default())
}

/// Records in the local store, sorted by `id`, as bare field maps.
pub fn local_fields(local: &MemoryLocalStore) -> Vec<FieldMap> {
    local
        .query_all("id")
        .unwrap()
        .into_iter()
        .map(|r| r.fields)
        .collect()
}

/// Looks a local record up by its `id` field.
pub fn local_record(local: &MemoryLocalStore, id: &str) -> Option<LocalRecord> {
    local
        .query_all("id")
        .unwrap()
        .into_iter()
        .find(|r| r.fields.get("id") == Some(&id.into()))
}

/// Seeds the remote store outside any session.
pub fn seed_remote(remote: &dyn RemoteStore, docs: Vec<RemoteDocument>) {
    for d in docs {
        remote.insert(d).unwrap();
    }
}

/// Seeds the local store with one committed save.
pub fn seed_local(local: &MemoryLocalStore, records: Vec<FieldMap>) -> Vec<RecordId> {
    let ids = records
        .into_iter()
        .map(|f| local.create(f).unwrap())
        .collect();
    local.save().unwrap();
    ids
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Gives in-flight dispatcher work time to drain.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

// ── Fault-injecting remote store ─────────────────────────────────

#[derive(Default)]
struct RemoteFaults {
    poisoned: Mutex<BTreeSet<Identity>>,
    fail_writes: AtomicBool,
    stale_reads: AtomicUsize,
}

/// Wraps a [`MemoryRemoteStore`] and injects failures on demand.
///
/// Clones share both the collection and the fault settings.
#[derive(Clone)]
pub struct FaultyRemote {
    inner: MemoryRemoteStore,
    faults: Arc<RemoteFaults>,
}

impl FaultyRemote {
    pub fn new(inner: MemoryRemoteStore) -> Self {
        Self {
            inner,
            faults: Arc::new(RemoteFaults::default()),
        }
    }

    pub fn inner(&self) -> &MemoryRemoteStore {
        &self.inner
    }

    /// Inserts and updates of `id` fail inside any transaction.
    pub fn poison(&self, id: impl Into<Identity>) {
        self.faults.poisoned.lock().insert(id.into());
    }

    pub fn clear_poison(&self) {
        self.faults.poisoned.lock().clear();
    }

    /// Every write fails before its block runs.
    pub fn fail_writes(&self, on: bool) {
        self.faults.fail_writes.store(on, Ordering::SeqCst);
    }

    /// The next `n` calls to `find_by_id` report the document as missing.
    pub fn stale_reads(&self, n: usize) {
        self.faults.stale_reads.store(n, Ordering::SeqCst);
    }
}

struct GuardedTxn<'a> {
    inner: &'a mut dyn RemoteTransaction,
    poisoned: &'a BTreeSet<Identity>,
}

impl GuardedTxn<'_> {
    fn check(&self, id: &Identity) -> StoreResult<()> {
        if self.poisoned.contains(id) {
            return Err(StoreError::Backend(format!("injected failure for {id}")));
        }
        Ok(())
    }
}

impl RemoteTransaction for GuardedTxn<'_> {
    fn find_all(&self) -> StoreResult<Vec<RemoteDocument>> {
        self.inner.find_all()
    }

    fn find_by_id(&self, id: &Identity) -> StoreResult<Option<RemoteDocument>> {
        self.inner.find_by_id(id)
    }

    fn insert(&mut self, document: RemoteDocument) -> StoreResult<()> {
        self.check(document.id())?;
        self.inner.insert(document)
    }

    fn update(&mut self, id: &Identity, diff: &FieldDiff) -> StoreResult<bool> {
        self.check(id)?;
        self.inner.update(id, diff)
    }

    fn remove(&mut self, id: &Identity) -> StoreResult<bool> {
        self.inner.remove(id)
    }
}

impl RemoteStore for FaultyRemote {
    fn write(&self, block: &mut WriteBlock<'_>) -> StoreResult<()> {
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        let poisoned = self.faults.poisoned.lock().clone();
        self.inner.write(&mut |txn: &mut dyn RemoteTransaction| {
            block(&mut GuardedTxn {
                inner: txn,
                poisoned: &poisoned,
            })
        })
    }

    fn find_all(&self) -> StoreResult<Vec<RemoteDocument>> {
        self.inner.find_all()
    }

    fn find_by_id(&self, id: &Identity) -> StoreResult<Option<RemoteDocument>> {
        let stale = self
            .faults
            .stale_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.find_by_id(id)
    }

    fn subscribe(&self, handler: Box<FeedHandler>) -> StoreResult<Box<dyn Subscription>> {
        self.inner.subscribe(handler)
    }
}

// ── Fault-injecting local store ──────────────────────────────────

#[derive(Default)]
struct LocalFaults {
    fail_save: AtomicBool,
    fail_observe: AtomicBool,
}

/// Wraps a [`MemoryLocalStore`] and injects failures on demand.
#[derive(Clone)]
pub struct FaultyLocal {
    inner: MemoryLocalStore,
    faults: Arc<LocalFaults>,
}

impl FaultyLocal {
    pub fn new(inner: MemoryLocalStore) -> Self {
        Self {
            inner,
            faults: Arc::new(LocalFaults::default()),
        }
    }

    pub fn fail_save(&self, on: bool) {
        self.faults.fail_save.store(on, Ordering::SeqCst);
    }

    pub fn fail_observe(&self, on: bool) {
        self.faults.fail_observe.store(on, Ordering::SeqCst);
    }
}

impl LocalStore for FaultyLocal {
    fn query_all(&self, sort_by: &str) -> StoreResult<Vec<LocalRecord>> {
        self.inner.query_all(sort_by)
    }

    fn get(&self, id: RecordId) -> StoreResult<Option<LocalRecord>> {
        self.inner.get(id)
    }

    fn create(&self, fields: FieldMap) -> StoreResult<RecordId> {
        self.inner.create(fields)
    }

    fn update(&self, id: RecordId, diff: &FieldDiff) -> StoreResult<()> {
        self.inner.update(id, diff)
    }

    fn delete(&self, id: RecordId) -> StoreResult<()> {
        self.inner.delete(id)
    }

    fn has_changes(&self) -> bool {
        self.inner.has_changes()
    }

    fn save(&self) -> StoreResult<()> {
        if self.faults.fail_save.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected save failure".into()));
        }
        self.inner.save()
    }

    fn rollback(&self) {
        self.inner.rollback()
    }

    fn observe(&self, handler: Box<LocalChangeHandler>) -> StoreResult<Box<dyn Subscription>> {
        if self.faults.fail_observe.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        self.inner.observe(handler)
    }
}
