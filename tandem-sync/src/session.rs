//! Session lifecycle.
//!
//! A [`SyncSession`] composes the engine with both listeners:
//!
//! ```text
//!   local save ──► LocalChangeObserver ──┐
//!                                         ├─► channel ─► dispatcher ─► engine step
//!   remote write ─► RemoteChangeFeed ─────┘                  (one at a time)
//! ```
//!
//! Listeners only enqueue. A single dispatcher task drains the queue and
//! runs each step on the blocking pool while holding the session's
//! lifecycle lock; `stop()` takes the same lock, so it waits for the step
//! in flight and no step can start after it returns.

use crate::batch::{SessionEvent, Snapshot};
use crate::config::SyncConfig;
use crate::engine::ReconciliationEngine;
use crate::error::{SyncError, SyncResult};
use crate::feed::RemoteChangeFeed;
use crate::observer::LocalChangeObserver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tandem_store::{LocalStore, RemoteStore};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    NotStarted,
    Syncing,
    /// Terminal.
    Stopped,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Syncing => write!(f, "syncing"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Callback receiving the latest snapshot after each reconciliation step.
pub type SnapshotCallback = dyn Fn(&Snapshot) + Send + Sync;

/// Callback receiving errors from steady-state propagation.
pub type ErrorCallback = dyn Fn(&SyncError) + Send + Sync;

/// Owns the listener subscriptions and dispatcher of one running session.
///
/// Dropping the token stops it.
pub struct SyncToken {
    observer: LocalChangeObserver,
    feed: RemoteChangeFeed,
    dispatcher: Option<JoinHandle<()>>,
}

impl SyncToken {
    /// Cancels both subscriptions and the dispatcher. Idempotent.
    pub fn stop(&mut self) {
        self.observer.stop();
        self.feed.stop();
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.observer.is_active() || self.feed.is_active() || self.dispatcher.is_some()
    }
}

impl Drop for SyncToken {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Default)]
struct Callbacks {
    on_snapshot: Option<Arc<SnapshotCallback>>,
    on_error: Option<Arc<ErrorCallback>>,
}

/// Held for every lifecycle transition and engine step.
///
/// Status and callbacks sit behind their own short-lived locks so a callback
/// running under this one can still read them.
struct Lifecycle {
    token: Option<SyncToken>,
}

struct SessionInner {
    engine: ReconciliationEngine,
    lifecycle: Mutex<Lifecycle>,
    status: Mutex<SyncStatus>,
    callbacks: Mutex<Callbacks>,
}

impl SessionInner {
    fn start_blocking(self: &Arc<Self>, runtime: &Handle) -> SyncResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        let status = self.status();
        if status != SyncStatus::NotStarted {
            return Err(SyncError::Lifecycle {
                from: status,
                action: "start",
            });
        }

        // Listeners first, so nothing committed during convergence is missed.
        let (tx, rx) = mpsc::unbounded_channel();
        let local_tx = tx.clone();
        let observer = LocalChangeObserver::register(self.engine.local().as_ref(), move |batch| {
            let _ = local_tx.send(SessionEvent::Local(batch));
        })?;
        let feed = RemoteChangeFeed::register(self.engine.remote().as_ref(), move |batch| {
            let _ = tx.send(SessionEvent::Remote(batch));
        })?;

        let report = self.engine.converge()?;
        debug!(?report, "session converged");

        let dispatcher = runtime.spawn(dispatch(Arc::downgrade(self), rx));
        lifecycle.token = Some(SyncToken {
            observer,
            feed,
            dispatcher: Some(dispatcher),
        });
        *self.status.lock() = SyncStatus::Syncing;
        info!(collection = %self.engine.config().collection, "sync session started");

        self.notify_snapshot();
        Ok(())
    }

    fn status(&self) -> SyncStatus {
        *self.status.lock()
    }

    fn process(&self, event: SessionEvent) {
        let _lifecycle = self.lifecycle.lock();
        if self.status() != SyncStatus::Syncing {
            return;
        }
        let report = match &event {
            SessionEvent::Local(batch) => self.engine.apply_local_changes(batch),
            SessionEvent::Remote(batch) => self.engine.apply_remote_changes(batch),
        };
        for err in &report.errors {
            self.notify_error(err);
        }
        self.notify_snapshot();
    }

    fn notify_snapshot(&self) {
        let Some(callback) = self.callbacks.lock().on_snapshot.clone() else {
            return;
        };
        match self.engine.snapshot() {
            Ok(snapshot) => callback(&snapshot),
            Err(err) => self.notify_error(&err),
        }
    }

    fn notify_error(&self, err: &SyncError) {
        let callback = self.callbacks.lock().on_error.clone();
        if let Some(callback) = callback {
            callback(err);
        }
    }

    fn shutdown(&self, lifecycle: &mut Lifecycle) {
        *self.status.lock() = SyncStatus::Stopped;
        if let Some(mut token) = lifecycle.token.take() {
            token.stop();
        }
        info!(collection = %self.engine.config().collection, "sync session stopped");
    }
}

async fn dispatch(session: Weak<SessionInner>, mut rx: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        if let Err(err) = tokio::task::spawn_blocking(move || inner.process(event)).await {
            warn!("sync step panicked: {}", err);
        }
    }
    debug!("session dispatcher exited");
}

/// Bidirectional sync between one local store and one remote collection.
///
/// ```ignore
/// let session = SyncSession::new(local, remote, SyncConfig::default())
///     .with_snapshot_callback(|snapshot| render(snapshot));
/// session.start().await?;
/// // ...
/// session.stop()?;
/// ```
///
/// Callbacks run inside the session's serialized context. They may call
/// [`SyncSession::status`], [`SyncSession::snapshot`] and
/// [`SyncSession::engine`], but must not call [`SyncSession::stop`] or
/// [`SyncSession::start`] on the same session: both wait for the step that
/// is invoking the callback.
pub struct SyncSession {
    inner: Arc<SessionInner>,
}

impl SyncSession {
    pub fn new(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                engine: ReconciliationEngine::new(local, remote, config),
                lifecycle: Mutex::new(Lifecycle { token: None }),
                status: Mutex::new(SyncStatus::NotStarted),
                callbacks: Mutex::new(Callbacks::default()),
            }),
        }
    }

    /// Invokes `callback` with the latest snapshot after initial convergence
    /// and after every processed batch.
    pub fn with_snapshot_callback<F>(self, callback: F) -> Self
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.inner.callbacks.lock().on_snapshot = Some(Arc::new(callback));
        self
    }

    /// Invokes `callback` for each per-event propagation failure.
    pub fn with_error_callback<F>(self, callback: F) -> Self
    where
        F: Fn(&SyncError) + Send + Sync + 'static,
    {
        self.inner.callbacks.lock().on_error = Some(Arc::new(callback));
        self
    }

    /// Constructs a session and starts it.
    pub async fn bind<F>(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
        on_snapshot: F,
    ) -> SyncResult<Self>
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let session = Self::new(local, remote, config).with_snapshot_callback(on_snapshot);
        session.start().await?;
        Ok(session)
    }

    /// Registers both listeners, runs initial convergence and starts the
    /// dispatcher.
    ///
    /// Must be called from within a Tokio runtime. On failure nothing is
    /// left registered and the session stays [`SyncStatus::NotStarted`].
    pub async fn start(&self) -> SyncResult<()> {
        let runtime = Handle::try_current().map_err(|e| SyncError::Runtime(e.to_string()))?;
        let inner = Arc::clone(&self.inner);
        let result = tokio::task::spawn_blocking(move || inner.start_blocking(&runtime))
            .await
            .map_err(|e| SyncError::Runtime(e.to_string()))?;
        if let Err(err) = &result {
            warn!("sync session failed to start: {}", err);
        }
        result
    }

    /// Stops the session.
    ///
    /// Waits for the step in flight, if any. Once this returns the session
    /// issues no further writes and invokes no further callbacks. Stopping a
    /// stopped session is a no-op.
    pub fn stop(&self) -> SyncResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock();
        match self.inner.status() {
            SyncStatus::NotStarted => Err(SyncError::Lifecycle {
                from: SyncStatus::NotStarted,
                action: "stop",
            }),
            SyncStatus::Stopped => Ok(()),
            SyncStatus::Syncing => {
                self.inner.shutdown(&mut lifecycle);
                Ok(())
            }
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> SyncStatus {
        self.inner.status()
    }

    /// Reads both stores.
    pub fn snapshot(&self) -> SyncResult<Snapshot> {
        self.inner.engine.snapshot()
    }

    /// The engine driving this session.
    pub fn engine(&self) -> &ReconciliationEngine {
        &self.inner.engine
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if self.inner.status() == SyncStatus::Syncing {
            self.inner.shutdown(&mut lifecycle);
        }
    }
}
