//! Bidirectional reconciliation between a local store and a remote collection.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐   LocalChangeBatch    ┌─────────────────────┐
//! │  LocalStore    │ ────────────────────► │                     │
//! │  (observe)     │ ◄──────────────────── │ ReconciliationEngine│
//! └────────────────┘   create/update/del   │                     │
//! ┌────────────────┐   RemoteChangeBatch   │  diff-before-write  │
//! │  RemoteStore   │ ────────────────────► │  on every edge      │
//! │  (subscribe)   │ ◄──────────────────── │                     │
//! └────────────────┘   insert/update/rm    └─────────────────────┘
//! ```
//!
//! [`SyncSession`] owns the listeners and serializes every step onto one
//! dispatcher. [`ReconciliationEngine`] can also be driven directly.
//!
//! Writes whose diff against the destination is empty are never issued, so
//! a change echoed back from the other side terminates after one round.

mod adapter;
mod batch;
mod config;
mod engine;
mod error;
mod feed;
mod index;
mod observer;
mod session;

pub use adapter::RecordAdapter;
pub use batch::{LocalChangeBatch, RemoteChangeBatch, Snapshot};
pub use config::{ExistencePolicy, SyncConfig};
pub use engine::{ConvergenceReport, PropagationReport, ReconciliationEngine};
pub use error::{SyncError, SyncResult};
pub use feed::RemoteChangeFeed;
pub use index::{IdentityIndex, Lookup};
pub use observer::LocalChangeObserver;
pub use session::{ErrorCallback, SnapshotCallback, SyncSession, SyncStatus, SyncToken};
