//! Store interfaces for tandem.
//!
//! The sync engine never talks to a storage backend directly. It drives two
//! collaborators through the traits defined here:
//!
//! - [`LocalStore`]: synchronous, transactional, single-writer object store.
//!   Mutations are staged and committed by `save()`, which fires observers
//!   once per commit with a [`LocalChangeSet`].
//! - [`RemoteStore`]: replicated document collection with atomic write
//!   blocks and a live subscription delivering [`FeedEvent`]s.
//!
//! [`MemoryLocalStore`] and [`MemoryRemoteStore`] implement both traits in
//! memory. They back the test suites and are usable by hosts that want a
//! working pair without a real backend.

mod error;
mod local;
pub mod memory;
mod remote;
mod subscription;

pub use error::{StoreError, StoreResult};
pub use local::{LocalChangeHandler, LocalChangeSet, LocalStore};
pub use memory::{MemoryLocalStore, MemoryRemoteStore};
pub use remote::{FeedEvent, FeedHandler, RemoteStore, RemoteTransaction, WriteBlock};
pub use subscription::{HandlerFn, HandlerRegistry, Registration, Subscription};
