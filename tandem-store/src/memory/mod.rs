//! In-memory store implementations.
//!
//! Both stores keep their data behind a `parking_lot::Mutex` and deliver
//! notifications after releasing it. A commit takes a separate delivery lock
//! before the data lock and holds it through emission, so handlers observe
//! commits in commit order and may read the store while a concurrent commit
//! waits.

mod local;
mod remote;

pub use local::MemoryLocalStore;
pub use remote::MemoryRemoteStore;
