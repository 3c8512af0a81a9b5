//! Atomics and lock primitives (spec.md §2, dependency steps 1-2).
//!
//! The reader/writer lock used by `store` and `event` is `parking_lot`'s
//! `RwLock` directly — it is writer-preferred on contention, which matches
//! the "writer-preferred preferred but not required" guidance in spec.md §3.
//! The per-node/per-listener spin lock is [`SpinLock`], grounded in the
//! teacher's `coredb::lock::QuickLock`.

mod spin;

pub use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use spin::{SpinGuard, SpinLock};
