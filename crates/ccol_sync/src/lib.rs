//! # CCOL Sync
//!
//! Busy-wait synchronization primitives for latency-sensitive hot paths.
//!
//! ## Why Spin?
//!
//! ```text
//! OS mutex:   contended lock → syscall → scheduler → wake-up latency spike
//! Spin lock:  contended lock → poll a cache line → acquire as soon as released
//! ```
//!
//! Critical sections guarded by these locks are a handful of instructions
//! (an index flip, a single element store). Parking a thread for that is the
//! wrong trade.
//!
//! ## Primitives
//!
//! - [`RawSpinLock`] / [`SpinMutex`] - exclusive lock, not reentrant, not fair
//! - [`RawSharedSpinLock`] / [`SharedSpinLock`] - many readers or one writer
//! - [`ReaderCount`] / [`ReaderPin`] - drain counters for deferred reclamation
//!
//! The raw locks implement the `lock_api` traits re-exported by `parking_lot`,
//! so the guarded wrappers come with RAII guards for free.
//!
//! ## Example
//!
//! ```rust
//! use ccol_sync::{SharedSpinLock, SpinMutex};
//!
//! let counter = SpinMutex::new(0_u64);
//! *counter.lock() += 1;
//! assert_eq!(*counter.lock(), 1);
//!
//! let table = SharedSpinLock::new(vec![1, 2, 3]);
//! {
//!     let a = table.read();
//!     let b = table.read();
//!     assert_eq!(a.len() + b.len(), 6);
//! }
//! table.write().push(4);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

mod reclaim;
mod shared;
mod spin;

pub use reclaim::{ReaderCount, ReaderPin};
pub use shared::{RawSharedSpinLock, SharedReadGuard, SharedSpinLock, SharedWriteGuard};
pub use spin::{RawSpinLock, SpinMutex, SpinMutexGuard};

pub use parking_lot::lock_api;
