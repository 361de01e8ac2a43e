//! # Exclusive Spin Lock
//!
//! Test-and-test-and-set mutual exclusion.
//!
//! ## Protocol
//!
//! ```text
//! lock():
//!   loop {
//!     swap(true, Acquire) == false  → acquired
//!     while load(Relaxed) { spin_loop() }   ← wait without hammering the swap
//!   }
//!
//! unlock():
//!   store(false, Release)
//! ```
//!
//! The Acquire swap pairs with the Release store, so everything written by
//! the previous holder is visible to the next one.

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::lock_api::{self, GuardSend, RawMutex};

/// Raw exclusive spin lock.
///
/// A single flag. No ownership metadata, so the lock is **not reentrant**:
/// a thread calling `lock()` twice spins forever. No fairness and no
/// timeout either.
///
/// Most code should use [`SpinMutex`] instead, which wraps the data it
/// protects and releases the lock when the guard drops.
///
/// # Example
///
/// ```rust
/// use ccol_sync::RawSpinLock;
/// use ccol_sync::lock_api::RawMutex;
///
/// let lock = RawSpinLock::new();
/// assert!(lock.try_lock());
/// assert!(lock.is_locked());
/// assert!(!lock.try_lock());
/// ```
#[derive(Debug)]
pub struct RawSpinLock {
    locked: AtomicBool,
}

impl RawSpinLock {
    /// Creates an unlocked spin lock.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: `try_lock` only succeeds for the thread that flips the flag from
// false to true, so at most one holder exists until `unlock` clears it.
unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = GuardSend;

    #[inline]
    fn lock(&self) {
        while !self.try_lock() {
            while self.locked.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// A value protected by a [`RawSpinLock`].
pub type SpinMutex<T> = lock_api::Mutex<RawSpinLock, T>;

/// RAII guard returned by [`SpinMutex::lock`](lock_api::Mutex::lock).
pub type SpinMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;
