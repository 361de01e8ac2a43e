//! # Shared (Reader-Writer) Spin Lock
//!
//! Composition of an exclusive [`RawSpinLock`] gate and an atomic reader count.
//!
//! ```text
//! lock_shared():     gate.lock(); readers += 1; gate.unlock()
//! unlock_shared():   readers -= 1
//! lock_exclusive():  gate.lock(); while readers > 0 { spin }; writer = true
//! unlock_exclusive(): writer = false; gate.unlock()
//! ```
//!
//! A writer holding the gate keeps new readers out, and only returns once the
//! readers already registered have left. Readers hold the gate for three
//! instructions, so a writer never waits long on a registration in flight.
//!
//! ## Liveness
//!
//! Writers are not starvation-free: a constant stream of short read sections
//! can keep the count from resting at zero. That is accepted; nothing here
//! queues writers.

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use parking_lot::lock_api::{self, GuardSend, RawMutex, RawRwLock};

use crate::spin::RawSpinLock;

/// Raw reader-writer spin lock.
///
/// Many shared holders or a single exclusive holder, never both.
/// Use [`SharedSpinLock`] for the guarded version.
#[derive(Debug, Default)]
pub struct RawSharedSpinLock {
    /// Writer gate. Also taken briefly by readers while registering.
    gate: RawSpinLock,
    /// Number of registered readers. Never negative for balanced calls.
    readers: AtomicI32,
    /// Set while an exclusive holder owns the lock, after the readers drained.
    writer: AtomicBool,
}

impl RawSharedSpinLock {
    /// Creates an unlocked shared spin lock.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            gate: RawSpinLock::new(),
            readers: AtomicI32::new(0),
            writer: AtomicBool::new(false),
        }
    }

    /// Returns the number of currently registered shared holders.
    ///
    /// Diagnostic only: the value may be stale by the time it is used.
    #[inline]
    #[must_use]
    pub fn reader_count(&self) -> i32 {
        self.readers.load(Ordering::Acquire)
    }
}

// SAFETY: a shared holder is only registered while the gate is held, and an
// exclusive holder keeps the gate and has observed a zero reader count, so
// the two modes never overlap.
unsafe impl RawRwLock for RawSharedSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = GuardSend;

    #[inline]
    fn lock_shared(&self) {
        self.gate.lock();
        self.readers.fetch_add(1, Ordering::AcqRel);
        // SAFETY: acquired on the line above.
        unsafe { self.gate.unlock() };
    }

    #[inline]
    fn try_lock_shared(&self) -> bool {
        if !self.gate.try_lock() {
            return false;
        }
        self.readers.fetch_add(1, Ordering::AcqRel);
        // SAFETY: acquired by the successful try_lock above.
        unsafe { self.gate.unlock() };
        true
    }

    #[inline]
    unsafe fn unlock_shared(&self) {
        let previous = self.readers.fetch_sub(1, Ordering::Release);
        debug_assert!(previous > 0, "unlock_shared without a matching lock_shared");
    }

    #[inline]
    fn lock_exclusive(&self) {
        self.gate.lock();
        while self.readers.load(Ordering::Acquire) > 0 {
            std::hint::spin_loop();
        }
        self.writer.store(true, Ordering::Relaxed);
    }

    #[inline]
    fn try_lock_exclusive(&self) -> bool {
        if !self.gate.try_lock() {
            return false;
        }
        if self.readers.load(Ordering::Acquire) > 0 {
            // SAFETY: acquired by the successful try_lock above.
            unsafe { self.gate.unlock() };
            return false;
        }
        self.writer.store(true, Ordering::Relaxed);
        true
    }

    #[inline]
    unsafe fn unlock_exclusive(&self) {
        self.writer.store(false, Ordering::Relaxed);
        self.gate.unlock();
    }

    /// Diagnostic only, like [`reader_count`](RawSharedSpinLock::reader_count).
    ///
    /// Also true while a reader holds the gate to register.
    #[inline]
    fn is_locked(&self) -> bool {
        self.gate.is_locked() || self.readers.load(Ordering::Relaxed) > 0
    }

    /// Diagnostic only. Reports an exclusive holder that has finished
    /// waiting for readers, not a reader passing through the gate.
    #[inline]
    fn is_locked_exclusive(&self) -> bool {
        self.writer.load(Ordering::Relaxed)
    }
}

/// A value protected by a [`RawSharedSpinLock`].
pub type SharedSpinLock<T> = lock_api::RwLock<RawSharedSpinLock, T>;

/// Shared guard returned by [`SharedSpinLock::read`](lock_api::RwLock::read).
pub type SharedReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawSharedSpinLock, T>;

/// Exclusive guard returned by [`SharedSpinLock::write`](lock_api::RwLock::write).
pub type SharedWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawSharedSpinLock, T>;
