//! # Reader Counts
//!
//! Drain counters for deferred reclamation.
//!
//! A buffer that readers may still be copying from cannot be freed the moment
//! it is replaced. Each buffer slot carries a [`ReaderCount`]; readers hold a
//! [`ReaderPin`] while they touch the buffer, and the writer retiring it waits
//! in [`ReaderCount::wait_until_drained`] before releasing the memory.
//!
//! ```text
//! reader:  pin = count.pin()   ── copy from buffer ──   drop(pin)
//! writer:            flip active slot ── wait_until_drained() ── free old buffer
//! ```
//!
//! The pin's decrement is a Release and the drain check an Acquire, so every
//! read made under a pin happens-before the free.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of readers currently inside one buffer.
#[derive(Debug, Default)]
pub struct ReaderCount {
    active: AtomicUsize,
}

impl ReaderCount {
    /// Creates a counter with no readers.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
        }
    }

    /// Registers a reader. The registration ends when the pin drops.
    ///
    /// Registration must be ordered before the writer's drain check, which
    /// callers get by pinning while holding the shared side of the lock that
    /// guards the buffer flip.
    #[inline]
    #[must_use = "dropping the pin immediately ends the read registration"]
    pub fn pin(&self) -> ReaderPin<'_> {
        self.active.fetch_add(1, Ordering::AcqRel);
        ReaderPin { count: self }
    }

    /// Returns the number of readers currently pinned.
    #[inline]
    #[must_use]
    pub fn readers(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Returns `true` if no reader is pinned.
    #[inline]
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.readers() == 0
    }

    /// Spins until every pinned reader has left.
    ///
    /// New pins must already be impossible (the buffer is no longer
    /// reachable), otherwise this may never return.
    pub fn wait_until_drained(&self) {
        while self.active.load(Ordering::Acquire) != 0 {
            std::hint::spin_loop();
        }
    }
}

/// RAII registration of one reader in a [`ReaderCount`].
#[derive(Debug)]
pub struct ReaderPin<'a> {
    count: &'a ReaderCount,
}

impl Drop for ReaderPin<'_> {
    #[inline]
    fn drop(&mut self) {
        self.count.active.fetch_sub(1, Ordering::Release);
    }
}
