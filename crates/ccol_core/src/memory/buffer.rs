//! # Buffer Slots
//!
//! Owned element buffers with retire-when-drained reclamation.
//!
//! A [`BufferSlot`] owns at most one [`Buffer`] and counts the readers inside
//! it. Ownership moves in and out of the slot as a `Box`, so a buffer is
//! freed exactly once: by whoever receives the `Box` back.
//!
//! ```text
//!   publish(new) ──► slot owns new, returns whatever stale buffer it held
//!   pin()        ──► reader registered, buffer cannot be freed
//!   retire()     ──► wait for pins to drain, take the buffer, drop it
//! ```

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use bytemuck::Zeroable;
use ccol_sync::{ReaderCount, ReaderPin};

use crate::error::CollectionResult;

/// Marker trait for elements of a [`TrivialVector`](crate::TrivialVector).
///
/// Elements must be:
/// - `Copy`: duplicated by plain bit copy, no destructor to run
/// - `Zeroable`: new slots are filled with the all-zero value
/// - `Send + Sync`: copies leave the container on any thread
///
/// Implemented for every type meeting the bounds.
///
/// # Example
///
/// ```rust
/// use bytemuck::{Pod, Zeroable};
///
/// #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
/// #[repr(C)]
/// struct Sample {
///     timestamp: u64,
///     value: f64,
/// }
///
/// let samples = ccol_core::TrivialVector::<Sample>::new();
/// samples.push_back(Sample { timestamp: 1, value: 0.5 });
/// assert_eq!(samples.at(0).value, 0.5);
/// ```
pub trait TrivialElement: Copy + Zeroable + Send + Sync + 'static {}

impl<T: Copy + Zeroable + Send + Sync + 'static> TrivialElement for T {}

/// Fixed-capacity element storage, zero-filled on allocation.
///
/// Cells are `UnsafeCell` because the owning vector writes through a shared
/// reference; the vector's locks decide who may touch which cell.
pub(crate) struct Buffer<T> {
    cells: Box<[UnsafeCell<T>]>,
}

impl<T: TrivialElement> Buffer<T> {
    /// Allocates a zero-filled buffer holding `capacity` elements.
    pub(crate) fn try_zeroed(capacity: usize) -> CollectionResult<Box<Self>> {
        let mut cells = Vec::new();
        cells.try_reserve_exact(capacity)?;
        cells.resize_with(capacity, || UnsafeCell::new(T::zeroed()));
        Ok(Box::new(Self {
            cells: cells.into_boxed_slice(),
        }))
    }

    /// Number of elements the buffer holds.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Copies the first `len` elements of `source` into this buffer.
    ///
    /// Takes `&mut self`: the destination is not yet published.
    pub(crate) fn copy_prefix_from(&mut self, source: &Self, len: usize) {
        debug_assert!(len <= source.capacity() && len <= self.capacity());
        for (index, cell) in self.cells[..len].iter_mut().enumerate() {
            // SAFETY: the source prefix is only read here; concurrent writers to
            // it are excluded by the vector's write lock held by the caller.
            *cell.get_mut() = unsafe { source.read(index) };
        }
    }

    /// Copies out one element.
    ///
    /// # Safety
    ///
    /// No thread may be writing `index` concurrently.
    ///
    /// # Panics
    ///
    /// Panics if `index >= capacity`.
    #[inline]
    pub(crate) unsafe fn read(&self, index: usize) -> T {
        *self.cells[index].get()
    }

    /// Overwrites one element.
    ///
    /// # Safety
    ///
    /// No thread may be reading or writing `index` concurrently.
    ///
    /// # Panics
    ///
    /// Panics if `index >= capacity`.
    #[inline]
    pub(crate) unsafe fn write(&self, index: usize, value: T) {
        *self.cells[index].get() = value;
    }

    /// Zero-fills `[start, end)`.
    ///
    /// # Safety
    ///
    /// No thread may be reading or writing the range concurrently.
    pub(crate) unsafe fn zero_range(&self, start: usize, end: usize) {
        for cell in &self.cells[start..end] {
            *cell.get() = T::zeroed();
        }
    }
}

/// One of the two storage slots of a double-buffered vector.
///
/// Pairs the owned buffer pointer with the count of readers inside it.
pub(crate) struct BufferSlot<T> {
    buffer: AtomicPtr<Buffer<T>>,
    readers: ReaderCount,
}

impl<T> BufferSlot<T> {
    /// Creates an empty slot.
    pub(crate) const fn empty() -> Self {
        Self {
            buffer: AtomicPtr::new(ptr::null_mut()),
            readers: ReaderCount::new(),
        }
    }

    /// Registers a reader of this slot's buffer.
    #[inline]
    pub(crate) fn pin(&self) -> ReaderPin<'_> {
        self.readers.pin()
    }

    /// Returns the number of readers inside this slot.
    #[inline]
    pub(crate) fn readers(&self) -> usize {
        self.readers.readers()
    }

    /// Spins until no reader is inside this slot.
    #[inline]
    pub(crate) fn wait_until_drained(&self) {
        self.readers.wait_until_drained();
    }

    /// Returns the buffer currently held, if any.
    ///
    /// The pointer is only dereferenceable while the caller holds a pin on
    /// this slot or the owning vector's write lock.
    #[inline]
    pub(crate) fn load(&self) -> *const Buffer<T> {
        self.buffer.load(Ordering::Acquire)
    }

    /// Stores `buffer` in the slot and hands back the previous occupant.
    ///
    /// # Safety
    ///
    /// The slot must not be readable: no reader may be pinned on it and no
    /// new pin may start until the caller publishes the slot.
    pub(crate) unsafe fn publish(&self, buffer: Box<Buffer<T>>) -> Option<Box<Buffer<T>>> {
        debug_assert_eq!(self.readers(), 0, "publishing into a slot with readers");
        let previous = self.buffer.swap(Box::into_raw(buffer), Ordering::AcqRel);
        // SAFETY: every non-null pointer in the slot came from Box::into_raw
        // and the swap hands its ownership to exactly one caller.
        (!previous.is_null()).then(|| unsafe { Box::from_raw(previous) })
    }

    /// Waits for every reader to leave, then frees the buffer.
    ///
    /// # Safety
    ///
    /// The slot must no longer be reachable by new readers (it is not the
    /// active slot), otherwise the drain may never finish.
    pub(crate) unsafe fn retire(&self) {
        self.readers.wait_until_drained();
        let previous = self.buffer.swap(ptr::null_mut(), Ordering::AcqRel);
        if !previous.is_null() {
            // SAFETY: came from Box::into_raw, no reader is left, and the swap
            // made this call its only owner.
            drop(unsafe { Box::from_raw(previous) });
        }
    }
}

impl<T> Drop for BufferSlot<T> {
    fn drop(&mut self) {
        let buffer = *self.buffer.get_mut();
        if !buffer.is_null() {
            // SAFETY: `&mut self` proves no reader is left; the pointer came
            // from Box::into_raw and is freed only here.
            drop(unsafe { Box::from_raw(buffer) });
        }
    }
}
