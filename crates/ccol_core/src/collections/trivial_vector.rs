//! # Double-Buffered Growable Vector
//!
//! Append-mostly vector of plain-copy elements. Readers never block on
//! growth and never see a freed buffer.
//!
//! ## Layout
//!
//! ```text
//!   slots[0]              slots[1]
//!   ┌──────────────┐      ┌──────────────┐
//!   │ buffer (cap) │      │ empty        │
//!   │ readers: 3   │      │ readers: 0   │
//!   └──────────────┘      └──────────────┘
//!          ▲
//!       active
//! ```
//!
//! ## Growth
//!
//! 1. allocate a zero-filled buffer (capacity doubles from 2)
//! 2. copy the live prefix into it
//! 3. publish it into the inactive slot
//! 4. flip `active` under the shared lock in write mode
//! 5. wait for the old slot's readers to leave, free the old buffer
//!
//! Readers register (load `active`, pin that slot, load `len`) under the
//! shared lock in read mode, then copy out without holding any lock. Values
//! are always returned by copy; references into a buffer never escape.
//!
//! ## Waiting on readers
//!
//! Two kinds of mutation wait for readers to leave a buffer:
//!
//! - growth (`push_back` or `resize` past the capacity) waits on the readers
//!   of the buffer it replaces before freeing it
//! - stores over already-published indices (`replace`, `exchange`,
//!   truncation) wait until no reader is inside the active buffer
//!
//! A thread holding a [`Snapshot`] of this vector must not call any of them:
//! it would wait on itself.

#![allow(unsafe_code)]

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use ccol_sync::{ReaderPin, SharedSpinLock, SpinMutex};

use crate::config::ContainerConfig;
use crate::error::{growth_failed, CollectionError, CollectionResult};
use crate::memory::{Buffer, BufferSlot, TrivialElement};

/// Smallest capacity of a non-empty vector.
const MIN_CAPACITY: usize = 2;

/// Concurrent growable vector of [`TrivialElement`]s.
///
/// Any number of threads may read while one thread at a time mutates;
/// mutators serialize on an internal spin lock.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
/// use ccol_core::TrivialVector;
///
/// let samples = Arc::new(TrivialVector::<u64>::new());
/// let writer = {
///     let samples = Arc::clone(&samples);
///     thread::spawn(move || (0..100).for_each(|i| samples.push_back(i)))
/// };
/// writer.join().unwrap();
///
/// assert_eq!(samples.len(), 100);
/// assert_eq!(samples.at(42), 42);
/// assert_eq!(samples.iter().sum::<u64>(), 4950);
/// ```
pub struct TrivialVector<T: TrivialElement> {
    slots: [BufferSlot<T>; 2],
    /// Index (0/1) of the slot readers use.
    active: AtomicUsize,
    /// Logical length. Indices `[0, len)` of the active buffer are valid.
    len: AtomicUsize,
    /// Capacity of the active buffer.
    reserved: AtomicUsize,
    /// Serializes every mutator.
    write_lock: SpinMutex<()>,
    /// Read mode: registering a reader. Write mode: flipping or quiescing.
    flip_lock: SharedSpinLock<()>,
}

impl<T: TrivialElement> TrivialVector<T> {
    /// Creates an empty vector. Does not allocate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [BufferSlot::empty(), BufferSlot::empty()],
            active: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
            reserved: AtomicUsize::new(0),
            write_lock: SpinMutex::new(()),
            flip_lock: SharedSpinLock::new(()),
        }
    }

    /// Creates an empty vector able to hold at least `capacity` elements
    /// without growing.
    ///
    /// # Panics
    ///
    /// Panics if the allocation fails.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::try_with_capacity(capacity).unwrap_or_else(|e| growth_failed(&e))
    }

    /// Fallible [`with_capacity`](Self::with_capacity).
    ///
    /// # Errors
    ///
    /// Returns an error if the capacity overflows or the allocation fails.
    pub fn try_with_capacity(capacity: usize) -> CollectionResult<Self> {
        let vector = Self::new();
        if capacity > 0 {
            let write = vector.write_lock.lock();
            vector.grow_locked(capacity)?;
            drop(write);
        }
        Ok(vector)
    }

    /// Creates a vector sized by `config.initial_capacity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the allocation fails.
    pub fn from_config(config: &ContainerConfig) -> CollectionResult<Self> {
        config.validate()?;
        Self::try_with_capacity(config.initial_capacity)
    }

    /// Appends `value`, growing the buffer if needed.
    ///
    /// # Panics
    ///
    /// Panics if growth fails.
    #[inline]
    pub fn push_back(&self, value: T) {
        if let Err(e) = self.try_push_back(value) {
            growth_failed(&e);
        }
    }

    /// Fallible [`push_back`](Self::push_back).
    ///
    /// # Errors
    ///
    /// Returns an error if growth fails; the vector is left unchanged.
    pub fn try_push_back(&self, value: T) -> CollectionResult<()> {
        let _write = self.write_lock.lock();
        let len = self.len.load(Ordering::Relaxed);
        let new_len = next_len(len)?;
        if new_len > self.reserved.load(Ordering::Relaxed) {
            self.grow_locked(new_len)?;
        }
        // SAFETY: write lock held, capacity > len, and no reader reads
        // index `len` until the store below publishes it.
        unsafe { self.locked_buffer().write(len, value) };
        self.len.store(new_len, Ordering::Release);
        Ok(())
    }

    /// Sets the length to `new_len`.
    ///
    /// New elements are zero. Shrinking never releases capacity.
    ///
    /// # Panics
    ///
    /// Panics if growth fails.
    pub fn resize(&self, new_len: usize) {
        if let Err(e) = self.try_resize(new_len) {
            growth_failed(&e);
        }
    }

    /// Fallible [`resize`](Self::resize).
    ///
    /// # Errors
    ///
    /// Returns an error if growth fails; the vector is left unchanged.
    pub fn try_resize(&self, new_len: usize) -> CollectionResult<()> {
        let _write = self.write_lock.lock();
        let len = self.len.load(Ordering::Relaxed);
        if new_len < len {
            self.quiesced(|| self.len.store(new_len, Ordering::Release));
            return Ok(());
        }
        if new_len == len {
            return Ok(());
        }
        if new_len > self.reserved.load(Ordering::Relaxed) {
            // Fresh buffers are zero past the copied prefix.
            self.grow_locked(new_len)?;
        } else {
            // SAFETY: write lock held, capacity >= new_len > 0, and
            // `[len, new_len)` is not yet visible to readers.
            unsafe { self.locked_buffer().zero_range(len, new_len) };
        }
        self.len.store(new_len, Ordering::Release);
        Ok(())
    }

    /// Truncates to zero length, keeping the capacity.
    pub fn clear(&self) {
        let _write = self.write_lock.lock();
        if self.len.load(Ordering::Relaxed) > 0 {
            self.quiesced(|| self.len.store(0, Ordering::Release));
        }
    }

    /// Overwrites the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn replace(&self, index: usize, value: T) {
        self.exchange(index, value);
    }

    /// Overwrites the element at `index` and returns the previous value.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn exchange(&self, index: usize, value: T) -> T {
        let _write = self.write_lock.lock();
        let len = self.len.load(Ordering::Relaxed);
        assert!(
            index < len,
            "index out of bounds: the len is {len} but the index is {index}"
        );
        self.quiesced(|| {
            // SAFETY: write lock held, index < len <= capacity, and the
            // active buffer has no readers until the flip lock is released.
            let buffer = unsafe { self.locked_buffer() };
            // SAFETY: same as above.
            unsafe {
                let previous = buffer.read(index);
                buffer.write(index, value);
                previous
            }
        })
    }

    /// Returns a copy of the element at `index`, or `None` if out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.snapshot().get(index)
    }

    /// Returns a copy of the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[inline]
    #[must_use]
    pub fn at(&self, index: usize) -> T {
        self.snapshot().at(index)
    }

    /// Number of published elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Returns `true` if no element is published.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the current buffer.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Pins the current buffer and length.
    ///
    /// The pinned buffer is never freed while the snapshot lives: a growth
    /// that replaces it waits until the snapshot drops before returning.
    /// Calling a growing mutator while holding a snapshot on the same thread
    /// therefore deadlocks.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<'_, T> {
        let flip = self.flip_lock.read();
        let slot = &self.slots[self.active.load(Ordering::Acquire)];
        let pin = slot.pin();
        let len = self.len.load(Ordering::Acquire);
        let buffer = slot.load();
        drop(flip);
        Snapshot {
            _pin: pin,
            buffer,
            len,
        }
    }

    /// Iterates over copies of the elements of a fresh [`snapshot`](Self::snapshot).
    #[must_use]
    pub fn iter(&self) -> SnapshotIter<'_, T> {
        self.snapshot().into_iter()
    }

    /// Copies the current elements into a `Vec`.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.snapshot().to_vec()
    }

    /// Active buffer, as seen by the writer.
    ///
    /// # Safety
    ///
    /// The write lock must be held and the capacity must be non-zero.
    #[inline]
    unsafe fn locked_buffer(&self) -> &Buffer<T> {
        let buffer = self.slots[self.active.load(Ordering::Relaxed)].load();
        debug_assert!(!buffer.is_null());
        &*buffer
    }

    /// Runs `store` while no reader is inside the active buffer.
    ///
    /// Requires the write lock.
    fn quiesced<R>(&self, store: impl FnOnce() -> R) -> R {
        let _flip = self.flip_lock.write();
        self.slots[self.active.load(Ordering::Relaxed)].wait_until_drained();
        store()
    }

    /// Moves the contents into a buffer holding at least `required` elements.
    ///
    /// Requires the write lock. The length is unchanged.
    fn grow_locked(&self, required: usize) -> CollectionResult<()> {
        let reserved = self.reserved.load(Ordering::Relaxed);
        let len = self.len.load(Ordering::Relaxed);
        let capacity = grown_capacity(reserved, len, required)?;

        let mut buffer = Buffer::try_zeroed(capacity)?;
        let active = self.active.load(Ordering::Relaxed);
        let current = self.slots[active].load();
        if !current.is_null() {
            // SAFETY: the active buffer is only replaced by the write lock
            // holder, which is this thread.
            buffer.copy_prefix_from(unsafe { &*current }, len);
        }

        let next = active ^ 1;
        // SAFETY: readers only pin the active slot, and the previous retire
        // of `next` drained it, so nobody is inside it.
        drop(unsafe { self.slots[next].publish(buffer) });
        {
            let _flip = self.flip_lock.write();
            self.active.store(next, Ordering::Release);
            self.reserved.store(capacity, Ordering::Release);
        }
        tracing::trace!(from = reserved, to = capacity, len, "vector buffer flipped");

        // SAFETY: `active` is no longer the active slot; new readers go to `next`.
        unsafe { self.slots[active].retire() };
        if !current.is_null() {
            tracing::debug!(capacity = reserved, "retired vector buffer");
        }
        Ok(())
    }
}

/// Length after appending one element to `len`.
fn next_len(len: usize) -> CollectionResult<usize> {
    len.checked_add(1)
        .ok_or(CollectionError::CapacityOverflow { len, additional: 1 })
}

/// Next capacity on the doubling schedule that covers `required`.
///
/// `len` is only used to report an overflow.
fn grown_capacity(current: usize, len: usize, required: usize) -> CollectionResult<usize> {
    let overflow = CollectionError::CapacityOverflow {
        len,
        additional: required.saturating_sub(len),
    };
    let mut capacity = current
        .checked_mul(2)
        .ok_or_else(|| overflow.clone())?
        .max(MIN_CAPACITY);
    while capacity < required {
        capacity = capacity.checked_mul(2).ok_or_else(|| overflow.clone())?;
    }
    Ok(capacity)
}

impl<T: TrivialElement> Default for TrivialVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TrivialElement + fmt::Debug> fmt::Debug for TrivialVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T: TrivialElement> IntoIterator for &'a TrivialVector<T> {
    type Item = T;
    type IntoIter = SnapshotIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A pinned view of a [`TrivialVector`]'s buffer and length.
///
/// Holds one reader registration. Reads through it copy elements out of the
/// buffer that was active when the snapshot was taken.
pub struct Snapshot<'a, T: TrivialElement> {
    _pin: ReaderPin<'a>,
    buffer: *const Buffer<T>,
    len: usize,
}

impl<T: TrivialElement> Snapshot<'_, T> {
    /// Length at the time of the snapshot.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the snapshot holds no element.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a copy of the element at `index`, or `None` if out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        // SAFETY: index < len implies a non-null buffer holding index, kept
        // alive by the pin; writers only store past `len` or after draining.
        (index < self.len).then(|| unsafe { (*self.buffer).read(index) })
    }

    /// Returns a copy of the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[inline]
    #[must_use]
    pub fn at(&self, index: usize) -> T {
        match self.get(index) {
            Some(value) => value,
            None => panic!(
                "index out of bounds: the len is {} but the index is {index}",
                self.len
            ),
        }
    }

    /// Iterates over copies of the elements.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = T> + '_ {
        (0..self.len).map(|index| self.at(index))
    }

    /// Copies the elements into a `Vec`.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

impl<'a, T: TrivialElement> IntoIterator for Snapshot<'a, T> {
    type Item = T;
    type IntoIter = SnapshotIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        SnapshotIter {
            snapshot: self,
            next: 0,
        }
    }
}

/// Owning iterator over a [`Snapshot`].
pub struct SnapshotIter<'a, T: TrivialElement> {
    snapshot: Snapshot<'a, T>,
    next: usize,
}

impl<T: TrivialElement> Iterator for SnapshotIter<'_, T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        let value = self.snapshot.get(self.next)?;
        self.next += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.snapshot.len - self.next;
        (remaining, Some(remaining))
    }
}

impl<T: TrivialElement> ExactSizeIterator for SnapshotIter<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_new_is_empty() {
        let vector = TrivialVector::<u32>::new();
        assert!(vector.is_empty());
        assert_eq!(vector.capacity(), 0);
        assert_eq!(vector.get(0), None);
        assert!(vector.to_vec().is_empty());
    }

    #[test]
    fn test_push_back_and_read() {
        let vector = TrivialVector::new();
        for i in 0..100_u32 {
            vector.push_back(i);
        }
        assert_eq!(vector.len(), 100);
        for i in 0..100 {
            assert_eq!(vector.at(i as usize), i);
        }
        assert_eq!(vector.get(100), None);
    }

    #[test]
    fn test_capacity_doubles_from_two() {
        let vector = TrivialVector::new();
        vector.push_back(1_u8);
        assert_eq!(vector.capacity(), 2);
        vector.push_back(2);
        vector.push_back(3);
        assert_eq!(vector.capacity(), 4);
        vector.resize(9);
        assert_eq!(vector.capacity(), 16);
    }

    #[test]
    fn test_with_capacity() {
        let vector = TrivialVector::<u64>::with_capacity(100);
        assert_eq!(vector.capacity(), 128);
        assert!(vector.is_empty());
        assert_eq!(TrivialVector::<u64>::with_capacity(0).capacity(), 0);
    }

    #[test]
    fn test_resize_zero_fills() {
        let vector = TrivialVector::new();
        vector.resize(3);
        assert_eq!(vector.to_vec(), vec![0_i32, 0, 0]);

        vector.replace(1, 5);
        vector.resize(1);
        assert_eq!(vector.len(), 1);
        assert_eq!(vector.capacity(), 4);

        // Regrowth inside the capacity must not resurrect the old 5.
        vector.resize(3);
        assert_eq!(vector.to_vec(), vec![0, 0, 0]);
    }

    #[test]
    fn test_exchange_returns_previous() {
        let vector = TrivialVector::new();
        vector.push_back(10_u16);
        vector.push_back(20);
        assert_eq!(vector.exchange(1, 21), 20);
        assert_eq!(vector.at(1), 21);
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn test_replace_out_of_bounds() {
        let vector = TrivialVector::new();
        vector.push_back(1_u32);
        vector.replace(1, 2);
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn test_at_out_of_bounds() {
        let vector = TrivialVector::<u32>::new();
        let _ = vector.at(0);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let vector = TrivialVector::new();
        (0..10_u32).for_each(|i| vector.push_back(i));
        let capacity = vector.capacity();
        vector.clear();
        assert!(vector.is_empty());
        assert_eq!(vector.capacity(), capacity);
        vector.push_back(7);
        assert_eq!(vector.to_vec(), vec![7]);
    }

    #[test]
    fn test_growth_waits_for_snapshot() {
        let vector = Arc::new(TrivialVector::new());
        vector.push_back(1_u64);
        vector.push_back(2);
        assert_eq!(vector.capacity(), 2);

        let snapshot = vector.snapshot();
        let writer = {
            let vector = Arc::clone(&vector);
            thread::spawn(move || vector.push_back(3))
        };

        // The writer flips to the new buffer, then waits on our pin before
        // freeing the old one. Until then the pinned buffer stays readable.
        while vector.capacity() == 2 {
            std::hint::spin_loop();
        }
        thread::sleep(Duration::from_millis(20));
        assert!(!writer.is_finished());
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.to_vec(), vec![1, 2]);

        drop(snapshot);
        writer.join().unwrap();
        assert_eq!(vector.to_vec(), vec![1, 2, 3]);
        assert_eq!(vector.capacity(), 4);
    }

    #[test]
    fn test_iterators() {
        let vector = TrivialVector::new();
        (1..=4_u32).for_each(|i| vector.push_back(i));

        let iter = vector.iter();
        assert_eq!(iter.len(), 4);
        assert_eq!(iter.sum::<u32>(), 10);

        let mut seen = Vec::new();
        for value in &vector {
            seen.push(value);
        }
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(format!("{vector:?}"), "[1, 2, 3, 4]");
    }

    #[test]
    fn test_from_config() {
        let config = ContainerConfig {
            initial_capacity: 5,
            ..ContainerConfig::default()
        };
        let vector = TrivialVector::<u32>::from_config(&config).unwrap();
        assert_eq!(vector.capacity(), 8);

        let bad = ContainerConfig {
            initial_capacity: 0,
            page_size: 0,
        };
        assert!(TrivialVector::<u32>::from_config(&bad).is_err());
    }

    #[test]
    fn test_try_with_capacity_overflow() {
        let err = TrivialVector::<u64>::try_with_capacity(usize::MAX).unwrap_err();
        assert!(matches!(err, CollectionError::CapacityOverflow { .. }));

        let err = TrivialVector::<u64>::try_with_capacity(usize::MAX / 2).unwrap_err();
        assert!(matches!(err, CollectionError::Allocation(_)));
    }

    #[test]
    fn test_grown_capacity_schedule() {
        assert_eq!(grown_capacity(0, 0, 1).unwrap(), 2);
        assert_eq!(grown_capacity(2, 2, 3).unwrap(), 4);
        assert_eq!(grown_capacity(4, 4, 100).unwrap(), 128);

        let err = grown_capacity(usize::MAX / 2 + 1, 10, usize::MAX).unwrap_err();
        assert_eq!(
            err,
            CollectionError::CapacityOverflow {
                len: 10,
                additional: usize::MAX - 10,
            }
        );
    }

    #[test]
    fn test_next_len_overflow_reports_one_more() {
        assert_eq!(next_len(4).unwrap(), 5);
        assert_eq!(
            next_len(usize::MAX).unwrap_err(),
            CollectionError::CapacityOverflow {
                len: usize::MAX,
                additional: 1,
            }
        );
    }

    #[test]
    fn test_concurrent_pushers() {
        let vector = Arc::new(TrivialVector::new());
        let handles: Vec<_> = (0..4_u64)
            .map(|t| {
                let vector = Arc::clone(&vector);
                thread::spawn(move || {
                    for i in 0..1000 {
                        vector.push_back(t * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut values = vector.to_vec();
        values.sort_unstable();
        assert_eq!(values, (0..4000).collect::<Vec<_>>());
    }
}
