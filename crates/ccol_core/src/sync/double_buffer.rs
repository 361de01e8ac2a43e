//! # Double-Buffered Queue
//!
//! Producers append to a back buffer while consumers read a front buffer.
//!
//! ```text
//!   producers ──push_back──►  back  (buffers[front ^ 1])   back_lock
//!                               │
//!                          swap_buffers()                  back_lock + front_lock (write)
//!                               ▼
//!   consumers ◄───read()────  front (buffers[front])       front_lock (read)
//! ```
//!
//! A swap flips the front index and clears the buffer that just stopped
//! being the front, so every element is delivered in exactly one front
//! generation. Locks are always taken in the order back, then front.
//!
//! ## Thread Safety
//!
//! - `push_back`: any thread, serialized on the back lock
//! - `read`: any thread, many at once
//! - `swap_buffers`: any thread; waits for current readers to finish.
//!   Calling it while the same thread holds a [`FrontBuffer`] deadlocks.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};

use ccol_sync::{SharedReadGuard, SharedSpinLock, SpinMutex, SpinMutexGuard};

use crate::collections::{PagedVector, TrivialVector};
use crate::config::ContainerConfig;
use crate::error::CollectionResult;
use crate::memory::TrivialElement;

/// A container usable as one half of a [`DoubleBufferQueue`].
pub trait QueueStorage: Default {
    /// Element type.
    type Item;

    /// Appends `item`. The queue guarantees exclusive access to the back buffer.
    fn push_item(&mut self, item: Self::Item);

    /// Number of elements.
    fn len(&self) -> usize;

    /// Returns `true` if there is no element.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every element.
    fn clear(&mut self);

    /// Builds an empty buffer sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the allocation fails.
    fn from_config(config: &ContainerConfig) -> CollectionResult<Self>;
}

impl<T: TrivialElement> QueueStorage for TrivialVector<T> {
    type Item = T;

    #[inline]
    fn push_item(&mut self, item: T) {
        self.push_back(item);
    }

    #[inline]
    fn len(&self) -> usize {
        TrivialVector::len(self)
    }

    fn clear(&mut self) {
        TrivialVector::clear(self);
    }

    fn from_config(config: &ContainerConfig) -> CollectionResult<Self> {
        TrivialVector::from_config(config)
    }
}

impl<T> QueueStorage for PagedVector<T> {
    type Item = T;

    #[inline]
    fn push_item(&mut self, item: T) {
        self.emplace_back(item);
    }

    #[inline]
    fn len(&self) -> usize {
        PagedVector::len(self)
    }

    fn clear(&mut self) {
        PagedVector::clear(self);
    }

    fn from_config(config: &ContainerConfig) -> CollectionResult<Self> {
        PagedVector::from_config(config)
    }
}

/// Queue of plain-copy elements.
pub type TrivialQueue<T> = DoubleBufferQueue<TrivialVector<T>>;

/// Queue of arbitrary elements.
pub type PagedQueue<T> = DoubleBufferQueue<PagedVector<T>>;

/// Double-buffered multi-producer, multi-consumer queue.
///
/// Items pushed between two swaps become visible together, as the front
/// buffer, after the second swap.
///
/// ## Usage
///
/// ```rust
/// use ccol_core::TrivialQueue;
///
/// let events = TrivialQueue::<u32>::new();
/// events.push_back(1);
/// events.push_back(2);
/// assert_eq!(events.front_len(), 0);
///
/// events.swap_buffers();
/// let front = events.read();
/// assert_eq!(front.to_vec(), vec![1, 2]);
/// ```
pub struct DoubleBufferQueue<S: QueueStorage> {
    /// Only the back lock holder touches `buffers[front ^ 1]`; only swaps
    /// mutate `buffers[front]`.
    buffers: [UnsafeCell<S>; 2],

    /// Index (0/1) of the buffer consumers read.
    front: AtomicUsize,

    /// Guards the back buffer.
    back_lock: SpinMutex<()>,

    /// Read mode: consumers. Write mode: a swap.
    front_lock: SharedSpinLock<()>,

    /// Completed swaps, for diagnostics.
    swap_count: AtomicUsize,
}

// SAFETY: the queue owns both buffers; moving it moves them.
unsafe impl<S: QueueStorage + Send> Send for DoubleBufferQueue<S> {}
// SAFETY: the back buffer is only reached under the back lock and the front
// buffer only through shared references under the front lock, so concurrent
// use needs S to move between threads (Send) and be read from many (Sync).
unsafe impl<S: QueueStorage + Send + Sync> Sync for DoubleBufferQueue<S> {}

impl<S: QueueStorage> DoubleBufferQueue<S> {
    /// Creates a queue with two default buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffers(S::default(), S::default())
    }

    /// Creates a queue whose buffers are both sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or an allocation fails.
    pub fn from_config(config: &ContainerConfig) -> CollectionResult<Self> {
        Ok(Self::with_buffers(S::from_config(config)?, S::from_config(config)?))
    }

    fn with_buffers(first: S, second: S) -> Self {
        Self {
            buffers: [UnsafeCell::new(first), UnsafeCell::new(second)],
            front: AtomicUsize::new(0),
            back_lock: SpinMutex::new(()),
            front_lock: SharedSpinLock::new(()),
            swap_count: AtomicUsize::new(0),
        }
    }

    /// Appends `item` to the back buffer.
    ///
    /// # Panics
    ///
    /// Panics if the back buffer fails to grow.
    pub fn push_back(&self, item: S::Item) {
        let guard = self.back_lock.lock();
        self.back_mut(&guard).push_item(item);
    }

    /// Returns `true` if nothing was pushed since the last swap.
    #[must_use]
    pub fn is_back_buffer_empty(&self) -> bool {
        let guard = self.back_lock.lock();
        self.back_mut(&guard).is_empty()
    }

    /// Makes the back buffer the front and clears the old front.
    ///
    /// Waits for every outstanding [`FrontBuffer`] to drop.
    pub fn swap_buffers(&self) {
        let guard = self.back_lock.lock();
        self.swap_locked(&guard);
    }

    /// Swaps only if the back buffer holds something.
    ///
    /// Returns whether a swap happened.
    pub fn try_swap_buffers(&self) -> bool {
        let guard = self.back_lock.lock();
        if self.back_mut(&guard).is_empty() {
            return false;
        }
        self.swap_locked(&guard);
        true
    }

    /// Number of swaps performed so far.
    #[inline]
    #[must_use]
    pub fn swap_count(&self) -> usize {
        self.swap_count.load(Ordering::Relaxed)
    }

    /// Locks the front buffer for reading.
    ///
    /// Swaps wait until the returned guard drops.
    #[must_use]
    pub fn read(&self) -> FrontBuffer<'_, S> {
        let guard = self.front_lock.read();
        let front = self.front.load(Ordering::Acquire);
        // SAFETY: the front buffer is only mutated by a swap, which needs the
        // front lock in write mode and so waits for `guard`.
        let buffer = unsafe { &*self.buffers[front].get() };
        FrontBuffer {
            _guard: guard,
            buffer,
        }
    }

    /// Number of elements in the front buffer.
    #[must_use]
    pub fn front_len(&self) -> usize {
        self.read().len()
    }

    /// The back buffer. The guard proves the back lock is held.
    #[allow(clippy::mut_from_ref)]
    fn back_mut<'g>(&'g self, _guard: &'g SpinMutexGuard<'_, ()>) -> &'g mut S {
        let back = self.front.load(Ordering::Acquire) ^ 1;
        // SAFETY: the back lock is held for 'g; the front index cannot change
        // without it, and no reader looks at the back buffer.
        unsafe { &mut *self.buffers[back].get() }
    }

    /// Flips the front index. Requires the back lock.
    fn swap_locked(&self, _guard: &SpinMutexGuard<'_, ()>) {
        let _front = self.front_lock.write();
        let old_front = self.front.fetch_xor(1, Ordering::AcqRel);
        // SAFETY: both locks are held: no reader sees `old_front` and no
        // producer writes to it.
        let stale = unsafe { &mut *self.buffers[old_front].get() };
        stale.clear();

        let swaps = self.swap_count.fetch_add(1, Ordering::Relaxed) + 1;
        // SAFETY: the new front only changes under the front lock held here.
        let front_len = unsafe { &*self.buffers[old_front ^ 1].get() }.len();
        tracing::trace!(swaps, front_len, "swapped queue buffers");
    }
}

impl<S: QueueStorage> Default for DoubleBufferQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: QueueStorage> fmt::Debug for DoubleBufferQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubleBufferQueue")
            .field("front", &self.front.load(Ordering::Relaxed))
            .field("swap_count", &self.swap_count())
            .finish_non_exhaustive()
    }
}

/// Shared access to the front buffer of a [`DoubleBufferQueue`].
///
/// Dereferences to the buffer, so its whole read API (`len`, `get`,
/// indexing, `iter`, ...) is available.
pub struct FrontBuffer<'a, S: QueueStorage> {
    _guard: SharedReadGuard<'a, ()>,
    buffer: &'a S,
}

impl<S: QueueStorage> Deref for FrontBuffer<'_, S> {
    type Target = S;

    #[inline]
    fn deref(&self) -> &S {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_invisible_until_swap() {
        let queue = TrivialQueue::<i32>::new();
        queue.push_back(0);
        queue.push_back(1);
        queue.push_back(2);

        assert_eq!(queue.front_len(), 0);
        assert!(!queue.is_back_buffer_empty());

        queue.swap_buffers();
        assert_eq!(queue.read().to_vec(), vec![0, 1, 2]);
        assert!(queue.is_back_buffer_empty());

        queue.swap_buffers();
        assert_eq!(queue.front_len(), 0);
        assert_eq!(queue.swap_count(), 2);
    }

    #[test]
    fn test_swap_clears_old_front() {
        let queue = TrivialQueue::<u8>::new();
        queue.push_back(1);
        queue.swap_buffers();
        queue.push_back(2);
        queue.swap_buffers();
        assert_eq!(queue.read().to_vec(), vec![2]);

        // The buffer that held [1] is the back buffer again and was cleared.
        queue.push_back(3);
        queue.swap_buffers();
        assert_eq!(queue.read().to_vec(), vec![3]);
    }

    #[test]
    fn test_try_swap_buffers() {
        let queue = TrivialQueue::<u64>::new();
        assert!(!queue.try_swap_buffers());
        assert_eq!(queue.swap_count(), 0);

        queue.push_back(9);
        assert!(queue.try_swap_buffers());
        assert_eq!(queue.read().at(0), 9);
        assert_eq!(queue.swap_count(), 1);
    }

    #[test]
    fn test_paged_queue() {
        let queue = PagedQueue::<String>::new();
        queue.push_back("a".to_string());
        queue.push_back("b".to_string());
        queue.swap_buffers();

        let front = queue.read();
        assert_eq!(front.len(), 2);
        assert_eq!(front[1], "b");
        assert_eq!(front.iter().cloned().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_from_config() {
        let config = ContainerConfig {
            initial_capacity: 8,
            page_size: 4,
        };
        let queue = TrivialQueue::<u32>::from_config(&config).unwrap();
        assert!(queue.is_back_buffer_empty());

        let queue = PagedQueue::<u32>::from_config(&config).unwrap();
        queue.push_back(5);
        queue.swap_buffers();
        assert_eq!(queue.read().page_size(), 4);

        let bad = ContainerConfig {
            initial_capacity: 0,
            page_size: 0,
        };
        assert!(TrivialQueue::<u32>::from_config(&bad).is_err());
    }

    #[test]
    fn test_readers_share_front() {
        let queue = TrivialQueue::<u16>::new();
        queue.push_back(4);
        queue.swap_buffers();

        let a = queue.read();
        let b = queue.read();
        assert_eq!(a.at(0), b.at(0));
        queue.push_back(5);
        drop(a);
        drop(b);

        queue.swap_buffers();
        assert_eq!(queue.read().to_vec(), vec![5]);
    }
}
