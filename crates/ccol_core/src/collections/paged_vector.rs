//! # Paged Vector
//!
//! Append-only vector for elements of any type, with stable addresses.
//!
//! ```text
//!   pages: TrivialVector<PageRef>
//!   ┌──────┬──────┬──────┐
//!   │  p0  │  p1  │  p2  │  ...
//!   └──┬───┴──┬───┴──┬───┘
//!      ▼      ▼      ▼
//!   [0..n) [n..2n) [2n..3n)      n = page_size
//! ```
//!
//! Pages are allocated at full size and never move, so `&T` handed out by
//! [`PagedVector::get`] stays valid while other threads keep appending. Only
//! the small page index grows, and it holds plain addresses.
//!
//! ## Append
//!
//! 1. make sure the page for the next free index exists (page lock, re-checked)
//! 2. claim that index with a compare-exchange on the claim counter
//! 3. under the write lock, construct the element in its slot and advance the
//!    published length over every contiguous written slot
//!
//! Readers only see indices below the published length, so a claimed but
//! still unwritten slot is never observable.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::ops::Index;
use std::sync::atomic::{AtomicUsize, Ordering};

use ccol_sync::SpinMutex;

use crate::collections::TrivialVector;
use crate::config::{ContainerConfig, DEFAULT_PAGE_SIZE};
use crate::error::{growth_failed, CollectionError, CollectionResult};
use crate::memory::{Page, PageRef};

/// Concurrent append-only vector with address-stable elements.
///
/// # Example
///
/// ```rust
/// use ccol_core::PagedVector;
///
/// let names = PagedVector::with_page_size(2);
/// names.push_back(&"0".to_string());
/// names.emplace_back("1".to_string());
/// names.emplace_back("2".to_string());
///
/// assert_eq!(names.len(), 3);
/// assert_eq!(names.page_count(), 2);
/// assert_eq!(names[2], "2");
/// ```
pub struct PagedVector<T> {
    /// Page addresses, in index order.
    pages: TrivialVector<PageRef>,
    /// Next index to hand out. Every index below it has a page.
    claimed: AtomicUsize,
    /// Published length. Every slot below it is written.
    len: AtomicUsize,
    page_size: usize,
    /// Serializes page creation.
    page_lock: SpinMutex<()>,
    /// Serializes element construction and length publication.
    write_lock: SpinMutex<()>,
    /// Owns `T`s; thread-safety comes from the impls below.
    _owns: PhantomData<*const T>,
}

// SAFETY: the vector owns its elements; moving it moves them.
unsafe impl<T: Send> Send for PagedVector<T> {}
// SAFETY: shared access moves elements in from any thread (needs Send) and
// hands out `&T` to any thread (needs Sync).
unsafe impl<T: Send + Sync> Sync for PagedVector<T> {}

impl<T> PagedVector<T> {
    /// Creates an empty vector with [`DEFAULT_PAGE_SIZE`] elements per page.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates an empty vector with `page_size` elements per page.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is zero.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        assert!(page_size > 0, "page_size must be greater than zero");
        Self {
            pages: TrivialVector::new(),
            claimed: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
            page_size,
            page_lock: SpinMutex::new(()),
            write_lock: SpinMutex::new(()),
            _owns: PhantomData,
        }
    }

    /// Creates a vector with `config.page_size` elements per page and enough
    /// pages allocated for `config.initial_capacity` elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or a page allocation fails.
    pub fn from_config(config: &ContainerConfig) -> CollectionResult<Self> {
        config.validate()?;
        let vector = Self::with_page_size(config.page_size);
        let pages = config.initial_capacity.div_ceil(config.page_size);
        if pages > 0 {
            vector.ensure_page(pages - 1)?;
        }
        Ok(vector)
    }

    /// Appends a clone of `value`.
    ///
    /// # Panics
    ///
    /// Panics if a page allocation fails.
    #[inline]
    pub fn push_back(&self, value: &T)
    where
        T: Clone,
    {
        self.emplace_back(value.clone());
    }

    /// Appends `value` by move.
    ///
    /// # Panics
    ///
    /// Panics if a page allocation fails.
    #[inline]
    pub fn emplace_back(&self, value: T) {
        if let Err(e) = self.try_emplace_back(value) {
            growth_failed(&e);
        }
    }

    /// Fallible [`emplace_back`](Self::emplace_back).
    ///
    /// # Errors
    ///
    /// Returns an error if the page for the new element cannot be
    /// allocated. No index is consumed in that case and `value` is dropped.
    pub fn try_emplace_back(&self, value: T) -> CollectionResult<()> {
        let index = self.claim()?;
        let page_ref = self.page_ref(index / self.page_size);

        let _write = self.write_lock.lock();
        // SAFETY: `index` was claimed by this call only, so its slot is
        // empty and has no other writer; the page lives until `free`.
        unsafe { page_ref.page::<T>().write(index % self.page_size, value) };
        self.publish_written();
        Ok(())
    }

    /// Returns a reference to the element at `index`, or `None` if out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len.load(Ordering::Acquire) {
            return None;
        }
        let page_ref = self.page_ref(index / self.page_size);
        // SAFETY: below the published length, so the slot is written, and
        // pages are only released through `&mut self`.
        Some(unsafe { page_ref.page::<T>().get(index % self.page_size) })
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

    /// Elements per page.
    #[inline]
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of allocated pages.
    #[inline]
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Drops every element. Pages stay allocated for reuse.
    pub fn clear(&mut self) {
        let mut dropped = 0;
        for page_ref in &self.pages {
            // SAFETY: `&mut self` excludes every other access to the pages.
            dropped += unsafe { page_ref.page_mut::<T>().clear() };
        }
        *self.claimed.get_mut() = 0;
        *self.len.get_mut() = 0;
        tracing::debug!(dropped, pages = self.pages.len(), "cleared paged vector");
    }

    /// Drops every element and releases every page.
    pub fn free(&mut self) {
        let pages = std::mem::take(&mut self.pages);
        let page_count = pages.len();
        for page_ref in &pages {
            // SAFETY: `&mut self` excludes every other access, and the index
            // that held this address is discarded with `pages`.
            drop(unsafe { page_ref.into_box::<T>() });
        }
        *self.claimed.get_mut() = 0;
        *self.len.get_mut() = 0;
        if page_count > 0 {
            tracing::debug!(pages = page_count, "freed paged vector");
        }
    }

    /// Iterates over the elements published when the iterator is created.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            vector: self,
            next: 0,
            end: self.len(),
        }
    }

    /// Reserves the next index, creating its page first.
    fn claim(&self) -> CollectionResult<usize> {
        let mut next = self.claimed.load(Ordering::Acquire);
        loop {
            if next == usize::MAX {
                return Err(CollectionError::CapacityOverflow {
                    len: next,
                    additional: 1,
                });
            }
            self.ensure_page(next / self.page_size)?;
            match self.claimed.compare_exchange_weak(
                next,
                next + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(next),
                Err(current) => next = current,
            }
        }
    }

    /// Creates pages until `page_index` exists.
    fn ensure_page(&self, page_index: usize) -> CollectionResult<()> {
        if page_index < self.pages.len() {
            return Ok(());
        }
        let _page = self.page_lock.lock();
        while self.pages.len() <= page_index {
            let page_ref = PageRef::from_box(Page::<T>::try_new(self.page_size)?);
            if let Err(e) = self.pages.try_push_back(page_ref) {
                // SAFETY: never published, so this is the only copy.
                drop(unsafe { page_ref.into_box::<T>() });
                return Err(e);
            }
            tracing::trace!(page = self.pages.len() - 1, size = self.page_size, "created page");
        }
        Ok(())
    }

    /// Address of an existing page.
    #[inline]
    fn page_ref(&self, page_index: usize) -> PageRef {
        self.pages.at(page_index)
    }

    /// Advances the published length over contiguous written slots.
    ///
    /// Requires the write lock.
    fn publish_written(&self) {
        let claimed = self.claimed.load(Ordering::Acquire);
        let mut len = self.len.load(Ordering::Relaxed);
        while len < claimed {
            let page_ref = self.page_ref(len / self.page_size);
            // SAFETY: every claimed index has a page, kept until `free`.
            if !unsafe { page_ref.page::<T>() }.is_written(len % self.page_size) {
                break;
            }
            len += 1;
        }
        self.len.store(len, Ordering::Release);
    }
}

impl<T> Drop for PagedVector<T> {
    fn drop(&mut self) {
        self.free();
    }
}

impl<T> Default for PagedVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for PagedVector<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(value) => value,
            None => panic!(
                "index out of bounds: the len is {} but the index is {index}",
                self.len()
            ),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PagedVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T> IntoIterator for &'a PagedVector<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over references into a [`PagedVector`].
pub struct Iter<'a, T> {
    vector: &'a PagedVector<T>,
    next: usize,
    end: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<&'a T> {
        if self.next >= self.end {
            return None;
        }
        let value = self.vector.get(self.next);
        self.next += 1;
        value
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
