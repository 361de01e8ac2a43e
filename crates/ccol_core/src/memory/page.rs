//! # Pages
//!
//! Fixed-capacity blocks that never move once allocated.
//!
//! A [`Page`] is allocated at its final size and is never resized, so a
//! reference to an element inside it stays valid until the page itself is
//! dropped. Every slot tracks whether it holds a constructed value, which is
//! what lets the paged vector run each destructor exactly once.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};

use bytemuck::Zeroable;

use crate::error::CollectionResult;

/// One element slot of a page.
struct PageSlot<T> {
    /// Set (Release) once `value` holds a constructed element.
    written: AtomicBool,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A fixed-size block of element slots.
pub(crate) struct Page<T> {
    slots: Box<[PageSlot<T>]>,
}

impl<T> Page<T> {
    /// Allocates a page of `size` empty slots.
    pub(crate) fn try_new(size: usize) -> CollectionResult<Box<Self>> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(size)?;
        slots.resize_with(size, || PageSlot {
            written: AtomicBool::new(false),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        });
        Ok(Box::new(Self {
            slots: slots.into_boxed_slice(),
        }))
    }

    /// Returns `true` once `offset` holds a constructed element.
    #[inline]
    pub(crate) fn is_written(&self, offset: usize) -> bool {
        self.slots[offset].written.load(Ordering::Acquire)
    }

    /// Moves `value` into the empty slot at `offset`.
    ///
    /// # Safety
    ///
    /// The caller must be the only writer of `offset` and the slot must be
    /// empty (never written, or emptied by [`clear`](Self::clear)).
    pub(crate) unsafe fn write(&self, offset: usize, value: T) {
        let slot = &self.slots[offset];
        debug_assert!(!slot.written.load(Ordering::Relaxed), "page slot written twice");
        (*slot.value.get()).write(value);
        slot.written.store(true, Ordering::Release);
    }

    /// Returns the element at `offset`.
    ///
    /// # Safety
    ///
    /// The slot must be written and must stay written while the returned
    /// reference lives.
    #[inline]
    pub(crate) unsafe fn get(&self, offset: usize) -> &T {
        debug_assert!(self.is_written(offset));
        (*self.slots[offset].value.get()).assume_init_ref()
    }

    /// Drops every constructed element and marks all slots empty.
    ///
    /// Returns the number of elements dropped.
    pub(crate) fn clear(&mut self) -> usize {
        let mut dropped = 0;
        for slot in self.slots.iter_mut() {
            if *slot.written.get_mut() {
                // SAFETY: the flag says the value is initialized; `&mut self`
                // means nobody else can observe it, and the flag is cleared
                // right after so it is dropped once.
                unsafe { slot.value.get_mut().assume_init_drop() };
                *slot.written.get_mut() = false;
                dropped += 1;
            }
        }
        dropped
    }
}

impl<T> Drop for Page<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Type-erased, copyable reference to a heap page.
///
/// Stored in the page index (a `TrivialVector`), which only holds plain
/// bit-copyable values. The paged vector owns the pages: it creates them
/// with [`PageRef::from_box`] and frees each exactly once with
/// [`PageRef::into_box`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub(crate) struct PageRef(*const ());

// SAFETY: the all-zero bit pattern is the null pointer, a valid (unused) value.
unsafe impl Zeroable for PageRef {}

// SAFETY: a PageRef is an address. Access to the page it names goes through
// the paged vector, whose Send/Sync bounds cover the element type.
unsafe impl Send for PageRef {}
// SAFETY: see the Send impl above.
unsafe impl Sync for PageRef {}

impl PageRef {
    /// Leaks `page` and returns a reference to it.
    pub(crate) fn from_box<T>(page: Box<Page<T>>) -> Self {
        Self(Box::into_raw(page).cast::<()>().cast_const())
    }

    /// Borrows the page.
    ///
    /// # Safety
    ///
    /// `self` must come from [`from_box`](Self::from_box) with the same `T`
    /// and the page must not be freed during `'a`.
    #[inline]
    pub(crate) unsafe fn page<'a, T>(self) -> &'a Page<T> {
        &*self.0.cast::<Page<T>>()
    }

    /// Borrows the page mutably.
    ///
    /// # Safety
    ///
    /// Same as [`page`](Self::page), and no other reference to the page may
    /// exist during `'a`.
    #[inline]
    pub(crate) unsafe fn page_mut<'a, T>(self) -> &'a mut Page<T> {
        &mut *self.0.cast::<Page<T>>().cast_mut()
    }

    /// Takes ownership of the page back.
    ///
    /// # Safety
    ///
    /// Same as [`page`](Self::page), and no copy of `self` may be used
    /// afterwards.
    pub(crate) unsafe fn into_box<T>(self) -> Box<Page<T>> {
        Box::from_raw(self.0.cast::<Page<T>>().cast_mut())
    }
}
