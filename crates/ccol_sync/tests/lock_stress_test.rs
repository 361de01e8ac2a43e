//! Stress tests for the spin locks under many threads.

#![allow(unsafe_code)]

use ccol_sync::lock_api::RawMutex;
use ccol_sync::{RawSpinLock, SharedSpinLock, SpinMutex};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_spin_mutex_counter_is_exact() {
    let num_threads = 8;
    let increments = 20_000;
    let counter = Arc::new(SpinMutex::new(0_usize));
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let counter = Arc::clone(&counter);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..increments {
                    *counter.lock() += 1;
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(*counter.lock(), num_threads * increments);
}

#[test]
fn test_raw_lock_never_has_two_holders() {
    let num_threads = 6;
    let rounds = 10_000;
    let lock = Arc::new(RawSpinLock::new());
    let holders = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let holders = Arc::clone(&holders);
            let violations = Arc::clone(&violations);
            thread::spawn(move || {
                for _ in 0..rounds {
                    lock.lock();
                    if holders.fetch_add(1, Ordering::SeqCst) != 0 {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    holders.fetch_sub(1, Ordering::SeqCst);
                    // SAFETY: acquired at the top of the loop body.
                    unsafe { lock.unlock() };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert!(!lock.is_locked());
}

/// Plain counter whose increments are only sound under the lock.
struct Unguarded(UnsafeCell<u64>);

// SAFETY: every access in the test below happens under the write lock.
unsafe impl Sync for Unguarded {}

#[test]
fn test_shared_lock_readers_and_writers_never_overlap() {
    let lock = Arc::new(SharedSpinLock::new(()));
    let writer_active = Arc::new(AtomicBool::new(false));
    let readers_active = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));
    let value = Arc::new(Unguarded(UnsafeCell::new(0)));
    let num_readers = 4;
    let num_writers = 2;
    let rounds = 5_000;
    let barrier = Arc::new(Barrier::new(num_readers + num_writers));

    let mut handles = Vec::new();

    for _ in 0..num_readers {
        let lock = Arc::clone(&lock);
        let writer_active = Arc::clone(&writer_active);
        let readers_active = Arc::clone(&readers_active);
        let violations = Arc::clone(&violations);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..rounds {
                let _guard = lock.read();
                readers_active.fetch_add(1, Ordering::SeqCst);
                if writer_active.load(Ordering::SeqCst) {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                readers_active.fetch_sub(1, Ordering::SeqCst);
            }
        }));
    }

    for _ in 0..num_writers {
        let lock = Arc::clone(&lock);
        let writer_active = Arc::clone(&writer_active);
        let readers_active = Arc::clone(&readers_active);
        let violations = Arc::clone(&violations);
        let value = Arc::clone(&value);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..rounds {
                let _guard = lock.write();
                if writer_active.swap(true, Ordering::SeqCst) {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                if readers_active.load(Ordering::SeqCst) != 0 {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                // SAFETY: exclusive holder of the write lock.
                unsafe { *value.0.get() += 1 };
                writer_active.store(false, Ordering::SeqCst);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    let guard = lock.write();
    // SAFETY: exclusive holder of the write lock, all writers joined.
    assert_eq!(unsafe { *value.0.get() }, (num_writers * rounds) as u64);
    drop(guard);
    assert!(!lock.is_locked());
}
