//! # Lock Benchmark
//!
//! Uncontended acquire/release cost of the spin locks against
//! `parking_lot`'s parking locks. The spin locks exist because this number
//! has to stay in the low nanoseconds.

#![allow(missing_docs)]

use ccol_sync::{SharedSpinLock, SpinMutex};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_exclusive(c: &mut Criterion) {
    let mut group = c.benchmark_group("exclusive_lock");

    let spin = SpinMutex::new(0_u64);
    group.bench_function("spin_mutex", |b| {
        b.iter(|| {
            *spin.lock() += 1;
            black_box(&spin);
        });
    });

    let parking = parking_lot::Mutex::new(0_u64);
    group.bench_function("parking_lot_mutex", |b| {
        b.iter(|| {
            *parking.lock() += 1;
            black_box(&parking);
        });
    });

    group.finish();
}

fn bench_shared(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared_lock");

    let spin = SharedSpinLock::new(42_u64);
    group.bench_function("spin_read", |b| {
        b.iter(|| black_box(*spin.read()));
    });
    group.bench_function("spin_write", |b| {
        b.iter(|| {
            *spin.write() += 1;
        });
    });

    let parking = parking_lot::RwLock::new(42_u64);
    group.bench_function("parking_lot_read", |b| {
        b.iter(|| black_box(*parking.read()));
    });

    group.finish();
}

criterion_group!(benches, bench_exclusive, bench_shared);
criterion_main!(benches);
