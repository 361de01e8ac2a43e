//! `DoubleBufferQueue` hand-off between producers and a consumer.

use ccol_core::{PagedQueue, TrivialQueue};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_swap_publishes_batch() {
    let queue = TrivialQueue::<i32>::new();
    for i in 0..3 {
        queue.push_back(i);
    }
    assert_eq!(queue.front_len(), 0);

    queue.swap_buffers();
    {
        let front = queue.read();
        assert_eq!(front.len(), 3);
        assert_eq!(front.to_vec(), vec![0, 1, 2]);
    }

    queue.swap_buffers();
    assert_eq!(queue.front_len(), 0);
}

#[test]
fn test_producer_consumer() {
    let total = 100_000_usize;
    let queue = Arc::new(TrivialQueue::<usize>::new());
    // Counted before each push, so it bounds what a swap can have taken.
    let started = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let queue = Arc::clone(&queue);
        let started = Arc::clone(&started);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..total {
                started.fetch_add(1, Ordering::Release);
                queue.push_back(i);
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut received = 0;
    let mut last_first: Option<usize> = None;
    loop {
        let finished = done.load(Ordering::Acquire);
        queue.swap_buffers();
        let front = queue.read();
        let len = front.len();
        assert!(received + len <= started.load(Ordering::Acquire));
        if let Some(first) = front.get(0) {
            // Each batch starts where the previous one ended and holds
            // consecutive values.
            assert_eq!(first, received);
            assert_eq!(front.get(len - 1), Some(received + len - 1));
            if let Some(last) = last_first {
                assert!(first > last);
            }
            last_first = Some(first);
            received += len;
        }
        drop(front);
        if finished && queue.is_back_buffer_empty() {
            break;
        }
    }

    producer.join().unwrap();
    assert_eq!(received, total);
}

#[test]
fn test_many_producers_paged() {
    let num_producers = 4;
    let per_producer = 2_000;
    let queue = Arc::new(PagedQueue::<String>::new());

    let producers: Vec<_> = (0..num_producers)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..per_producer {
                    queue.push_back(format!("{p}:{i}"));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert!(queue.try_swap_buffers());
    let front = queue.read();
    assert_eq!(front.len(), num_producers * per_producer);
    assert!(front.iter().any(|line| line == "3:1999"));
}
