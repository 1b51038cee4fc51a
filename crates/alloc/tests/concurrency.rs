//! Allocators and the tracker shared between threads

use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use nebula_alloc::allocator::{Allocator, LinearAllocator, MemoryPool, StackAllocator};
use nebula_alloc::core::AllocationFlags;
use nebula_alloc::tracker::{MemoryTracker, TrackerConfig};

const THREADS: usize = 8;

fn assert_disjoint(mut blocks: Vec<(usize, usize)>) {
    blocks.sort_unstable();
    for pair in blocks.windows(2) {
        assert!(pair[0].0 + pair[0].1 <= pair[1].0, "{pair:?} overlap");
    }
}

#[test]
fn pool_conserves_blocks_under_contention() {
    let pool = MemoryPool::new(64, 256).unwrap();
    let barrier = Barrier::new(THREADS);
    let held = Mutex::new(Vec::new());

    thread::scope(|s| {
        for t in 0..THREADS {
            let (pool, barrier, held) = (&pool, &barrier, &held);
            s.spawn(move || {
                let tag = t as u8 + 1;
                for _ in 0..500 {
                    let ptr = pool.allocate(64, 8, AllocationFlags::empty()).unwrap();
                    unsafe { ptr.as_ptr().write_bytes(tag, 64) };
                    thread::yield_now();
                    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 64) };
                    assert!(bytes.iter().all(|&b| b == tag), "block shared between threads");
                    pool.deallocate(ptr.as_ptr()).unwrap();
                }

                let mine: Vec<_> = (0..16)
                    .map(|_| pool.allocate(64, 8, AllocationFlags::empty()).unwrap())
                    .collect();
                barrier.wait();
                held.lock()
                    .unwrap()
                    .extend(mine.iter().map(|ptr| (ptr.as_ptr() as usize, 64)));
                barrier.wait();
                for ptr in mine {
                    pool.deallocate(ptr.as_ptr()).unwrap();
                }
            });
        }
    });

    let held = held.into_inner().unwrap();
    assert_eq!(held.len(), THREADS * 16);
    assert_disjoint(held);

    assert!(pool.check_conservation());
    assert_eq!(pool.used_blocks(), 0);
    assert_eq!(pool.free_blocks(), pool.total_blocks());
    assert_eq!(pool.pool_stats().double_free_count, 0);
}

#[test]
fn linear_hands_out_disjoint_ranges_to_every_thread() {
    let arena = LinearAllocator::new(512 * 1024).unwrap();
    let blocks = Mutex::new(Vec::new());

    thread::scope(|s| {
        for t in 0..THREADS {
            let (arena, blocks) = (&arena, &blocks);
            s.spawn(move || {
                let mut mine = Vec::new();
                for i in 0..100 {
                    let size = 8 + (t * 31 + i * 17) % 200;
                    let align = 8 << (i % 4);
                    let ptr = arena.allocate(size, align, AllocationFlags::empty()).unwrap();
                    assert_eq!(ptr.as_ptr() as usize % align, 0);
                    mine.push((ptr.as_ptr() as usize, size));
                }
                blocks.lock().unwrap().extend(mine);
            });
        }
    });

    let blocks = blocks.into_inner().unwrap();
    assert_eq!(blocks.len(), THREADS * 100);
    assert_eq!(arena.allocation_count(), THREADS * 100);
    assert_disjoint(blocks);

    arena.reset();
    assert_eq!(arena.used(), 0);
}

#[test]
fn stack_allocations_from_many_threads_do_not_overlap() {
    let stack = StackAllocator::new(256 * 1024).unwrap();
    let blocks = Mutex::new(Vec::new());

    thread::scope(|s| {
        for t in 0..THREADS {
            let (stack, blocks) = (&stack, &blocks);
            s.spawn(move || {
                let mine: Vec<_> = (0..50)
                    .map(|i| {
                        let size = 16 + (t * 13 + i * 7) % 128;
                        let ptr = stack.allocate(size, 16, AllocationFlags::empty()).unwrap();
                        (ptr.as_ptr() as usize, size)
                    })
                    .collect();
                blocks.lock().unwrap().extend(mine);
            });
        }
    });

    let blocks = blocks.into_inner().unwrap();
    assert_eq!(stack.allocation_count(), THREADS * 50);
    assert!(stack.validate());
    assert_disjoint(blocks);

    stack.reset();
    assert_eq!(stack.used(), 0);
}

#[test]
fn tracker_totals_balance_after_threads_join() {
    let pool = Arc::new(MemoryPool::new(32, 1024).unwrap());
    let tracker = Arc::new(
        MemoryTracker::with_config(TrackerConfig::production().with_name("threads")).unwrap(),
    );
    tracker.initialize().unwrap();
    tracker.attach(&pool);

    thread::scope(|s| {
        for t in 0..THREADS {
            let pool = &pool;
            s.spawn(move || {
                let mut live = Vec::new();
                for i in 0..200 {
                    live.push(pool.allocate(32, 8, AllocationFlags::empty()).unwrap());
                    if i % 3 != 0 {
                        let ptr = live.swap_remove((t + i) % live.len());
                        pool.deallocate(ptr.as_ptr()).unwrap();
                    }
                }
                // Whatever is still in `live` stays allocated and shows up as leaks
            });
        }
    });

    let stats = tracker.statistics();
    assert_eq!(stats.total_allocations, (THREADS * 200) as u64);
    assert_eq!(
        stats.total_allocations - stats.total_deallocations,
        tracker.live_allocations() as u64
    );
    assert_eq!(tracker.live_allocations(), pool.used_blocks());
    assert_eq!(stats.double_free_detections, 0);
    assert_eq!(stats.invalid_free_detections, 0);

    let leaks = tracker.detect_leaks().unwrap();
    assert_eq!(leaks.leak_count(), pool.used_blocks());
}
