//! Allocator benchmarks
//!
//! Compares the linear, stack and pool strategies against the system
//! allocator, with and without a tracker attached.

use std::alloc::Layout;
use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use nebula_alloc::allocator::{Allocator, LinearAllocator, MemoryPool, StackAllocator};
use nebula_alloc::core::AllocationFlags;
use nebula_alloc::object_pool::ObjectPool;
use nebula_alloc::tracker::{MemoryTracker, TrackerConfig};

const FLAGS: AllocationFlags = AllocationFlags::empty();

/// Single allocation/deallocation cycle
fn bench_single_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_allocation");

    group.bench_function("linear_64b", |b| {
        let arena = LinearAllocator::performance(1024 * 1024).unwrap();
        b.iter(|| {
            let ptr = arena.allocate(64, 8, FLAGS).unwrap();
            black_box(ptr);
            arena.reset();
        });
    });

    group.bench_function("stack_64b", |b| {
        let stack = StackAllocator::performance(1024 * 1024).unwrap();
        b.iter(|| {
            let ptr = stack.allocate(64, 8, FLAGS).unwrap();
            stack.deallocate(black_box(ptr.as_ptr())).unwrap();
        });
    });

    group.bench_function("pool_64b", |b| {
        let pool = MemoryPool::new(64, 1024).unwrap();
        b.iter(|| {
            let ptr = pool.allocate(64, 8, FLAGS).unwrap();
            pool.deallocate(black_box(ptr.as_ptr())).unwrap();
        });
    });

    // Baseline
    group.bench_function("system_64b", |b| {
        let layout = Layout::from_size_align(64, 8).unwrap();
        b.iter(|| unsafe {
            let ptr = std::alloc::alloc(layout);
            std::alloc::dealloc(black_box(ptr), layout);
        });
    });

    group.finish();
}

/// Batches of 100 allocations released together
fn bench_batch_allocations(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_allocations");
    group.throughput(Throughput::Elements(100));

    group.bench_function("linear_100x64b", |b| {
        let arena = LinearAllocator::performance(1024 * 1024).unwrap();
        b.iter(|| {
            for _ in 0..100 {
                black_box(arena.allocate(64, 8, FLAGS).unwrap());
            }
            arena.reset();
        });
    });

    group.bench_function("stack_100x64b_marker", |b| {
        let stack = StackAllocator::performance(1024 * 1024).unwrap();
        b.iter(|| {
            let marker = stack.push_marker().unwrap();
            for _ in 0..100 {
                black_box(stack.allocate(64, 8, FLAGS).unwrap());
            }
            stack.pop_to_marker(marker).unwrap();
        });
    });

    group.bench_function("pool_100x64b", |b| {
        let pool = MemoryPool::new(64, 128).unwrap();
        let mut ptrs = Vec::with_capacity(100);
        b.iter(|| {
            for _ in 0..100 {
                ptrs.push(pool.allocate(64, 8, FLAGS).unwrap());
            }
            for ptr in ptrs.drain(..) {
                pool.deallocate(ptr.as_ptr()).unwrap();
            }
        });
    });

    group.finish();
}

/// Bump allocation across request sizes
fn bench_allocation_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation_sizes");

    for size in &[16usize, 64, 256, 1024, 4096] {
        group.bench_with_input(BenchmarkId::new("linear", size), size, |b, &size| {
            let arena = LinearAllocator::performance(1024 * 1024).unwrap();
            b.iter(|| {
                black_box(arena.allocate(size, 16, FLAGS).unwrap());
                arena.reset();
            });
        });

        group.bench_with_input(BenchmarkId::new("pool", size), size, |b, &size| {
            let pool = MemoryPool::new(size, 64).unwrap();
            b.iter(|| {
                let ptr = pool.allocate(size, 16, FLAGS).unwrap();
                pool.deallocate(black_box(ptr.as_ptr())).unwrap();
            });
        });
    }

    group.finish();
}

/// Object pool reuse against fresh boxing
fn bench_object_reuse(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_reuse");

    group.bench_function("object_pool_vec", |b| {
        let pool = ObjectPool::new(64, || Vec::<u64>::with_capacity(32)).unwrap();
        b.iter(|| {
            let mut items = pool.get().unwrap();
            items.push(black_box(7));
        });
    });

    group.bench_function("box_vec", |b| {
        b.iter(|| {
            let mut items = Box::new(Vec::<u64>::with_capacity(32));
            items.push(black_box(7));
        });
    });

    group.finish();
}

/// Cost of an attached tracker on pool traffic
fn bench_tracking_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracking_overhead");

    group.bench_function("pool_untracked", |b| {
        let pool = MemoryPool::new(64, 1024).unwrap();
        b.iter(|| {
            let ptr = pool.allocate(64, 8, FLAGS).unwrap();
            pool.deallocate(black_box(ptr.as_ptr())).unwrap();
        });
    });

    group.bench_function("pool_tracked", |b| {
        let pool = Arc::new(MemoryPool::new(64, 1024).unwrap());
        let tracker = Arc::new(MemoryTracker::with_config(TrackerConfig::performance()).unwrap());
        tracker.initialize().unwrap();
        tracker.attach(&pool);
        b.iter(|| {
            let ptr = pool.allocate(64, 8, FLAGS).unwrap();
            pool.deallocate(black_box(ptr.as_ptr())).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_allocation,
    bench_batch_allocations,
    bench_allocation_sizes,
    bench_object_reuse,
    bench_tracking_overhead,
);

criterion_main!(benches);
