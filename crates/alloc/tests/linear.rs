//! Bump allocator behaviour through the public API

use nebula_alloc::allocator::{Allocator, LinearAllocator};
use nebula_alloc::core::{AllocationFlags, align_up};
use nebula_alloc::error::ErrorKind;

#[test]
fn sequential_allocations_follow_alignment() {
    let arena = LinearAllocator::new(1024).unwrap();

    let first = arena.allocate(100, 16, AllocationFlags::empty()).unwrap();
    let second = arena.allocate(100, 16, AllocationFlags::empty()).unwrap();
    assert_eq!(
        second.as_ptr() as usize,
        align_up(first.as_ptr() as usize + 100, 16)
    );

    let err = arena.allocate(900, 16, AllocationFlags::empty()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);

    arena.reset();
    let again = arena.allocate(100, 16, AllocationFlags::empty()).unwrap();
    assert_eq!(again, first);
    assert_eq!(arena.allocation_count(), 1);
}

#[test]
fn reset_replays_the_same_pointers() {
    let arena = LinearAllocator::new(4096).unwrap();
    let requests = [(24, 8), (100, 64), (7, 8), (300, 32), (16, 16)];

    let run = || {
        requests
            .iter()
            .map(|&(size, align)| {
                arena
                    .allocate(size, align, AllocationFlags::empty())
                    .unwrap()
                    .as_ptr() as usize
            })
            .collect::<Vec<_>>()
    };

    let first = run();
    arena.reset();
    let second = run();
    assert_eq!(first, second);
    for (&(_, align), address) in requests.iter().zip(&first) {
        assert_eq!(address % align, 0);
    }
}

#[test]
fn scope_rewinds_after_reallocating_an_older_block() {
    let arena = LinearAllocator::new(1024).unwrap();
    let first = arena.allocate(100, 16, AllocationFlags::empty()).unwrap();
    let used = arena.used();

    {
        let _scope = arena.scope();
        let moved = arena.reallocate(first.as_ptr(), 100, 200, 16).unwrap();
        assert_ne!(moved, first);
        arena.allocate(50, 16, AllocationFlags::empty()).unwrap();
    }

    assert_eq!(arena.allocation_count(), 1);
    assert_eq!(arena.used(), used);
}

#[test]
fn tail_resizes_in_place_inside_its_own_scope() {
    let arena = LinearAllocator::new(1024).unwrap();
    arena.allocate(64, 16, AllocationFlags::empty()).unwrap();
    let used = arena.used();

    {
        let _scope = arena.scope();
        let block = arena.allocate(100, 16, AllocationFlags::empty()).unwrap();
        let grown = arena.reallocate(block.as_ptr(), 100, 300, 16).unwrap();
        assert_eq!(grown, block);
    }

    assert_eq!(arena.used(), used);
}

#[test]
fn alignment_below_pointer_width_is_rejected() {
    let arena = LinearAllocator::new(256).unwrap();
    let err = arena.allocate(8, 1, AllocationFlags::empty()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAlignment);
    assert_eq!(arena.used(), 0);
}

#[test]
fn scopes_release_nested_work() {
    let arena = LinearAllocator::new(2048).unwrap();
    arena.alloc(64).unwrap();
    let used = arena.used();

    {
        let _scope = arena.scope();
        arena.alloc(512).unwrap();
        arena.alloc(512).unwrap();
        assert!(arena.used() > used);
    }

    assert_eq!(arena.used(), used);
    assert_eq!(arena.allocation_count(), 1);
}

#[test]
fn introspection_reports_usage() {
    let arena = LinearAllocator::new(1024).unwrap();
    let ptr = arena.allocate(256, 16, AllocationFlags::empty()).unwrap();

    assert!(arena.contains(ptr.as_ptr()));
    assert_eq!(arena.block_info(ptr.as_ptr()).unwrap().size, 256);
    assert!(arena.validate());
    assert!(arena.dump_allocations().contains("1 live allocation(s)"));
    assert!(arena.peak_memory() >= 256);
}
