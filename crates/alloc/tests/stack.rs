//! LIFO allocator behaviour through the public API

use nebula_alloc::allocator::{Allocator, StackAllocator};
use nebula_alloc::core::AllocationFlags;
use nebula_alloc::error::ErrorKind;

#[test]
fn popping_a_marker_restores_the_cursor() {
    let stack = StackAllocator::new(4096).unwrap();
    stack.allocate(64, 16, AllocationFlags::empty()).unwrap();

    let used = stack.used();
    let count = stack.allocation_count();
    let marker = stack.push_marker().unwrap();

    for size in [32, 128, 8] {
        stack.allocate(size, 16, AllocationFlags::empty()).unwrap();
    }
    assert_eq!(stack.allocation_count(), count + 3);

    stack.pop_to_marker(marker).unwrap();
    assert_eq!(stack.used(), used);
    assert_eq!(stack.allocation_count(), count);

    let err = stack.pop_to_marker(marker).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StackUnderflow);
}

#[test]
fn nested_markers_unwind_together() {
    let stack = StackAllocator::new(4096).unwrap();
    let outer = stack.push_marker().unwrap();
    stack.allocate(100, 8, AllocationFlags::empty()).unwrap();
    let _inner = stack.push_marker().unwrap();
    stack.allocate(100, 8, AllocationFlags::empty()).unwrap();
    assert_eq!(stack.marker_depth(), 2);

    stack.pop_to_marker(outer).unwrap();
    assert_eq!(stack.marker_depth(), 0);
    assert_eq!(stack.used(), 0);
}

#[test]
fn frees_must_be_lifo() {
    let stack = StackAllocator::new(1024).unwrap();
    let a = stack.allocate(32, 16, AllocationFlags::empty()).unwrap();
    let b = stack.allocate(32, 16, AllocationFlags::empty()).unwrap();

    assert!(stack.deallocate(a.as_ptr()).is_err());
    stack.deallocate(b.as_ptr()).unwrap();
    stack.deallocate(a.as_ptr()).unwrap();
    assert_eq!(stack.used(), 0);
}

#[test]
fn reset_replays_the_same_pointers() {
    let stack = StackAllocator::new(4096).unwrap();
    let run = || {
        [(40, 8), (200, 64), (1, 8), (90, 16)]
            .iter()
            .map(|&(size, align)| {
                stack
                    .allocate(size, align, AllocationFlags::empty())
                    .unwrap()
                    .as_ptr() as usize
            })
            .collect::<Vec<_>>()
    };

    let first = run();
    stack.reset();
    assert_eq!(run(), first);
}

#[test]
fn overflow_is_reported() {
    let stack = StackAllocator::new(256).unwrap();
    let err = stack.allocate(4096, 16, AllocationFlags::empty()).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::StackOverflow | ErrorKind::OutOfMemory
    ));
    assert_eq!(stack.overflow_count(), 1);
}

#[test]
fn frames_record_their_allocations() {
    let stack = StackAllocator::new(4096).unwrap();
    let frame = stack.push_frame("parse").unwrap();
    stack.allocate(48, 16, AllocationFlags::empty()).unwrap();
    stack.allocate(16, 16, AllocationFlags::empty()).unwrap();

    assert_eq!(stack.current_frame().unwrap().name, "parse");
    let closed = stack.pop_frame(frame).unwrap();
    assert_eq!(closed.allocation_count, 2);
    assert_eq!(closed.total_size, 64);
    assert!(stack.frames().is_empty());
}
