//! Property tests for alignment, disjointness and pool conservation

use nebula_alloc::allocator::{Allocator, LinearAllocator, MemoryPool, PoolConfig, StackAllocator};
use nebula_alloc::core::{AllocationFlags, MIN_ALIGNMENT};
use proptest::prelude::*;

fn request() -> impl Strategy<Value = (usize, usize)> {
    (1usize..512, 0u32..5).prop_map(|(size, shift)| (size, MIN_ALIGNMENT << shift))
}

fn assert_disjoint(blocks: &mut [(usize, usize)]) {
    blocks.sort_unstable();
    for pair in blocks.windows(2) {
        assert!(pair[0].0 + pair[0].1 <= pair[1].0, "{pair:?} overlap");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn linear_pointers_are_aligned_and_disjoint(
        requests in proptest::collection::vec(request(), 1..40),
    ) {
        let arena = LinearAllocator::new(64 * 1024).unwrap();
        let mut blocks = Vec::new();
        for (size, align) in requests {
            let ptr = arena.allocate(size, align, AllocationFlags::empty()).unwrap();
            prop_assert_eq!(ptr.as_ptr() as usize % align, 0);
            blocks.push((ptr.as_ptr() as usize, size));
        }
        assert_disjoint(&mut blocks);
    }

    #[test]
    fn stack_pointers_are_aligned_and_disjoint(
        requests in proptest::collection::vec(request(), 1..40),
    ) {
        let stack = StackAllocator::new(64 * 1024).unwrap();
        let mut blocks = Vec::new();
        for (size, align) in requests {
            let ptr = stack.allocate(size, align, AllocationFlags::empty()).unwrap();
            prop_assert_eq!(ptr.as_ptr() as usize % align, 0);
            blocks.push((ptr.as_ptr() as usize, size));
        }
        assert_disjoint(&mut blocks);
    }

    #[test]
    fn pool_conserves_blocks(
        ops in proptest::collection::vec(any::<bool>(), 1..120),
    ) {
        let pool = MemoryPool::with_config(PoolConfig::new(48, 8).with_growth(8, 64)).unwrap();
        let mut live: Vec<*mut u8> = Vec::new();
        for allocate in ops {
            if allocate {
                if let Ok(ptr) = pool.allocate(48, 16, AllocationFlags::empty()) {
                    prop_assert_eq!(ptr.as_ptr() as usize % 16, 0);
                    live.push(ptr.as_ptr());
                }
            } else if let Some(ptr) = live.pop() {
                pool.deallocate(ptr).unwrap();
            }
            prop_assert!(pool.check_conservation());
            prop_assert_eq!(pool.used_blocks(), live.len());
            prop_assert_eq!(pool.used_blocks() + pool.free_blocks(), pool.total_blocks());
        }
        let mut blocks: Vec<_> = live.iter().map(|&p| (p as usize, 48)).collect();
        assert_disjoint(&mut blocks);
    }
}
