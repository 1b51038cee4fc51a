//! Fixed-block pool behaviour through the public API

use nebula_alloc::allocator::{Allocator, MemoryPool, PoolConfig};
use nebula_alloc::core::AllocationFlags;
use nebula_alloc::error::ErrorKind;

fn take(pool: &MemoryPool) -> *mut u8 {
    pool.allocate(64, 8, AllocationFlags::empty()).unwrap().as_ptr()
}

#[test]
fn exhaustion_then_reuse_of_freed_block() {
    let pool = MemoryPool::new(64, 4).unwrap();
    let blocks: Vec<_> = (0..4).map(|_| take(&pool)).collect();

    let err = pool.allocate(64, 8, AllocationFlags::empty()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);

    pool.deallocate(blocks[1]).unwrap();
    assert_eq!(take(&pool), blocks[1]);
    assert!(pool.check_conservation());
}

#[test]
fn double_free_keeps_the_free_list_consistent() {
    let pool = MemoryPool::new(32, 8).unwrap();
    let a = pool.allocate(32, 8, AllocationFlags::empty()).unwrap().as_ptr();
    let _b = pool.allocate(32, 8, AllocationFlags::empty()).unwrap();

    pool.deallocate(a).unwrap();
    let free_before = pool.free_blocks();

    let err = pool.deallocate(a).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DoubleFree);
    assert_eq!(pool.free_blocks(), free_before);
    assert!(pool.validate_free_list().is_ok());
    assert_eq!(pool.pool_stats().double_free_count, 1);
}

#[test]
fn random_free_order_recycles_every_block() {
    let pool = MemoryPool::new(64, 32).unwrap();
    let mut live: Vec<_> = (0..32).map(|_| take(&pool)).collect();

    while !live.is_empty() {
        let index = (rand::random::<u64>() % live.len() as u64) as usize;
        pool.deallocate(live.swap_remove(index)).unwrap();
        assert!(pool.check_conservation());
    }
    assert_eq!(pool.free_blocks(), 32);

    let again: Vec<_> = (0..32).map(|_| take(&pool)).collect();
    assert_eq!(again.len(), 32);
    assert_eq!(pool.used_blocks(), 32);
}

#[test]
fn growth_adds_chunks_until_the_limit() {
    let pool = MemoryPool::with_config(PoolConfig::new(16, 2).with_growth(2, 4)).unwrap();
    let blocks: Vec<_> = (0..4)
        .map(|_| pool.allocate(16, 8, AllocationFlags::empty()).unwrap().as_ptr())
        .collect();
    assert_eq!(pool.total_blocks(), 4);
    assert!(pool.allocate(16, 8, AllocationFlags::empty()).is_err());

    for block in blocks {
        pool.deallocate(block).unwrap();
    }
    pool.shrink();
    assert_eq!(pool.total_blocks(), 2);
    assert!(pool.check_conservation());
}

#[test]
fn typed_pool_fits_values() {
    #[repr(align(32))]
    struct Wide([u8; 96]);

    let pool = MemoryPool::for_type::<Wide>(4).unwrap();
    assert!(pool.block_size() >= core::mem::size_of::<Wide>());
    let ptr = pool
        .allocate(
            core::mem::size_of::<Wide>(),
            core::mem::align_of::<Wide>(),
            AllocationFlags::empty(),
        )
        .unwrap();
    assert_eq!(ptr.as_ptr() as usize % 32, 0);
}

#[test]
fn dumps_describe_blocks() {
    let pool = MemoryPool::new(64, 4).unwrap();
    take(&pool);
    assert!(pool.dump_chunks().contains("chunk"));
    assert!(pool.dump_statistics().contains("Pool Statistics:"));
}
