//! Typed object pool handles and recycling

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nebula_alloc::error::ErrorKind;
use nebula_alloc::object_pool::{ObjectPool, ObjectPoolConfig};

#[derive(Debug, Default)]
struct TestItem {
    id: usize,
    payload: Vec<u8>,
}

#[test]
fn handles_share_their_pool() {
    let pool = ObjectPool::new(10, TestItem::default).unwrap();

    let item1 = pool.get().unwrap();
    let item2 = pool.get().unwrap();

    assert!(std::ptr::eq(item1.pool(), item2.pool()));
    assert!(std::ptr::eq(item1.pool(), &pool));
    assert_ne!(item1.as_ptr(), item2.as_ptr());
    assert_eq!(pool.in_use(), 2);
}

#[test]
fn exhaustion_and_recovery() {
    let pool = ObjectPool::with_config(ObjectPoolConfig::new(2).fixed(), TestItem::default).unwrap();

    let i1 = pool.get().unwrap();
    let _i2 = pool.get().unwrap();
    assert_eq!(pool.get().unwrap_err().kind(), ErrorKind::OutOfMemory);
    assert!(pool.try_acquire().is_none());

    drop(i1);
    assert!(pool.get().is_ok());
}

#[test]
fn released_objects_are_rebuilt() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let pool = ObjectPool::new(4, move || TestItem {
        id: counter.fetch_add(1, Ordering::Relaxed),
        payload: Vec::new(),
    })
    .unwrap();

    {
        let mut item = pool.get().unwrap();
        item.payload.extend_from_slice(b"dirty");
    }
    let item = pool.get().unwrap();
    assert!(item.payload.is_empty());
    assert!(item.id >= 1);

    let stats = pool.pool_stats();
    assert_eq!(stats.acquisitions, 2);
    assert_eq!(stats.releases, 1);
}

#[test]
fn into_inner_detaches_the_value() {
    let pool = ObjectPool::new(2, TestItem::default).unwrap();
    let mut item = pool.get().unwrap();
    item.id = 42;

    let value = item.into_inner();
    assert_eq!(value.id, 42);
    assert_eq!(pool.in_use(), 0);
    assert_eq!(pool.available(), pool.capacity());
}

#[test]
fn threads_share_one_pool() {
    let pool = Arc::new(ObjectPool::new(8, TestItem::default).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                for i in 0..100 {
                    let mut item = pool.get().unwrap();
                    item.id = t * 1000 + i;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.in_use(), 0);
    assert_eq!(pool.pool_stats().acquisitions, 400);
}
