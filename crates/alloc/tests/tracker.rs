//! Tracker attached to live allocators

use std::sync::Arc;

use nebula_alloc::allocator::{Allocator, LinearAllocator, MemoryPool, StackAllocator};
use nebula_alloc::core::AllocationFlags;
use nebula_alloc::error::ErrorKind;
use nebula_alloc::logging::RecordingLogger;
use nebula_alloc::tracker::{MemoryTracker, ReportFormat, TrackerConfig};

fn tracker() -> (Arc<MemoryTracker>, Arc<RecordingLogger>) {
    let logger = Arc::new(RecordingLogger::new());
    let tracker = MemoryTracker::with_config(TrackerConfig::debug().with_name("integration"))
        .unwrap()
        .with_logger(logger.clone());
    tracker.initialize().unwrap();
    (Arc::new(tracker), logger)
}

#[test]
fn leaks_are_unfreed_pool_blocks() {
    let (tracker, _) = tracker();
    let pool = Arc::new(MemoryPool::new(128, 16).unwrap());
    tracker.attach(&pool);

    let blocks: Vec<_> = (0..10)
        .map(|_| pool.allocate(100, 16, AllocationFlags::empty()).unwrap())
        .collect();
    for block in &blocks[..7] {
        pool.deallocate(block.as_ptr()).unwrap();
    }

    let report = tracker.detect_leaks().unwrap();
    assert_eq!(report.leak_count(), 3);
    for leak in &report.leaks {
        assert!(blocks[7..].iter().any(|b| b.as_ptr() as usize == leak.address()));
    }
    assert_eq!(report.total_bytes(), 300);
}

#[test]
fn one_tracker_many_allocators() {
    let (tracker, _) = tracker();
    let arena = Arc::new(LinearAllocator::new(4096).unwrap());
    let stack = Arc::new(StackAllocator::new(4096).unwrap());
    let pool = Arc::new(MemoryPool::new(64, 8).unwrap());
    tracker.attach(&arena);
    tracker.attach(&stack);
    tracker.attach(&pool);
    assert_eq!(tracker.attached_allocators().len(), 3);

    arena.allocate(256, 16, AllocationFlags::empty()).unwrap();
    let top = stack.allocate(128, 16, AllocationFlags::empty()).unwrap();
    pool.allocate(64, 8, AllocationFlags::empty()).unwrap();
    assert_eq!(tracker.live_allocations(), 3);

    stack.deallocate(top.as_ptr()).unwrap();
    arena.reset();
    assert_eq!(tracker.live_allocations(), 1);

    let leaks = tracker.detect_leaks().unwrap();
    assert_eq!(leaks.by_allocator()[0].key, pool.tag().to_string());

    let stats = tracker.statistics();
    assert_eq!(stats.total_allocations, 3);
    assert_eq!(stats.total_deallocations, 2);
    assert_eq!(stats.peak_bytes, 256 + 128 + 64);
}

#[test]
fn dropped_allocator_is_skipped_by_corruption_scan() {
    let (tracker, _) = tracker();
    {
        let pool = Arc::new(MemoryPool::new(32, 4).unwrap());
        tracker.attach(&pool);
        pool.allocate(16, 8, AllocationFlags::empty()).unwrap();
    }
    assert!(tracker.attached_allocators().is_empty());

    let report = tracker.detect_corruption().unwrap();
    assert_eq!(report.checked, 1);
    assert!(report.is_clean());
}

#[test]
fn destroy_logs_leaks_and_stops_tracking() {
    let (tracker, logger) = tracker();
    let pool = Arc::new(MemoryPool::new(32, 4).unwrap());
    tracker.attach(&pool);
    pool.allocate(16, 8, AllocationFlags::empty()).unwrap();

    let report = tracker.destroy().unwrap();
    assert_eq!(report.leak_count(), 1);
    assert_eq!(logger.count("leak"), 2);
    assert!(pool.hooks().is_empty());

    assert_eq!(
        tracker.generate_report(ReportFormat::Text).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
}

#[test]
fn reports_written_in_every_format() {
    let (tracker, _) = tracker();
    let pool = Arc::new(MemoryPool::new(64, 4).unwrap());
    tracker.attach(&pool);
    let ptr = pool.allocate(40, 8, AllocationFlags::empty()).unwrap();
    let address = format!("{:#x}", ptr.as_ptr() as usize);

    let dir = tempfile::tempdir().unwrap();
    for format in [
        ReportFormat::Text,
        ReportFormat::Json,
        ReportFormat::Csv,
        ReportFormat::Html,
        ReportFormat::Xml,
    ] {
        let path = dir.path().join(format!("tracker.{}", format.extension()));
        tracker.write_report(&path, format).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains(&address), "{format} report lacks the address");
        assert!(contents.contains("tracker.rs"), "{format} report lacks the location");
    }
}
