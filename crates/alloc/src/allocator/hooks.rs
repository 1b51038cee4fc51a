//! Allocation observers
//!
//! Each allocator owns an [`AllocatorHooks`] list. Notifications run on the
//! thread that performed the operation, after the allocator's state lock has
//! been released.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::AllocatorTag;
use crate::registry::MemoryBlock;

/// Receives allocation events from one or more allocators
///
/// Every method defaults to doing nothing.
pub trait AllocationObserver: Send + Sync {
    /// A block was handed out
    fn on_allocate(&self, tag: &AllocatorTag, block: &MemoryBlock) {
        let _ = (tag, block);
    }

    /// A block was released individually
    fn on_deallocate(&self, tag: &AllocatorTag, block: &MemoryBlock) {
        let _ = (tag, block);
    }

    /// A block was resized, in place or by moving
    fn on_reallocate(&self, tag: &AllocatorTag, old: &MemoryBlock, new: &MemoryBlock) {
        let _ = (tag, old, new);
    }

    /// Blocks were released in bulk by a reset, rewind or marker pop
    fn on_release(&self, tag: &AllocatorTag, blocks: &[MemoryBlock]) {
        for block in blocks {
            self.on_deallocate(tag, block);
        }
    }
}

/// Observer list owned by an allocator
#[derive(Default)]
pub struct AllocatorHooks {
    observers: RwLock<Vec<Arc<dyn AllocationObserver>>>,
}

impl AllocatorHooks {
    /// Empty observer list
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer
    pub fn register(&self, observer: Arc<dyn AllocationObserver>) {
        self.observers.write().push(observer);
    }

    /// Removes an observer previously registered, returning true if found
    pub fn unregister(&self, observer: &Arc<dyn AllocationObserver>) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|existing| !Arc::ptr_eq(existing, observer));
        observers.len() != before
    }

    /// Removes an observer by identity when the caller only holds a reference
    pub fn remove_observer(&self, observer: &dyn AllocationObserver) -> bool {
        let target = observer as *const dyn AllocationObserver;
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|existing| !core::ptr::addr_eq(Arc::as_ptr(existing), target));
        observers.len() != before
    }

    /// Removes every observer
    pub fn clear(&self) {
        self.observers.write().clear();
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Returns true if no observer is registered
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    // Observers may register further observers from inside a callback, so
    // notification iterates over a snapshot.
    fn snapshot(&self) -> Option<Vec<Arc<dyn AllocationObserver>>> {
        let observers = self.observers.read();
        if observers.is_empty() {
            None
        } else {
            Some(observers.clone())
        }
    }

    /// Notifies every observer of an allocation
    pub fn notify_allocate(&self, tag: &AllocatorTag, block: &MemoryBlock) {
        if let Some(observers) = self.snapshot() {
            for observer in &observers {
                observer.on_allocate(tag, block);
            }
        }
    }

    /// Notifies every observer of a deallocation
    pub fn notify_deallocate(&self, tag: &AllocatorTag, block: &MemoryBlock) {
        if let Some(observers) = self.snapshot() {
            for observer in &observers {
                observer.on_deallocate(tag, block);
            }
        }
    }

    /// Notifies every observer of a reallocation
    pub fn notify_reallocate(&self, tag: &AllocatorTag, old: &MemoryBlock, new: &MemoryBlock) {
        if let Some(observers) = self.snapshot() {
            for observer in &observers {
                observer.on_reallocate(tag, old, new);
            }
        }
    }

    /// Notifies every observer of a bulk release
    pub fn notify_release(&self, tag: &AllocatorTag, blocks: &[MemoryBlock]) {
        if blocks.is_empty() {
            return;
        }
        if let Some(observers) = self.snapshot() {
            for observer in &observers {
                observer.on_release(tag, blocks);
            }
        }
    }
}

impl core::fmt::Debug for AllocatorHooks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AllocatorHooks")
            .field("observers", &self.len())
            .finish()
    }
}

type BlockCallback = Box<dyn Fn(&AllocatorTag, &MemoryBlock) + Send + Sync>;
type ResizeCallback = Box<dyn Fn(&AllocatorTag, &MemoryBlock, &MemoryBlock) + Send + Sync>;

/// Observer built from closures
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use nebula_alloc::allocator::CallbackObserver;
///
/// let count = Arc::new(AtomicUsize::new(0));
/// let seen = Arc::clone(&count);
/// let observer = CallbackObserver::new().on_allocate(move |_, _| {
///     seen.fetch_add(1, Ordering::Relaxed);
/// });
/// # let _ = observer;
/// ```
#[derive(Default)]
pub struct CallbackObserver {
    allocate: Option<BlockCallback>,
    deallocate: Option<BlockCallback>,
    reallocate: Option<ResizeCallback>,
}

impl CallbackObserver {
    /// Observer with no callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the allocation callback
    #[must_use = "builder methods must be chained or built"]
    pub fn on_allocate<F>(mut self, f: F) -> Self
    where
        F: Fn(&AllocatorTag, &MemoryBlock) + Send + Sync + 'static,
    {
        self.allocate = Some(Box::new(f));
        self
    }

    /// Sets the deallocation callback, also used for bulk releases
    #[must_use = "builder methods must be chained or built"]
    pub fn on_deallocate<F>(mut self, f: F) -> Self
    where
        F: Fn(&AllocatorTag, &MemoryBlock) + Send + Sync + 'static,
    {
        self.deallocate = Some(Box::new(f));
        self
    }

    /// Sets the reallocation callback
    #[must_use = "builder methods must be chained or built"]
    pub fn on_reallocate<F>(mut self, f: F) -> Self
    where
        F: Fn(&AllocatorTag, &MemoryBlock, &MemoryBlock) + Send + Sync + 'static,
    {
        self.reallocate = Some(Box::new(f));
        self
    }

    /// Wraps the observer for registration
    pub fn into_shared(self) -> Arc<dyn AllocationObserver> {
        Arc::new(self)
    }
}

impl AllocationObserver for CallbackObserver {
    fn on_allocate(&self, tag: &AllocatorTag, block: &MemoryBlock) {
        if let Some(f) = &self.allocate {
            f(tag, block);
        }
    }

    fn on_deallocate(&self, tag: &AllocatorTag, block: &MemoryBlock) {
        if let Some(f) = &self.deallocate {
            f(tag, block);
        }
    }

    fn on_reallocate(&self, tag: &AllocatorTag, old: &MemoryBlock, new: &MemoryBlock) {
        if let Some(f) = &self.reallocate {
            f(tag, old, new);
        }
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::core::{AllocationFlags, SourceLocation};

    fn block(address: usize) -> MemoryBlock {
        MemoryBlock::new(
            address,
            32,
            16,
            AllocationFlags::empty(),
            SourceLocation::caller(),
        )
    }

    #[test]
    fn test_callback_observer() {
        let allocs = Arc::new(AtomicUsize::new(0));
        let frees = Arc::new(AtomicUsize::new(0));
        let hooks = AllocatorHooks::new();
        let tag = AllocatorTag::new("test");

        let a = Arc::clone(&allocs);
        let f = Arc::clone(&frees);
        hooks.register(
            CallbackObserver::new()
                .on_allocate(move |_, _| {
                    a.fetch_add(1, Ordering::Relaxed);
                })
                .on_deallocate(move |_, _| {
                    f.fetch_add(1, Ordering::Relaxed);
                })
                .into_shared(),
        );

        hooks.notify_allocate(&tag, &block(0x100));
        hooks.notify_allocate(&tag, &block(0x200));
        hooks.notify_release(&tag, &[block(0x100), block(0x200)]);

        assert_eq!(allocs.load(Ordering::Relaxed), 2);
        assert_eq!(frees.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_unregister() {
        let hooks = AllocatorHooks::new();
        let observer = CallbackObserver::new().into_shared();
        hooks.register(Arc::clone(&observer));
        assert_eq!(hooks.len(), 1);

        assert!(hooks.unregister(&observer));
        assert!(!hooks.unregister(&observer));
        assert!(hooks.is_empty());
    }
}
