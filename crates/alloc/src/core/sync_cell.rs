//! Shared interior mutability for pool slots
//!
//! Object pool slots are written through raw pointers by whichever thread
//! currently owns the slot. Ownership is handed over under the pool's state
//! lock, so the cell itself carries no synchronization.

use core::cell::UnsafeCell;

/// `UnsafeCell` that may be shared between threads
///
/// # Safety
///
/// Only the current owner of the cell, as decided by an external lock, may
/// read or write through [`get`](Self::get).
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T: ?Sized>(UnsafeCell<T>);

// SAFETY: Access is serialized by the owner's lock.
// - Exactly one thread holds a slot at any time
// - T: Send lets the value move to that thread
unsafe impl<T: ?Sized + Send> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    #[inline]
    pub(crate) const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }
}

impl<T: ?Sized> SyncUnsafeCell<T> {
    /// Raw pointer to the slot contents
    #[inline]
    pub(crate) fn get(&self) -> *mut T {
        self.0.get()
    }
}
