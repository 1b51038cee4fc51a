//! RAII handle for pooled objects

use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

use super::ObjectPool;
use super::pool::Release;

/// Object borrowed from an [`ObjectPool`], released when dropped
///
/// The slot behind a handle cannot be released through a raw pointer and
/// survives [`reset`](crate::allocator::Allocator::reset) of the pool.
pub struct PooledObject<'a, T: Send + 'static> {
    ptr: NonNull<T>,
    pool: &'a ObjectPool<T>,
}

// SAFETY: The handle owns its object exclusively.
// - The slot is marked handle-owned, so the pool never touches it
// - T: Send allows the object to be used and dropped on another thread
unsafe impl<T: Send + 'static> Send for PooledObject<'_, T> {}

// SAFETY: Shared access only hands out &T.
unsafe impl<T: Send + Sync + 'static> Sync for PooledObject<'_, T> {}

impl<'a, T: Send + 'static> PooledObject<'a, T> {
    /// # Safety
    ///
    /// `ptr` must point to an initialised, handle-owned slot of `pool`.
    pub(super) unsafe fn new(ptr: NonNull<T>, pool: &'a ObjectPool<T>) -> Self {
        Self { ptr, pool }
    }

    /// Raw pointer to the object
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Pool the object belongs to
    pub fn pool(&self) -> &'a ObjectPool<T> {
        self.pool
    }

    /// Moves the object out and frees its slot without running hooks
    pub fn into_inner(self) -> T {
        let this = core::mem::ManuallyDrop::new(self);
        match this.pool.release_slot(this.ptr.as_ptr() as usize, Release::Detach) {
            Ok(Some(value)) => value,
            // A handle-owned slot always holds an object.
            _ => unreachable!("pooled object slot lost its value"),
        }
    }
}

impl<T: Send + 'static> Deref for PooledObject<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The slot holds an initialised T owned by this handle.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: Send + 'static> DerefMut for PooledObject<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The slot holds an initialised T owned by this handle.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: Send + 'static> Drop for PooledObject<'_, T> {
    fn drop(&mut self) {
        let _ = self.pool.release_slot(self.ptr.as_ptr() as usize, Release::Handle);
    }
}

impl<T: Send + core::fmt::Debug + 'static> core::fmt::Debug for PooledObject<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("PooledObject").field(&**self).finish()
    }
}
