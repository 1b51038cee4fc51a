//! Owned, over-aligned byte arenas
//!
//! # Safety
//!
//! [`AlignedBuffer`] owns one heap allocation obtained from the global
//! allocator with a caller-chosen alignment:
//! - The allocation is zero-initialised, so every byte is readable
//! - `start_addr()..end_addr()` is the only range handed out
//! - The allocation is released exactly once, in `Drop`
//!
//! ## Invariants
//!
//! - `len > 0` and `layout.size() == len`
//! - `ptr` is aligned to `layout.align()`
//! - Interior bytes are only mutated by the owning allocator while it holds
//!   its state lock, or by the caller through a pointer the allocator handed
//!   out exclusively

use core::alloc::Layout;
use core::ptr::NonNull;
use std::alloc::{alloc_zeroed, dealloc};

use super::alignment::{CACHE_LINE_SIZE, is_power_of_two};
use crate::error::{MemoryError, MemoryResult};

/// Heap arena with a guaranteed base alignment
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: AlignedBuffer is a uniquely owned heap allocation.
// - No thread-local state, the pointer is only an address into the heap
// - Mutation happens through raw pointers under the owner's synchronization
unsafe impl Send for AlignedBuffer {}

// SAFETY: Shared access only exposes addresses and raw pointers.
// - Reads/writes through those pointers are synchronized by the allocator
//   that owns the buffer (parking_lot mutex around its state)
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocates `len` zeroed bytes aligned to at least a cache line
    pub fn new(len: usize, alignment: usize) -> MemoryResult<Self> {
        if len == 0 {
            return Err(MemoryError::invalid_size(0, "buffer length cannot be zero"));
        }
        if !is_power_of_two(alignment) {
            return Err(MemoryError::invalid_alignment(alignment));
        }

        let align = alignment.max(CACHE_LINE_SIZE);
        let layout = Layout::from_size_align(len, align)
            .map_err(|_| MemoryError::invalid_size(len, "buffer layout overflows isize"))?;

        // SAFETY: Allocating from the global allocator.
        // - layout has non-zero size (checked above)
        // - layout alignment is a power of two (Layout::from_size_align)
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| MemoryError::out_of_memory(len, 0))?;

        Ok(Self { ptr, layout })
    }

    /// Base pointer of the arena
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Length of the arena in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// Always false, buffers are never empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Base alignment of the arena
    #[inline]
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    /// First address of the arena
    #[inline]
    pub fn start_addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// One past the last address of the arena
    #[inline]
    pub fn end_addr(&self) -> usize {
        self.start_addr() + self.len()
    }

    /// Returns true if `addr` falls inside the arena
    #[inline]
    pub fn contains_addr(&self, addr: usize) -> bool {
        addr >= self.start_addr() && addr < self.end_addr()
    }

    /// Pointer to the byte at `offset`
    ///
    /// # Safety
    ///
    /// `offset` must be `<= len()`.
    #[inline]
    pub unsafe fn at(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset <= self.len());
        // SAFETY: offset is within the allocation (caller contract).
        unsafe { self.ptr.as_ptr().add(offset) }
    }

    /// Fills `offset..offset + len` with `byte`
    ///
    /// # Safety
    ///
    /// The range must be inside the arena and not aliased by any live
    /// reference.
    #[inline]
    pub unsafe fn fill(&self, offset: usize, len: usize, byte: u8) {
        debug_assert!(offset + len <= self.len());
        // SAFETY: Writing inside the owned allocation.
        // - Range bounds are the caller's contract
        // - No references alias raw arena bytes
        unsafe { core::ptr::write_bytes(self.at(offset), byte, len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: Releasing the allocation made in `new`.
        // - ptr came from alloc_zeroed with exactly this layout
        // - Drop runs once
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl core::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("start", &format_args!("{:#x}", self.start_addr()))
            .field("len", &self.len())
            .field("alignment", &self.alignment())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alignment::is_aligned;

    #[test]
    fn test_buffer_alignment() {
        let buffer = AlignedBuffer::new(1000, 16).unwrap();
        assert!(is_aligned(buffer.start_addr(), CACHE_LINE_SIZE));
        assert_eq!(buffer.len(), 1000);

        let big = AlignedBuffer::new(64, 1024).unwrap();
        assert!(is_aligned(big.start_addr(), 1024));
    }

    #[test]
    fn test_buffer_is_zeroed_and_fillable() {
        let buffer = AlignedBuffer::new(128, 16).unwrap();
        unsafe {
            assert_eq!(*buffer.at(127), 0);
            buffer.fill(10, 5, 0xAB);
            assert_eq!(*buffer.at(10), 0xAB);
            assert_eq!(*buffer.at(14), 0xAB);
            assert_eq!(*buffer.at(15), 0);
        }
    }

    #[test]
    fn test_buffer_rejects_zero_length() {
        assert!(AlignedBuffer::new(0, 16).is_err());
        assert!(AlignedBuffer::new(16, 3).is_err());
    }
}
