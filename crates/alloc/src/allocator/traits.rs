//! The allocator contract shared by every strategy
//!
//! # Safety
//!
//! [`Allocator`] is an `unsafe trait`: callers write through the pointers it
//! returns, so implementors promise that:
//! - A returned pointer is non-null, aligned to the effective alignment and
//!   valid for reads and writes of the requested size
//! - Simultaneously live allocations never overlap
//! - A pointer stays valid until it is deallocated, rewound or reset
//!
//! Methods themselves are safe. Every pointer passed back in is checked
//! against the allocator's own bookkeeping before any byte behind it is
//! touched, so a foreign or stale pointer yields an error instead of
//! undefined behavior.
//!
//! ## Hooks
//!
//! Successful operations notify the allocator's [`AllocatorHooks`] after its
//! state lock has been released; observers may call back into the allocator.

use core::fmt::Write as _;
use core::ptr::NonNull;

use super::hooks::AllocatorHooks;
use crate::core::{AllocationFlags, AllocatorTag, SourceLocation};
use crate::error::{MemoryError, MemoryResult};
use crate::registry::{AllocationInfo, AllocatorStats, MemoryBlock};

/// Memory allocation strategy
///
/// Object safe; trackers and registries hold `Weak<dyn Allocator>`.
///
/// # Safety
///
/// See the [module documentation](self).
pub unsafe trait Allocator: Send + Sync {
    /// Identity attached to every event this allocator emits
    fn tag(&self) -> &AllocatorTag;

    /// Observers notified after successful operations
    fn hooks(&self) -> &AllocatorHooks;

    /// Allocates `size` bytes recording `location` as the origin
    ///
    /// Fails with `InvalidSize` for zero size, `InvalidAlignment` for
    /// alignments that are not powers of two or smaller than a pointer, and
    /// `InvalidFlags` for contradictory flags.
    fn allocate_at(
        &self,
        size: usize,
        alignment: usize,
        flags: AllocationFlags,
        location: SourceLocation,
    ) -> MemoryResult<NonNull<u8>>;

    /// Allocates `size` bytes, recording the caller as the origin
    #[track_caller]
    fn allocate(
        &self,
        size: usize,
        alignment: usize,
        flags: AllocationFlags,
    ) -> MemoryResult<NonNull<u8>> {
        self.allocate_at(size, alignment, flags, SourceLocation::caller())
    }

    /// Allocates `size` zero-filled bytes
    #[track_caller]
    fn allocate_zeroed(&self, size: usize, alignment: usize) -> MemoryResult<NonNull<u8>> {
        self.allocate_at(
            size,
            alignment,
            AllocationFlags::ZERO_MEMORY,
            SourceLocation::caller(),
        )
    }

    /// Allocates room for `count` elements of `element_size` bytes
    #[track_caller]
    fn allocate_array(
        &self,
        count: usize,
        element_size: usize,
        alignment: usize,
    ) -> MemoryResult<NonNull<u8>> {
        let size = count
            .checked_mul(element_size)
            .ok_or_else(|| MemoryError::size_overflow("array allocation"))?;
        self.allocate_at(
            size,
            alignment,
            AllocationFlags::empty(),
            SourceLocation::caller(),
        )
    }

    /// Releases one allocation
    ///
    /// A null pointer is logged and ignored. A pointer this allocator did
    /// not hand out fails with `InvalidPointer`.
    fn deallocate(&self, ptr: *mut u8) -> MemoryResult<()>;

    /// Resizes an allocation
    ///
    /// `old_size` is the number of bytes the caller wants preserved and
    /// must not exceed the size the block was allocated with. Strategies
    /// that can resize in place override this; the default allocates a new
    /// block, copies `min(old_size, new_size)` bytes and frees the old one.
    fn reallocate(
        &self,
        ptr: *mut u8,
        old_size: usize,
        new_size: usize,
        alignment: usize,
    ) -> MemoryResult<NonNull<u8>> {
        if ptr.is_null() {
            return self.allocate_at(
                new_size,
                alignment,
                AllocationFlags::empty(),
                SourceLocation::unknown(),
            );
        }

        let old = resize_source(self, ptr, old_size)?;
        let new_ptr = relocate(self, ptr, &old, old_size, new_size, alignment)?;

        if let Err(error) = self.deallocate(ptr) {
            let _ = self.deallocate(new_ptr.as_ptr());
            return Err(error);
        }

        if let Some(new) = self.block_info(new_ptr.as_ptr()) {
            self.hooks().notify_reallocate(self.tag(), &old, &new);
        }
        Ok(new_ptr)
    }

    /// Releases every outstanding allocation, keeping backing memory
    fn reset(&self);

    /// Releases every outstanding allocation and returns surplus backing
    /// memory to the system
    fn purge(&self) {
        self.reset();
        self.trim();
    }

    /// Returns unused backing memory without touching live allocations
    ///
    /// Returns the number of bytes released.
    fn trim(&self) -> usize {
        0
    }

    /// Reorganizes internal bookkeeping to reduce overhead
    ///
    /// Never moves live allocations. Returns the number of bytes reclaimed.
    fn compact(&self) -> usize {
        0
    }

    /// Point-in-time memory figures
    fn allocation_info(&self) -> AllocationInfo;

    /// Counter snapshot
    fn statistics(&self) -> AllocatorStats;

    /// Copies of every live allocation record, in address order
    fn allocations(&self) -> Vec<MemoryBlock>;

    /// Returns true if `ptr` lies inside memory owned by this allocator
    fn contains(&self, ptr: *const u8) -> bool;

    /// Record of the live allocation starting at `ptr`
    fn block_info(&self, ptr: *const u8) -> Option<MemoryBlock>;

    /// Walks every live allocation and checks its integrity markers
    ///
    /// Findings are logged and counted; returns false if any was found.
    fn validate(&self) -> bool;

    /// Checks the integrity markers of one live allocation
    fn validate_pointer(&self, ptr: *const u8) -> MemoryResult<()>;

    /// Bytes the allocator can hand out in total
    fn total_memory(&self) -> usize {
        self.allocation_info().total_memory
    }

    /// Bytes currently consumed
    fn used_memory(&self) -> usize {
        self.allocation_info().used_memory
    }

    /// Bytes still available
    fn free_memory(&self) -> usize {
        self.allocation_info().free_memory
    }

    /// Highest usage observed
    fn peak_memory(&self) -> usize {
        self.allocation_info().peak_memory
    }

    /// Live allocations
    fn allocation_count(&self) -> usize {
        self.allocation_info().allocation_count
    }

    /// Bytes lost to alignment padding and header overhead
    fn fragmentation_loss(&self) -> usize {
        self.allocation_info().fragmentation_loss
    }

    /// Human readable statistics
    fn dump_statistics(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[{}]", self.tag());
        let _ = writeln!(out, "{}", self.allocation_info());
        let _ = write!(out, "{}", self.statistics());
        out
    }

    /// Human readable list of live allocations
    fn dump_allocations(&self) -> String {
        let blocks = self.allocations();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "[{}] {} live allocation(s)",
            self.tag(),
            blocks.len()
        );
        for block in &blocks {
            let _ = writeln!(out, "  {block}");
        }
        out
    }
}

/// Looks up the live block behind `ptr` for a resize
///
/// Fails with `InvalidPointer` for unknown pointers and `InvalidSize` when
/// `old_size` exceeds the allocated size.
pub(crate) fn resize_source<A: Allocator + ?Sized>(
    allocator: &A,
    ptr: *mut u8,
    old_size: usize,
) -> MemoryResult<MemoryBlock> {
    let old = allocator
        .block_info(ptr)
        .ok_or_else(|| MemoryError::invalid_pointer(ptr as usize, allocator.tag().name()))?;
    if old_size > old.size {
        return Err(MemoryError::invalid_size(
            old_size,
            "old size exceeds the allocated size",
        ));
    }
    Ok(old)
}

/// Allocates a new block and copies the first `min(old_size, new_size)`
/// bytes of `ptr` into it
///
/// The old block is left alone.
pub(crate) fn relocate<A: Allocator + ?Sized>(
    allocator: &A,
    ptr: *mut u8,
    old: &MemoryBlock,
    old_size: usize,
    new_size: usize,
    alignment: usize,
) -> MemoryResult<NonNull<u8>> {
    let flags = old.flags - AllocationFlags::ZERO_MEMORY;
    let new_ptr = allocator.allocate_at(new_size, alignment, flags, old.location)?;

    // SAFETY: Copying between two live allocations of one allocator.
    // - `old_size <= old.size` (resize_source), the new block has `new_size`
    // - Live allocations never overlap (trait contract)
    unsafe {
        core::ptr::copy_nonoverlapping(ptr, new_ptr.as_ptr(), old_size.min(new_size));
    }
    Ok(new_ptr)
}
