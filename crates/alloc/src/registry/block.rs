//! Per-allocation bookkeeping records

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::core::{AllocationFlags, SourceLocation};

static NEXT_ALLOCATION_ID: AtomicU64 = AtomicU64::new(1);

/// Hands out a process-unique allocation id
///
/// Ids are never reused, so a tracker can tell a recycled address from the
/// allocation that previously lived there.
#[inline]
pub fn next_allocation_id() -> u64 {
    NEXT_ALLOCATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Metadata for one live allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlock {
    /// Address handed to the caller
    pub address: usize,
    /// Requested size in bytes
    pub size: usize,
    /// Effective alignment of `address`
    pub alignment: usize,
    /// Flags the allocation was requested with
    pub flags: AllocationFlags,
    /// Process-unique id
    pub allocation_id: u64,
    /// Where the allocation was requested
    pub location: SourceLocation,
    /// When the allocation was made
    pub timestamp: DateTime<Utc>,
}

impl MemoryBlock {
    /// Creates a record with a fresh allocation id
    pub fn new(
        address: usize,
        size: usize,
        alignment: usize,
        flags: AllocationFlags,
        location: SourceLocation,
    ) -> Self {
        Self {
            address,
            size,
            alignment,
            flags,
            allocation_id: next_allocation_id(),
            location,
            timestamp: Utc::now(),
        }
    }

    /// One past the last byte of the block
    #[inline]
    pub fn end(&self) -> usize {
        self.address + self.size
    }

    /// Returns true if `addr` falls inside the block
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.address && addr < self.end()
    }

    /// Returns true if the two blocks share at least one byte
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.address < other.end() && other.address < self.end()
    }

    /// Time since the allocation was made
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.timestamp)
    }
}

impl fmt::Display for MemoryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {:#x} size={} align={} at {}",
            self.allocation_id, self.address, self.size, self.alignment, self.location
        )
    }
}

/// Address-ordered set of live blocks
///
/// Ordering by address lets bump and stack allocators drop every block at or
/// above a rewind point in one split.
#[derive(Debug, Default, Clone)]
pub struct BlockRegistry {
    blocks: BTreeMap<usize, MemoryBlock>,
}

impl BlockRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a block, returning the record it displaced if any
    pub fn insert(&mut self, block: MemoryBlock) -> Option<MemoryBlock> {
        self.blocks.insert(block.address, block)
    }

    /// Removes the block starting at `address`
    pub fn remove(&mut self, address: usize) -> Option<MemoryBlock> {
        self.blocks.remove(&address)
    }

    /// Block starting at `address`
    pub fn get(&self, address: usize) -> Option<&MemoryBlock> {
        self.blocks.get(&address)
    }

    /// Mutable block starting at `address`
    pub fn get_mut(&mut self, address: usize) -> Option<&mut MemoryBlock> {
        self.blocks.get_mut(&address)
    }

    /// Block whose range contains `address`
    pub fn find_containing(&self, address: usize) -> Option<&MemoryBlock> {
        self.blocks
            .range(..=address)
            .next_back()
            .map(|(_, block)| block)
            .filter(|block| block.contains(address))
    }

    /// Returns true if a block starts at `address`
    pub fn contains(&self, address: usize) -> bool {
        self.blocks.contains_key(&address)
    }

    /// Block with the highest address
    pub fn last(&self) -> Option<&MemoryBlock> {
        self.blocks.values().next_back()
    }

    /// Removes and returns every block at or above `address`
    pub fn release_from(&mut self, address: usize) -> Vec<MemoryBlock> {
        let released = self.blocks.split_off(&address);
        released.into_values().collect()
    }

    /// Removes and returns every block
    pub fn drain(&mut self) -> Vec<MemoryBlock> {
        core::mem::take(&mut self.blocks).into_values().collect()
    }

    /// Live blocks in address order
    pub fn iter(&self) -> impl Iterator<Item = &MemoryBlock> {
        self.blocks.values()
    }

    /// Copies of every live block
    pub fn snapshot(&self) -> Vec<MemoryBlock> {
        self.blocks.values().cloned().collect()
    }

    /// Number of live blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if no block is live
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Sum of live block sizes
    pub fn total_bytes(&self) -> usize {
        self.blocks.values().map(|block| block.size).sum()
    }

    /// Returns the first pair of overlapping blocks, if any
    pub fn find_overlap(&self) -> Option<(&MemoryBlock, &MemoryBlock)> {
        let mut iter = self.blocks.values();
        let mut prev = iter.next()?;
        for block in iter {
            if prev.overlaps(block) {
                return Some((prev, block));
            }
            prev = block;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(address: usize, size: usize) -> MemoryBlock {
        MemoryBlock::new(
            address,
            size,
            16,
            AllocationFlags::empty(),
            SourceLocation::caller(),
        )
    }

    #[test]
    fn test_allocation_ids_increase() {
        let a = block(0x1000, 8);
        let b = block(0x2000, 8);
        assert!(b.allocation_id > a.allocation_id);
    }

    #[test]
    fn test_block_ranges() {
        let a = block(0x1000, 0x10);
        assert!(a.contains(0x1000));
        assert!(a.contains(0x100f));
        assert!(!a.contains(0x1010));
        assert!(a.overlaps(&block(0x1008, 4)));
        assert!(!a.overlaps(&block(0x1010, 4)));
    }

    #[test]
    fn test_registry_release_from() {
        let mut registry = BlockRegistry::new();
        registry.insert(block(0x1000, 16));
        registry.insert(block(0x1010, 16));
        registry.insert(block(0x1020, 16));

        let released = registry.release_from(0x1010);
        assert_eq!(released.len(), 2);
        assert_eq!(released[0].address, 0x1010);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.total_bytes(), 16);
    }

    #[test]
    fn test_find_containing() {
        let mut registry = BlockRegistry::new();
        registry.insert(block(0x1000, 16));
        registry.insert(block(0x1040, 16));

        assert_eq!(registry.find_containing(0x1004).map(|b| b.address), Some(0x1000));
        assert!(registry.find_containing(0x1020).is_none());
        assert!(registry.find_containing(0x0fff).is_none());
    }

    #[test]
    fn test_find_overlap() {
        let mut registry = BlockRegistry::new();
        registry.insert(block(0x1000, 16));
        registry.insert(block(0x1010, 16));
        assert!(registry.find_overlap().is_none());

        registry.insert(block(0x1018, 4));
        let (a, b) = registry.find_overlap().unwrap();
        assert_eq!((a.address, b.address), (0x1010, 0x1018));
    }
}
