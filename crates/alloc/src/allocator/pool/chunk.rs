//! One growth unit of fixed-size blocks

use super::header::{BlockHeader, BlockLayout, CANARY, HEADER_SIZE};
use crate::core::{AlignedBuffer, CACHE_LINE_SIZE};
use crate::error::MemoryResult;
use crate::registry::MemoryBlock;

/// Contiguous run of equal-size blocks with its own free list
pub(super) struct PoolChunk {
    pub(super) id: u32,
    buffer: AlignedBuffer,
    block_count: usize,
    /// Free slot indices; the next allocation pops from the end
    free: Vec<u32>,
    /// Record of the allocation living in each slot
    live: Vec<Option<MemoryBlock>>,
}

impl PoolChunk {
    /// Allocates a chunk and formats every slot as free
    pub(super) fn new(id: u32, block_count: usize, layout: &BlockLayout) -> MemoryResult<Self> {
        let buffer = AlignedBuffer::new(
            layout.stride * block_count,
            layout.alignment.max(CACHE_LINE_SIZE),
        )?;
        let mut chunk = Self {
            id,
            buffer,
            block_count,
            free: Vec::with_capacity(block_count),
            live: vec![None; block_count],
        };
        chunk.format(layout);
        Ok(chunk)
    }

    /// Marks every slot free and rebuilds the free list in address order
    pub(super) fn format(&mut self, layout: &BlockLayout) {
        self.free.clear();
        for index in (0..self.block_count).rev() {
            // Block counts are checked against u32::MAX by the config.
            let index = index as u32;
            self.write_header(layout, index as usize, BlockHeader::free(self.id, index));
            if layout.trailing_canary {
                self.write_trailing_canary(layout, index as usize);
            }
            self.free.push(index);
        }
        self.live.iter_mut().for_each(|slot| *slot = None);
    }

    pub(super) fn block_count(&self) -> usize {
        self.block_count
    }

    pub(super) fn used_count(&self) -> usize {
        self.block_count - self.free.len()
    }

    pub(super) fn free_count(&self) -> usize {
        self.free.len()
    }

    pub(super) fn is_fully_free(&self) -> bool {
        self.free.len() == self.block_count
    }

    pub(super) fn bytes(&self) -> usize {
        self.buffer.len()
    }

    pub(super) fn start_addr(&self) -> usize {
        self.buffer.start_addr()
    }

    pub(super) fn contains_addr(&self, addr: usize) -> bool {
        self.buffer.contains_addr(addr)
    }

    pub(super) fn payload_addr(&self, layout: &BlockLayout, index: usize) -> usize {
        self.start_addr() + layout.payload_offset(index)
    }

    /// Slot index for a payload address inside this chunk
    pub(super) fn index_of(&self, layout: &BlockLayout, addr: usize) -> Option<usize> {
        let index = layout.index_of(addr.checked_sub(self.start_addr())?)?;
        (index < self.block_count).then_some(index)
    }

    pub(super) fn pop_free(&mut self) -> Option<usize> {
        self.free.pop().map(|index| index as usize)
    }

    pub(super) fn push_free(&mut self, index: usize) {
        // Slot indices fit in u32, see format.
        self.free.push(index as u32);
    }

    pub(super) fn free_indices(&self) -> &[u32] {
        &self.free
    }

    /// Sorts the free list so the lowest address is handed out first
    pub(super) fn sort_free_list(&mut self) {
        self.free.sort_unstable_by(|a, b| b.cmp(a));
    }

    pub(super) fn live(&self, index: usize) -> Option<&MemoryBlock> {
        self.live.get(index).and_then(Option::as_ref)
    }

    pub(super) fn live_mut(&mut self, index: usize) -> Option<&mut MemoryBlock> {
        self.live.get_mut(index).and_then(Option::as_mut)
    }

    pub(super) fn set_live(&mut self, index: usize, block: Option<MemoryBlock>) -> Option<MemoryBlock> {
        core::mem::replace(&mut self.live[index], block)
    }

    pub(super) fn live_blocks(&self) -> impl Iterator<Item = (usize, &MemoryBlock)> {
        self.live
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|block| (index, block)))
    }

    pub(super) fn drain_live(&mut self) -> Vec<MemoryBlock> {
        self.live.iter_mut().filter_map(Option::take).collect()
    }

    pub(super) fn read_header(&self, layout: &BlockLayout, index: usize) -> BlockHeader {
        debug_assert!(index < self.block_count);
        // SAFETY: Reading the header of an in-range slot.
        // - slot_offset(index) + HEADER_SIZE <= stride * block_count
        // - Headers are plain integers, any bit pattern is valid
        unsafe {
            self.buffer
                .at(layout.slot_offset(index))
                .cast::<BlockHeader>()
                .read_unaligned()
        }
    }

    pub(super) fn write_header(&self, layout: &BlockLayout, index: usize, header: BlockHeader) {
        debug_assert!(index < self.block_count);
        debug_assert!(HEADER_SIZE <= layout.header_pad);
        // SAFETY: Writing the header of an in-range slot.
        // - Header bytes are never part of a payload handed to a caller
        // - Called under the pool's state lock
        unsafe {
            self.buffer
                .at(layout.slot_offset(index))
                .cast::<BlockHeader>()
                .write_unaligned(header);
        }
    }

    pub(super) fn read_trailing_canary(&self, layout: &BlockLayout, index: usize) -> u32 {
        // SAFETY: Canary lies between payload end and slot end.
        unsafe {
            self.buffer
                .at(layout.canary_offset(index))
                .cast::<u32>()
                .read_unaligned()
        }
    }

    pub(super) fn write_trailing_canary(&self, layout: &BlockLayout, index: usize) {
        // SAFETY: Canary lies between payload end and slot end.
        unsafe {
            self.buffer
                .at(layout.canary_offset(index))
                .cast::<u32>()
                .write_unaligned(CANARY);
        }
    }

    /// Fills the payload of slot `index`
    pub(super) fn fill_payload(&self, layout: &BlockLayout, index: usize, byte: u8) {
        // SAFETY: Payload range of an in-range slot, exclusively owned by
        // the pool while the slot is being handed out or taken back.
        unsafe {
            self.buffer
                .fill(layout.payload_offset(index), layout.block_size, byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::header::{MAGIC_FREE, MAGIC_IN_USE};
    use super::*;

    #[test]
    fn test_new_chunk_is_free_in_address_order() {
        let layout = BlockLayout::new(64, 16, true);
        let mut chunk = PoolChunk::new(1, 4, &layout).unwrap();
        assert!(chunk.is_fully_free());
        assert_eq!(chunk.pop_free(), Some(0));
        assert_eq!(chunk.pop_free(), Some(1));
        assert_eq!(chunk.used_count(), 2);

        let header = chunk.read_header(&layout, 3);
        assert_eq!(header.magic, MAGIC_FREE);
        assert_eq!(header.canary, CANARY);
        assert_eq!(header.index, 3);
        assert_eq!(chunk.read_trailing_canary(&layout, 3), CANARY);
    }

    #[test]
    fn test_index_of_rejects_interior_pointers() {
        let layout = BlockLayout::new(64, 16, false);
        let chunk = PoolChunk::new(1, 4, &layout).unwrap();
        let payload = chunk.payload_addr(&layout, 2);
        assert_eq!(chunk.index_of(&layout, payload), Some(2));
        assert_eq!(chunk.index_of(&layout, payload + 16), None);
        assert_eq!(chunk.index_of(&layout, chunk.start_addr()), None);
        assert_eq!(chunk.index_of(&layout, chunk.payload_addr(&layout, 4)), None);
    }

    #[test]
    fn test_header_round_trip() {
        let layout = BlockLayout::new(32, 16, true);
        let chunk = PoolChunk::new(9, 2, &layout).unwrap();
        let mut header = chunk.read_header(&layout, 1);
        header.magic = MAGIC_IN_USE;
        header.allocation_id = 42;
        chunk.write_header(&layout, 1, header);
        assert_eq!(chunk.read_header(&layout, 1).allocation_id, 42);
        assert_eq!(chunk.read_header(&layout, 0).magic, MAGIC_FREE);
    }

    #[test]
    fn test_sort_free_list() {
        let layout = BlockLayout::new(16, 16, false);
        let mut chunk = PoolChunk::new(1, 4, &layout).unwrap();
        let a = chunk.pop_free().unwrap();
        let b = chunk.pop_free().unwrap();
        chunk.push_free(a);
        chunk.push_free(b);
        chunk.sort_free_list();
        assert_eq!(chunk.pop_free(), Some(0));
    }
}
