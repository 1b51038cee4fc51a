//! Main memory pool implementation
//!
//! # Safety
//!
//! The pool carves every chunk into equal slots and hands out payloads:
//! - All state (chunks, free lists, live records, counters) lives behind
//!   one mutex
//! - Headers, canaries and free payloads are only touched under that mutex
//! - A pointer passed back in is mapped to a slot by bounds and stride
//!   arithmetic before any header is read, so foreign pointers never cause
//!   a read outside owned memory
//!
//! ## Invariants
//!
//! - For every chunk: `free.len() + live slots == block_count`
//! - A slot is on its chunk's free list iff its header carries
//!   [`MAGIC_FREE`] and it has no live record
//! - Chunks are only removed while every block in them is free
//! - At least one chunk is always owned

use core::fmt::Write as _;
use core::ptr::NonNull;

use parking_lot::Mutex;

use super::chunk::PoolChunk;
use super::header::{BlockHeader, BlockLayout, CANARY, MAGIC_FREE, MAGIC_IN_USE};
use super::{MemoryPoolStats, PoolConfig};
use crate::allocator::traits::resize_source;
use crate::allocator::{Allocator, AllocatorHooks, report_corruption, report_failure, resolve_request};
use crate::core::{AllocationFlags, AllocatorTag, MIN_ALIGNMENT, SourceLocation, size};
use crate::error::{MemoryError, MemoryResult};
use crate::logging::{LogLevel, MemoryEvent, SharedLogger, default_logger};
use crate::registry::{AllocationInfo, AllocatorStats, MemoryBlock};

struct PoolState {
    chunks: Vec<PoolChunk>,
    next_chunk_id: u32,
    peak_used: usize,
    growth_count: u64,
    shrink_count: u64,
    double_free_count: u64,
    invalid_free_count: u64,
    corruption_count: u64,
    stats: AllocatorStats,
}

impl PoolState {
    fn total_blocks(&self) -> usize {
        self.chunks.iter().map(PoolChunk::block_count).sum()
    }

    fn used_blocks(&self) -> usize {
        self.chunks.iter().map(PoolChunk::used_count).sum()
    }

    fn free_blocks(&self) -> usize {
        self.chunks.iter().map(PoolChunk::free_count).sum()
    }

    /// Chunk position and slot index of a payload address
    fn locate(&self, layout: &BlockLayout, addr: usize) -> Option<(usize, usize)> {
        self.chunks
            .iter()
            .position(|chunk| chunk.contains_addr(addr))
            .and_then(|position| {
                self.chunks[position]
                    .index_of(layout, addr)
                    .map(|index| (position, index))
            })
    }

    fn record_integrity_failure(&mut self, error: &MemoryError) {
        match error {
            MemoryError::DoubleFree { .. } => self.double_free_count += 1,
            MemoryError::InvalidPointer { .. } => {
                self.invalid_free_count += 1;
                return;
            }
            _ => self.corruption_count += 1,
        }
        self.stats.record_corruption();
    }
}

/// Fixed-size block pool organised in chunks
///
/// Every block is preceded by a header whose magic tells in-use blocks
/// from free ones, so double frees and stray pointers are caught before
/// the free list is touched.
///
/// # Examples
///
/// ```
/// use nebula_alloc::allocator::{Allocator, MemoryPool};
/// use nebula_alloc::core::AllocationFlags;
///
/// let pool = MemoryPool::new(64, 4)?;
/// let block = pool.allocate(48, 16, AllocationFlags::empty())?;
/// pool.deallocate(block.as_ptr())?;
/// assert!(pool.check_conservation());
/// # Ok::<(), nebula_alloc::error::MemoryError>(())
/// ```
pub struct MemoryPool {
    state: Mutex<PoolState>,
    config: PoolConfig,
    layout: BlockLayout,
    tag: AllocatorTag,
    hooks: AllocatorHooks,
    logger: SharedLogger,
}

impl MemoryPool {
    /// Creates a pool with custom configuration
    pub fn with_config(config: PoolConfig) -> MemoryResult<Self> {
        config.validate()?;
        let layout = BlockLayout::new(config.block_size, config.alignment, config.use_canary);
        let first = PoolChunk::new(0, config.block_count, &layout)?;
        let tag = AllocatorTag::new(&config.name);

        Ok(Self {
            state: Mutex::new(PoolState {
                chunks: vec![first],
                next_chunk_id: 1,
                peak_used: 0,
                growth_count: 0,
                shrink_count: 0,
                double_free_count: 0,
                invalid_free_count: 0,
                corruption_count: 0,
                stats: AllocatorStats::new(),
            }),
            config,
            layout,
            tag,
            hooks: AllocatorHooks::new(),
            logger: default_logger(),
        })
    }

    /// Creates a pool of `block_count` blocks of `block_size` bytes
    pub fn new(block_size: usize, block_count: usize) -> MemoryResult<Self> {
        Self::with_config(PoolConfig::new(block_size, block_count))
    }

    /// Creates a pool whose blocks fit one `T` each
    pub fn for_type<T>(block_count: usize) -> MemoryResult<Self> {
        let config = PoolConfig {
            alignment: core::mem::align_of::<T>().max(MIN_ALIGNMENT),
            name: core::any::type_name::<T>().to_string(),
            ..PoolConfig::new(core::mem::size_of::<T>().max(1), block_count)
        };
        Self::with_config(config)
    }

    /// 256 blocks of 64 bytes
    pub fn small() -> MemoryResult<Self> {
        Self::new(64, 256)
    }

    /// 1024 blocks of 256 bytes
    pub fn medium() -> MemoryResult<Self> {
        Self::new(256, 1024)
    }

    /// 1024 blocks of 4 KiB
    pub fn large() -> MemoryResult<Self> {
        Self::new(4 * size::KB, 1024)
    }

    /// Replaces the logger
    #[must_use = "builder methods must be chained or built"]
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Payload bytes per block
    pub fn block_size(&self) -> usize {
        self.layout.block_size
    }

    /// Bytes per slot, header and canary included
    pub fn stride(&self) -> usize {
        self.layout.stride
    }

    /// Blocks across all chunks
    pub fn total_blocks(&self) -> usize {
        self.state.lock().total_blocks()
    }

    /// Blocks handed out
    pub fn used_blocks(&self) -> usize {
        self.state.lock().used_blocks()
    }

    /// Blocks on free lists
    pub fn free_blocks(&self) -> usize {
        self.state.lock().free_blocks()
    }

    /// Chunks currently owned
    pub fn chunk_count(&self) -> usize {
        self.state.lock().chunks.len()
    }

    /// `used_blocks / total_blocks`
    pub fn utilization_ratio(&self) -> f64 {
        self.pool_stats().utilization_ratio()
    }

    /// Block-level statistics
    pub fn pool_stats(&self) -> MemoryPoolStats {
        let state = self.state.lock();
        MemoryPoolStats {
            block_size: self.layout.block_size,
            stride: self.layout.stride,
            total_blocks: state.total_blocks(),
            used_blocks: state.used_blocks(),
            free_blocks: state.free_blocks(),
            peak_used_blocks: state.peak_used,
            chunk_count: state.chunks.len(),
            growth_count: state.growth_count,
            shrink_count: state.shrink_count,
            double_free_count: state.double_free_count,
            invalid_free_count: state.invalid_free_count,
            corruption_count: state.corruption_count,
        }
    }

    /// Returns true if `used + free == total` for every chunk
    pub fn check_conservation(&self) -> bool {
        let state = self.state.lock();
        state
            .chunks
            .iter()
            .all(|chunk| chunk.used_count() + chunk.free_count() == chunk.block_count())
            && state.used_blocks() + state.free_blocks() == state.total_blocks()
    }

    /// Adds a chunk of `blocks` blocks
    ///
    /// Fails with `OutOfMemory` when `max_blocks` would be exceeded.
    pub fn grow(&self, blocks: usize) -> MemoryResult<()> {
        if blocks == 0 {
            return Err(MemoryError::invalid_size(0, "cannot grow by zero blocks"));
        }
        if blocks > u32::MAX as usize {
            return Err(MemoryError::invalid_size(blocks, "too many blocks per chunk"));
        }
        let mut state = self.state.lock();
        let total = state.total_blocks();
        if self.config.max_blocks != 0 && total + blocks > self.config.max_blocks {
            return Err(MemoryError::out_of_memory(
                blocks * self.layout.block_size,
                (self.config.max_blocks - total) * self.layout.block_size,
            ));
        }
        self.add_chunk(&mut state, blocks)
    }

    /// Removes fully free chunks, keeping at least one
    ///
    /// Returns the number of chunks removed.
    pub fn shrink(&self) -> usize {
        self.shrink_to(1).0
    }

    /// Grows or shrinks towards `target` total blocks
    ///
    /// Shrinking only removes fully free chunks, so the result may stay
    /// above `target`. Returns the new total.
    pub fn resize(&self, target: usize) -> MemoryResult<usize> {
        if target == 0 {
            return Err(MemoryError::invalid_size(0, "pool needs at least one block"));
        }
        let total = self.total_blocks();
        if target > total {
            self.grow(target - total)?;
        } else {
            self.shrink_to(target);
        }
        Ok(self.total_blocks())
    }

    /// Orders chunks fullest first and every free list by address
    ///
    /// Subsequent allocations pack into busy chunks, leaving idle ones
    /// removable by [`shrink`](Self::shrink). Returns the number of fully
    /// free chunks.
    pub fn defragment(&self) -> usize {
        let mut state = self.state.lock();
        state
            .chunks
            .sort_by_key(|chunk| core::cmp::Reverse(chunk.used_count()));
        state.chunks.iter_mut().for_each(PoolChunk::sort_free_list);
        state.chunks.iter().filter(|chunk| chunk.is_fully_free()).count()
    }

    /// Checks every free list against block headers
    pub fn validate_free_list(&self) -> MemoryResult<()> {
        let state = self.state.lock();
        match self.free_list_findings(&state).into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Human readable list of chunks
    pub fn dump_chunks(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        let _ = writeln!(out, "[{}] {} chunk(s)", self.tag, state.chunks.len());
        for chunk in &state.chunks {
            let _ = writeln!(
                out,
                "  chunk #{} at {:#x}: {} blocks, {} used, {} free, {} bytes",
                chunk.id,
                chunk.start_addr(),
                chunk.block_count(),
                chunk.used_count(),
                chunk.free_count(),
                chunk.bytes()
            );
        }
        out
    }

    /// Human readable list of free block addresses
    pub fn dump_free_blocks(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        let _ = writeln!(out, "[{}] {} free block(s)", self.tag, state.free_blocks());
        for chunk in &state.chunks {
            for &index in chunk.free_indices().iter().rev() {
                let _ = writeln!(
                    out,
                    "  chunk #{} block {}: {:#x}",
                    chunk.id,
                    index,
                    chunk.payload_addr(&self.layout, index as usize)
                );
            }
        }
        out
    }

    /// Human readable list of blocks in use
    pub fn dump_used_blocks(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        let _ = writeln!(out, "[{}] {} used block(s)", self.tag, state.used_blocks());
        for chunk in &state.chunks {
            for (index, block) in chunk.live_blocks() {
                let _ = writeln!(out, "  chunk #{} block {}: {}", chunk.id, index, block);
            }
        }
        out
    }

    fn add_chunk(&self, state: &mut PoolState, blocks: usize) -> MemoryResult<()> {
        let chunk = PoolChunk::new(state.next_chunk_id, blocks, &self.layout)?;
        state.next_chunk_id = state.next_chunk_id.wrapping_add(1);
        state.chunks.push(chunk);
        state.growth_count += 1;
        state.stats.record_growth();

        self.logger.log(
            &MemoryEvent::new("grow", self.tag.name(), LogLevel::Info, "chunk added")
                .with_data("blocks", blocks)
                .with_data("total_blocks", state.total_blocks()),
        );
        Ok(())
    }

    /// Removes fully free chunks from the back while the total stays at or
    /// above `min_total` blocks; returns (chunks, bytes) removed
    fn shrink_to(&self, min_total: usize) -> (usize, usize) {
        let mut state = self.state.lock();
        let mut total = state.total_blocks();
        let mut removed = 0;
        let mut bytes = 0;
        let mut position = state.chunks.len();
        while position > 0 && state.chunks.len() > 1 {
            position -= 1;
            let chunk = &state.chunks[position];
            if chunk.is_fully_free() && total - chunk.block_count() >= min_total {
                total -= chunk.block_count();
                bytes += chunk.bytes();
                removed += 1;
                state.chunks.remove(position);
            }
        }
        state.shrink_count += removed as u64;
        drop(state);

        if removed > 0 {
            self.logger.log(
                &MemoryEvent::new("shrink", self.tag.name(), LogLevel::Info, "chunks removed")
                    .with_data("chunks", removed)
                    .with_data("bytes", bytes),
            );
        }
        (removed, bytes)
    }

    fn growth_blocks(&self, state: &PoolState) -> Option<usize> {
        if !self.config.allow_growth {
            return None;
        }
        let remaining = if self.config.max_blocks == 0 {
            usize::MAX
        } else {
            self.config.max_blocks.saturating_sub(state.total_blocks())
        };
        (remaining > 0).then(|| self.config.growth_increment.min(remaining))
    }

    fn try_allocate(
        &self,
        state: &mut PoolState,
        size: usize,
        alignment: usize,
        flags: AllocationFlags,
        location: SourceLocation,
    ) -> MemoryResult<MemoryBlock> {
        if size > self.layout.block_size {
            return Err(MemoryError::invalid_size(size, "request exceeds pool block size"));
        }
        if alignment > self.layout.alignment {
            return Err(MemoryError::invalid_alignment(alignment));
        }

        let found = state
            .chunks
            .iter_mut()
            .enumerate()
            .find_map(|(position, chunk)| chunk.pop_free().map(|index| (position, index)));
        let (position, index) = match found {
            Some(slot) => slot,
            None => {
                let Some(blocks) = self.growth_blocks(state) else {
                    return Err(MemoryError::out_of_memory(size, 0));
                };
                self.add_chunk(state, blocks)
                    .map_err(|_| MemoryError::out_of_memory(size, 0))?;
                let position = state.chunks.len() - 1;
                let index = state.chunks[position]
                    .pop_free()
                    .ok_or_else(|| MemoryError::out_of_memory(size, 0))?;
                (position, index)
            }
        };

        let chunk = &mut state.chunks[position];
        let address = chunk.payload_addr(&self.layout, index);
        let block = MemoryBlock::new(address, size, alignment, flags, location);
        chunk.write_header(
            &self.layout,
            index,
            BlockHeader {
                allocation_id: block.allocation_id,
                requested_size: size,
                magic: MAGIC_IN_USE,
                chunk_id: chunk.id,
                // Slot indices fit in u32, see PoolConfig::validate.
                index: index as u32,
                canary: CANARY,
            },
        );

        let fill = if flags.contains(AllocationFlags::ZERO_MEMORY) {
            Some(0)
        } else {
            self.config.alloc_pattern
        };
        if let Some(byte) = fill {
            chunk.fill_payload(&self.layout, index, byte);
        }
        chunk.set_live(index, Some(block.clone()));

        state.peak_used = state.peak_used.max(state.used_blocks());
        state.stats.record_allocation(size);
        Ok(block)
    }

    /// Checks canaries and identity fields of an in-use block's header
    fn check_guards(&self, chunk: &PoolChunk, index: usize, header: &BlockHeader) -> MemoryResult<()> {
        let address = chunk.payload_addr(&self.layout, index);
        if header.canary != CANARY {
            return Err(MemoryError::corruption(
                self.tag.name(),
                &format!("leading canary {:#x} before block {address:#x}", header.canary),
            ));
        }
        if header.chunk_id != chunk.id || header.index as usize != index {
            return Err(MemoryError::corruption(
                self.tag.name(),
                &format!("header identity overwritten at block {address:#x}"),
            ));
        }
        if self.layout.trailing_canary {
            let canary = chunk.read_trailing_canary(&self.layout, index);
            if canary != CANARY {
                return Err(MemoryError::corruption(
                    self.tag.name(),
                    &format!("trailing canary {canary:#x} after block {address:#x}"),
                ));
            }
        }
        Ok(())
    }

    /// Full integrity check of one in-use slot
    fn check_live(&self, chunk: &PoolChunk, index: usize, block: &MemoryBlock) -> MemoryResult<()> {
        let header = chunk.read_header(&self.layout, index);
        if header.magic != MAGIC_IN_USE {
            return Err(MemoryError::corruption(
                self.tag.name(),
                &format!(
                    "in-use block {:#x} carries magic {:#x}",
                    block.address, header.magic
                ),
            ));
        }
        self.check_guards(chunk, index, &header)?;
        if header.allocation_id != block.allocation_id || header.requested_size != block.size {
            return Err(MemoryError::corruption(
                self.tag.name(),
                &format!("header fields overwritten at block {:#x}", block.address),
            ));
        }
        Ok(())
    }

    fn free_list_findings(&self, state: &PoolState) -> Vec<MemoryError> {
        let mut findings = Vec::new();
        for chunk in &state.chunks {
            let mut seen = vec![false; chunk.block_count()];
            for &index in chunk.free_indices() {
                let index = index as usize;
                let address = chunk.payload_addr(&self.layout, index);
                if index >= chunk.block_count() || seen[index] {
                    findings.push(MemoryError::corruption(
                        self.tag.name(),
                        &format!("free list of chunk #{} repeats block {index}", chunk.id),
                    ));
                    continue;
                }
                seen[index] = true;
                if chunk.live(index).is_some() {
                    findings.push(MemoryError::corruption(
                        self.tag.name(),
                        &format!("block {address:#x} is both free and in use"),
                    ));
                }
                let header = chunk.read_header(&self.layout, index);
                if header.magic != MAGIC_FREE || header.canary != CANARY {
                    findings.push(MemoryError::corruption(
                        self.tag.name(),
                        &format!(
                            "free block {address:#x} header overwritten (magic {:#x})",
                            header.magic
                        ),
                    ));
                }
            }
            if chunk.used_count() + chunk.free_count() != chunk.block_count() {
                findings.push(MemoryError::corruption(
                    self.tag.name(),
                    &format!("chunk #{} loses blocks", chunk.id),
                ));
            }
        }
        findings
    }

    fn try_deallocate(&self, state: &mut PoolState, address: usize) -> MemoryResult<MemoryBlock> {
        let Some((position, index)) = state.locate(&self.layout, address) else {
            return Err(MemoryError::invalid_pointer(address, self.tag.name()));
        };
        let chunk = &mut state.chunks[position];
        let header = chunk.read_header(&self.layout, index);
        match header.magic {
            MAGIC_IN_USE => {}
            MAGIC_FREE => return Err(MemoryError::double_free(address)),
            other => {
                return Err(MemoryError::corruption(
                    self.tag.name(),
                    &format!("bad magic {other:#x} at block {address:#x}"),
                ));
            }
        }
        self.check_guards(chunk, index, &header)?;

        let Some(block) = chunk.set_live(index, None) else {
            return Err(MemoryError::corruption(
                self.tag.name(),
                &format!("block {address:#x} marked in use but has no record"),
            ));
        };
        chunk.write_header(&self.layout, index, BlockHeader::free(chunk.id, index as u32));
        let fill = if self.config.zero_on_free {
            Some(0)
        } else {
            self.config.dealloc_pattern
        };
        if let Some(byte) = fill {
            chunk.fill_payload(&self.layout, index, byte);
        }
        chunk.push_free(index);
        state.stats.record_deallocation(block.size);
        Ok(block)
    }
}

// SAFETY: MemoryPool upholds the Allocator contract.
// - Each slot is on exactly one of: its chunk's free list, or handed out
// - Payloads are `alignment`-aligned: chunk bases are, and both
//   `header_pad` and `stride` are multiples of the alignment
// - Chunks are only dropped while fully free
unsafe impl Allocator for MemoryPool {
    fn tag(&self) -> &AllocatorTag {
        &self.tag
    }

    fn hooks(&self) -> &AllocatorHooks {
        &self.hooks
    }

    fn allocate_at(
        &self,
        size: usize,
        alignment: usize,
        flags: AllocationFlags,
        location: SourceLocation,
    ) -> MemoryResult<NonNull<u8>> {
        let result = {
            let mut state = self.state.lock();
            let result = resolve_request(size, alignment, flags).and_then(|alignment| {
                self.try_allocate(&mut state, size, alignment, flags, location)
            });
            if result.is_err() {
                state.stats.record_failure();
            }
            result
        };

        match result {
            Ok(block) => {
                self.hooks.notify_allocate(&self.tag, &block);
                NonNull::new(block.address as *mut u8)
                    .ok_or_else(|| MemoryError::allocation_failed(size, alignment, "null payload"))
            }
            Err(error) => {
                report_failure(self.logger.as_ref(), self.tag.name(), &error);
                Err(error)
            }
        }
    }

    fn deallocate(&self, ptr: *mut u8) -> MemoryResult<()> {
        if ptr.is_null() {
            self.logger
                .warn("null_free", self.tag.name(), "deallocate called with null");
            return Ok(());
        }

        let result = {
            let mut state = self.state.lock();
            let result = self.try_deallocate(&mut state, ptr as usize);
            if let Err(error) = &result {
                state.record_integrity_failure(error);
            }
            result
        };

        match result {
            Ok(block) => {
                self.hooks.notify_deallocate(&self.tag, &block);
                Ok(())
            }
            Err(error @ MemoryError::InvalidPointer { .. }) => {
                report_failure(self.logger.as_ref(), self.tag.name(), &error);
                Err(error)
            }
            Err(error) => {
                report_corruption(
                    self.logger.as_ref(),
                    self.tag.name(),
                    self.config.on_corruption,
                    &error,
                );
                Err(error)
            }
        }
    }

    /// Resizes within the block; requests beyond the block size fail
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
        let alignment = resolve_request(new_size, alignment, AllocationFlags::empty())?;
        let old = resize_source(self, ptr, old_size)?;
        if new_size > self.layout.block_size {
            return Err(MemoryError::invalid_size(
                new_size,
                "request exceeds pool block size",
            ));
        }
        if alignment > self.layout.alignment || old.address % alignment != 0 {
            return Err(MemoryError::invalid_alignment(alignment));
        }

        let new = {
            let mut state = self.state.lock();
            let (position, index) = state
                .locate(&self.layout, old.address)
                .ok_or_else(|| MemoryError::invalid_pointer(old.address, self.tag.name()))?;
            let chunk = &mut state.chunks[position];
            let mut header = chunk.read_header(&self.layout, index);
            header.requested_size = new_size;
            chunk.write_header(&self.layout, index, header);
            let block = chunk
                .live_mut(index)
                .ok_or_else(|| MemoryError::invalid_pointer(old.address, self.tag.name()))?;
            block.size = new_size;
            let new = block.clone();
            state.stats.record_reallocation(old.size, new_size);
            new
        };

        self.hooks.notify_reallocate(&self.tag, &old, &new);
        // SAFETY: ptr was checked for null above.
        Ok(unsafe { NonNull::new_unchecked(ptr) })
    }

    fn reset(&self) {
        let released = {
            let mut state = self.state.lock();
            let mut released = Vec::new();
            for chunk in &mut state.chunks {
                released.extend(chunk.drain_live());
                chunk.format(&self.layout);
            }
            let bytes = released.iter().map(|block| block.size).sum();
            state.stats.record_release(released.len(), bytes);
            state.stats.record_reset();
            released
        };

        self.logger.log(
            &MemoryEvent::new("reset", self.tag.name(), LogLevel::Info, "pool reset")
                .with_data("released", released.len()),
        );
        self.hooks.notify_release(&self.tag, &released);
    }

    fn trim(&self) -> usize {
        self.shrink_to(1).1
    }

    fn compact(&self) -> usize {
        self.defragment();
        self.trim()
    }

    fn allocation_info(&self) -> AllocationInfo {
        let state = self.state.lock();
        let block_size = self.layout.block_size;
        let used = state.used_blocks();
        let slack: usize = state
            .chunks
            .iter()
            .flat_map(PoolChunk::live_blocks)
            .map(|(_, block)| block_size - block.size)
            .sum();
        AllocationInfo {
            total_memory: state.total_blocks() * block_size,
            used_memory: used * block_size,
            free_memory: state.free_blocks() * block_size,
            peak_memory: state.peak_used * block_size,
            allocation_count: used,
            fragmentation_loss: slack + used * self.layout.overhead(),
        }
    }

    fn statistics(&self) -> AllocatorStats {
        self.state.lock().stats
    }

    fn allocations(&self) -> Vec<MemoryBlock> {
        let state = self.state.lock();
        let mut blocks: Vec<MemoryBlock> = state
            .chunks
            .iter()
            .flat_map(PoolChunk::live_blocks)
            .map(|(_, block)| block.clone())
            .collect();
        blocks.sort_by_key(|block| block.address);
        blocks
    }

    fn contains(&self, ptr: *const u8) -> bool {
        let state = self.state.lock();
        state.chunks.iter().any(|chunk| chunk.contains_addr(ptr as usize))
    }

    fn block_info(&self, ptr: *const u8) -> Option<MemoryBlock> {
        let state = self.state.lock();
        let (position, index) = state.locate(&self.layout, ptr as usize)?;
        state.chunks[position].live(index).cloned()
    }

    fn validate(&self) -> bool {
        let findings = {
            let mut state = self.state.lock();
            let mut findings: Vec<MemoryError> = state
                .chunks
                .iter()
                .flat_map(|chunk| {
                    chunk
                        .live_blocks()
                        .filter_map(move |(index, block)| self.check_live(chunk, index, block).err())
                })
                .collect();
            findings.extend(self.free_list_findings(&state));
            for error in &findings {
                state.record_integrity_failure(error);
            }
            findings
        };

        for error in &findings {
            report_corruption(
                self.logger.as_ref(),
                self.tag.name(),
                self.config.on_corruption,
                error,
            );
        }
        findings.is_empty()
    }

    fn validate_pointer(&self, ptr: *const u8) -> MemoryResult<()> {
        let state = self.state.lock();
        let address = ptr as usize;
        let (position, index) = state
            .locate(&self.layout, address)
            .ok_or_else(|| MemoryError::invalid_pointer(address, self.tag.name()))?;
        let chunk = &state.chunks[position];
        let block = chunk
            .live(index)
            .ok_or_else(|| MemoryError::invalid_pointer(address, self.tag.name()))?;
        self.check_live(chunk, index, block)
    }

    fn dump_statistics(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[{}]", self.tag);
        let _ = writeln!(out, "{}", self.allocation_info());
        let _ = write!(out, "{}", self.statistics());
        let _ = write!(out, "{}", self.pool_stats());
        out
    }
}

impl core::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryPool")
            .field("tag", &self.tag)
            .field("block_size", &self.layout.block_size)
            .field("stride", &self.layout.stride)
            .field("chunks", &state.chunks.len())
            .field("used_blocks", &state.used_blocks())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::logging::RecordingLogger;

    fn alloc(pool: &MemoryPool) -> MemoryResult<*mut u8> {
        pool.allocate(64, 16, AllocationFlags::empty())
            .map(NonNull::as_ptr)
    }

    #[test]
    fn test_exhaustion_and_reuse() {
        let pool = MemoryPool::new(64, 4).unwrap();
        let blocks: Vec<_> = (0..4).map(|_| alloc(&pool).unwrap()).collect();
        assert_eq!(alloc(&pool).unwrap_err().kind(), ErrorKind::OutOfMemory);

        pool.deallocate(blocks[1]).unwrap();
        assert_eq!(alloc(&pool).unwrap(), blocks[1]);
        assert!(pool.check_conservation());
    }

    #[test]
    fn test_payloads_are_aligned_and_disjoint() {
        let pool = MemoryPool::with_config(PoolConfig {
            alignment: 64,
            ..PoolConfig::new(40, 8)
        })
        .unwrap();
        let mut addrs: Vec<usize> = (0..8)
            .map(|_| pool.allocate(40, 64, AllocationFlags::empty()).unwrap().as_ptr() as usize)
            .collect();
        assert!(addrs.iter().all(|a| a % 64 == 0));
        addrs.sort_unstable();
        assert!(addrs.windows(2).all(|w| w[1] - w[0] >= 40));
    }

    #[test]
    fn test_rejects_oversized_requests() {
        let pool = MemoryPool::new(64, 4).unwrap();
        assert_eq!(
            pool.allocate(65, 16, AllocationFlags::empty()).unwrap_err().kind(),
            ErrorKind::InvalidSize
        );
        assert_eq!(
            pool.allocate(8, 32, AllocationFlags::empty()).unwrap_err().kind(),
            ErrorKind::InvalidAlignment
        );
    }

    #[test]
    fn test_double_free_detected() {
        let logger = Arc::new(RecordingLogger::new());
        let pool = MemoryPool::new(64, 4).unwrap().with_logger(logger.clone());
        let a = alloc(&pool).unwrap();
        pool.deallocate(a).unwrap();

        let err = pool.deallocate(a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DoubleFree);
        assert_eq!(pool.pool_stats().double_free_count, 1);
        assert_eq!(logger.count("double_free"), 1);
        assert!(pool.check_conservation());
        assert!(pool.validate_free_list().is_ok());
        assert_eq!(pool.free_blocks(), 4);
    }

    #[test]
    fn test_invalid_pointers() {
        let pool = MemoryPool::new(64, 4).unwrap();
        let a = alloc(&pool).unwrap();

        let err = pool.deallocate(unsafe { a.add(8) }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPointer);

        let mut local = [0u8; 8];
        let err = pool.deallocate(local.as_mut_ptr()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPointer);
        assert_eq!(pool.pool_stats().invalid_free_count, 2);
        assert_eq!(pool.used_blocks(), 1);
    }

    #[test]
    fn test_overflow_caught_by_trailing_canary() {
        let pool = MemoryPool::new(64, 4).unwrap();
        let a = alloc(&pool).unwrap();
        unsafe { a.add(64).write(0x41) };

        assert!(!pool.validate());
        let err = pool.deallocate(a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptionDetected);
        assert_eq!(pool.used_blocks(), 1);
        assert!(pool.check_conservation());
    }

    #[test]
    fn test_growth_and_shrink() {
        let config = PoolConfig::new(32, 2).with_growth(2, 6);
        let pool = MemoryPool::with_config(config).unwrap();
        let blocks: Vec<_> = (0..6)
            .map(|_| pool.allocate(32, 16, AllocationFlags::empty()).unwrap().as_ptr())
            .collect();
        assert_eq!(pool.chunk_count(), 3);
        assert_eq!(
            pool.allocate(32, 16, AllocationFlags::empty()).unwrap_err().kind(),
            ErrorKind::OutOfMemory
        );

        // Chunk 2 still holds a block, so only chunk 3 can go.
        pool.deallocate(blocks[5]).unwrap();
        pool.deallocate(blocks[4]).unwrap();
        pool.deallocate(blocks[3]).unwrap();
        assert_eq!(pool.shrink(), 1);
        assert_eq!(pool.total_blocks(), 4);
        assert!(pool.check_conservation());
    }

    #[test]
    fn test_resize_and_grow_limits() {
        let config = PoolConfig::new(32, 4).with_growth(4, 12);
        let pool = MemoryPool::with_config(config).unwrap();
        assert_eq!(pool.resize(12).unwrap(), 12);
        assert_eq!(
            pool.grow(1).unwrap_err().kind(),
            ErrorKind::OutOfMemory
        );
        assert_eq!(pool.resize(4).unwrap(), 4);
        assert_eq!(pool.chunk_count(), 1);
    }

    #[test]
    fn test_defragment_prefers_busy_chunks() {
        let pool = MemoryPool::new(16, 2).unwrap();
        pool.grow(2).unwrap();
        let blocks: Vec<_> = (0..4)
            .map(|_| pool.allocate(16, 16, AllocationFlags::empty()).unwrap().as_ptr())
            .collect();
        pool.deallocate(blocks[0]).unwrap();
        pool.deallocate(blocks[1]).unwrap();
        pool.deallocate(blocks[3]).unwrap();

        assert_eq!(pool.defragment(), 1);
        let next = pool.allocate(16, 16, AllocationFlags::empty()).unwrap();
        assert_eq!(next.as_ptr(), blocks[3]);
        assert_eq!(pool.compact(), pool.stride() * 2);
    }

    #[test]
    fn test_reset_frees_everything() {
        let pool = MemoryPool::new(64, 4).unwrap();
        for _ in 0..3 {
            alloc(&pool).unwrap();
        }
        pool.reset();
        assert_eq!(pool.used_blocks(), 0);
        assert_eq!(pool.allocation_count(), 0);
        assert!(pool.validate());
        assert_eq!(pool.statistics().reset_count, 1);
    }

    #[test]
    fn test_reallocate_within_block() {
        let pool = MemoryPool::new(64, 2).unwrap();
        let a = pool.allocate(16, 16, AllocationFlags::empty()).unwrap();
        let b = pool.reallocate(a.as_ptr(), 16, 48, 16).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.block_info(b.as_ptr()).unwrap().size, 48);
        assert!(pool.validate_pointer(b.as_ptr()).is_ok());
        assert_eq!(
            pool.reallocate(b.as_ptr(), 48, 65, 16).unwrap_err().kind(),
            ErrorKind::InvalidSize
        );
    }

    #[test]
    fn test_zero_on_free() {
        let pool = MemoryPool::with_config(PoolConfig {
            zero_on_free: true,
            alloc_pattern: Some(0xAA),
            ..PoolConfig::new(32, 1)
        })
        .unwrap();
        let a = pool.allocate(32, 16, AllocationFlags::empty()).unwrap();
        assert_eq!(unsafe { *a.as_ptr() }, 0xAA);
        pool.deallocate(a.as_ptr()).unwrap();
        assert_eq!(unsafe { *a.as_ptr() }, 0);
    }

    #[test]
    fn test_for_type() {
        #[allow(dead_code)]
        struct Particle {
            position: [f32; 3],
            velocity: [f32; 3],
            ttl: u64,
        }
        let pool = MemoryPool::for_type::<Particle>(8).unwrap();
        assert_eq!(pool.block_size(), core::mem::size_of::<Particle>());
        let p = pool
            .allocate(core::mem::size_of::<Particle>(), 8, AllocationFlags::empty())
            .unwrap();
        assert_eq!(p.as_ptr() as usize % core::mem::align_of::<Particle>(), 0);
        assert!(pool.dump_used_blocks().contains("1 used block"));
    }
}
