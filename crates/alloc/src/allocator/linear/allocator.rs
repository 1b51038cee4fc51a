//! Main linear allocator implementation
//!
//! # Safety
//!
//! The allocator hands out disjoint ranges of one [`AlignedBuffer`]:
//! - All state (cursor, registry, statistics) lives behind one mutex
//! - Payload bytes are only written under that mutex before the pointer is
//!   returned, or by the caller through the pointer it owns
//! - Optional headers sit directly in front of each payload and are read
//!   and written unaligned
//!
//! ## Invariants
//!
//! - `offset <= buffer.len()`
//! - Every registered block lies inside `[start, start + offset)`
//! - Registered blocks never overlap and are ordered by address
//! - The buffer is only replaced while no block is registered, so growth
//!   never invalidates a live pointer

use core::ptr::NonNull;

use parking_lot::Mutex;

use super::{LinearConfig, LinearMarker, LinearScope};
use crate::allocator::traits::{relocate, resize_source};
use crate::allocator::{Allocator, AllocatorHooks, report_corruption, report_failure, resolve_request};
use crate::core::alignment::checked_align_up;
use crate::core::{AlignedBuffer, AllocationFlags, AllocatorTag, CACHE_LINE_SIZE, SourceLocation, size};
use crate::error::{MemoryError, MemoryResult};
use crate::logging::{LogLevel, MemoryEvent, SharedLogger, default_logger};
use crate::registry::{AllocationInfo, AllocatorStats, BlockRegistry, MemoryBlock};

const HEADER_CANARY: u32 = 0xDEAD_BEEF;

/// Bookkeeping written in front of each payload when headers are enabled
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct LinearAllocationHeader {
    size: usize,
    alignment: usize,
    allocation_id: u64,
    flags: u32,
    canary: u32,
}

const HEADER_SIZE: usize = core::mem::size_of::<LinearAllocationHeader>();

struct LinearState {
    buffer: AlignedBuffer,
    offset: usize,
    peak_offset: usize,
    registry: BlockRegistry,
    stats: AllocatorStats,
    generation: u32,
    /// Highest offset of any marker that may still be rewound to
    marker_floor: usize,
}

impl LinearState {
    fn base(&self) -> usize {
        self.buffer.start_addr()
    }

    /// Payload address for a request at the current cursor, if it fits
    fn place(&self, header: usize, size: usize, alignment: usize) -> Option<(usize, usize)> {
        let cursor = self.base() + self.offset;
        let payload = checked_align_up(cursor.checked_add(header)?, alignment)?;
        let end = payload.checked_add(size)?;
        (end <= self.buffer.end_addr()).then_some((payload, end))
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }
}

/// Bump allocator over a single arena
///
/// Allocation advances a cursor; individual deallocation is a no-op.
/// Memory comes back through [`reset`](Allocator::reset), through
/// [`rewind`](Self::rewind) to a [`LinearMarker`], or when a
/// [`LinearScope`] ends.
///
/// # Memory Layout
/// ```text
/// [start][hdr?][alloc1][pad][hdr?][alloc2]----[cursor]----[free]----[end]
/// ```
pub struct LinearAllocator {
    state: Mutex<LinearState>,
    config: LinearConfig,
    initial_capacity: usize,
    tag: AllocatorTag,
    hooks: AllocatorHooks,
    logger: SharedLogger,
}

impl LinearAllocator {
    /// Creates a new linear allocator with custom configuration
    pub fn with_config(capacity: usize, config: LinearConfig) -> MemoryResult<Self> {
        config.validate()?;
        if capacity == 0 {
            return Err(MemoryError::invalid_config("capacity cannot be zero"));
        }
        if config.max_capacity != 0 && capacity > config.max_capacity {
            return Err(MemoryError::invalid_config(
                "capacity exceeds max_capacity",
            ));
        }

        let buffer = AlignedBuffer::new(capacity, CACHE_LINE_SIZE)?;
        let tag = AllocatorTag::new(&config.name);

        Ok(Self {
            state: Mutex::new(LinearState {
                buffer,
                offset: 0,
                peak_offset: 0,
                registry: BlockRegistry::new(),
                stats: AllocatorStats::new(),
                generation: 0,
                marker_floor: 0,
            }),
            config,
            initial_capacity: capacity,
            tag,
            hooks: AllocatorHooks::new(),
            logger: default_logger(),
        })
    }

    /// Creates a new linear allocator with default configuration
    pub fn new(capacity: usize) -> MemoryResult<Self> {
        Self::with_config(capacity, LinearConfig::default())
    }

    /// Creates a production-optimized linear allocator
    pub fn production(capacity: usize) -> MemoryResult<Self> {
        Self::with_config(capacity, LinearConfig::production())
    }

    /// Creates a debug-optimized linear allocator
    pub fn debug(capacity: usize) -> MemoryResult<Self> {
        Self::with_config(capacity, LinearConfig::debug())
    }

    /// Creates a performance-optimized linear allocator
    pub fn performance(capacity: usize) -> MemoryResult<Self> {
        Self::with_config(capacity, LinearConfig::performance())
    }

    /// 64 KiB arena
    pub fn small() -> MemoryResult<Self> {
        Self::new(64 * size::KB)
    }

    /// 1 MiB arena
    pub fn medium() -> MemoryResult<Self> {
        Self::new(size::MB)
    }

    /// 16 MiB arena
    pub fn large() -> MemoryResult<Self> {
        Self::new(16 * size::MB)
    }

    /// Replaces the logger
    #[must_use = "builder methods must be chained or built"]
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    /// Current arena size in bytes
    pub fn capacity(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Bytes consumed by the cursor, padding and headers included
    pub fn used(&self) -> usize {
        self.state.lock().offset
    }

    /// Bytes left behind the cursor
    pub fn available(&self) -> usize {
        self.state.lock().remaining()
    }

    /// Share of the arena consumed, in `0.0..=1.0`
    pub fn usage_ratio(&self) -> f64 {
        let state = self.state.lock();
        state.offset as f64 / state.buffer.len() as f64
    }

    /// Returns true if a request would currently succeed without growth
    pub fn can_allocate(&self, size: usize, alignment: usize) -> bool {
        let Ok(alignment) = resolve_request(size, alignment, AllocationFlags::empty()) else {
            return false;
        };
        let state = self.state.lock();
        if self.at_allocation_limit(&state) {
            return false;
        }
        state.place(self.header_size(), size, alignment).is_some()
    }

    /// Allocates `size` bytes at the configured default alignment
    #[track_caller]
    pub fn alloc(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        self.allocate_at(
            size,
            self.config.default_alignment,
            AllocationFlags::empty(),
            SourceLocation::caller(),
        )
    }

    /// Records the current cursor
    pub fn marker(&self) -> LinearMarker {
        let mut state = self.state.lock();
        state.marker_floor = state.marker_floor.max(state.offset);
        LinearMarker {
            offset: state.offset,
            allocation_count: state.registry.len(),
            generation: state.generation,
        }
    }

    /// Releases everything allocated after `marker` was taken
    ///
    /// Markers taken before the last [`reset`](Allocator::reset) are
    /// refused, as are markers that would cut a live allocation in half.
    pub fn rewind(&self, marker: LinearMarker) -> MemoryResult<()> {
        let released = {
            let mut state = self.state.lock();
            if marker.generation != state.generation {
                return Err(MemoryError::invalid_state(
                    "marker was taken before the last reset",
                ));
            }
            if marker.offset > state.offset {
                return Err(MemoryError::invalid_state("marker is ahead of the cursor"));
            }

            let boundary = state.base() + marker.offset;
            if let Some(block) = state.registry.find_containing(boundary) {
                if block.address < boundary {
                    return Err(MemoryError::invalid_state(
                        "marker falls inside a live allocation",
                    ));
                }
            }

            let released = state.registry.release_from(boundary);
            self.clear_range(&state, marker.offset, state.offset);
            state.offset = marker.offset;
            state.marker_floor = marker.offset;

            let bytes = released.iter().map(|block| block.size).sum();
            state.stats.record_release(released.len(), bytes);
            released
        };

        if !released.is_empty() {
            self.logger.log(
                &MemoryEvent::new("rewind", self.tag.name(), LogLevel::Debug, "rewound to marker")
                    .with_data("released", released.len())
                    .with_data("offset", marker.offset),
            );
        }
        self.hooks.notify_release(&self.tag, &released);
        Ok(())
    }

    /// Opens a scope that rewinds to the current cursor when dropped
    pub fn scope(&self) -> LinearScope<'_> {
        LinearScope::new(self)
    }

    /// Number of resets performed so far
    pub fn generation(&self) -> u32 {
        self.state.lock().generation
    }

    /// Logs a scope that could not rewind on drop
    pub(super) fn report_scope_failure(&self, error: &MemoryError) {
        report_failure(self.logger.as_ref(), self.tag.name(), error);
    }

    fn header_size(&self) -> usize {
        if self.config.use_headers { HEADER_SIZE } else { 0 }
    }

    fn at_allocation_limit(&self, state: &LinearState) -> bool {
        self.config.max_allocations != 0 && state.registry.len() >= self.config.max_allocations
    }

    /// Zeroes or poisons `from..to` depending on configuration
    fn clear_range(&self, state: &LinearState, from: usize, to: usize) {
        if to <= from {
            return;
        }
        let byte = if self.config.zero_on_reset {
            Some(0)
        } else {
            self.config.dealloc_pattern
        };
        if let Some(byte) = byte {
            // SAFETY: Clearing the consumed range being released.
            // - from < to <= offset <= buffer.len()
            // - No block remains registered inside the range
            unsafe { state.buffer.fill(from, to - from, byte) }
        }
    }

    /// Replaces the arena with one large enough for the request
    ///
    /// Only called while no allocation is live.
    fn grow(&self, state: &mut LinearState, size: usize, alignment: usize) -> MemoryResult<()> {
        let required = checked_align_up(self.header_size(), alignment)
            .and_then(|prefix| prefix.checked_add(size))
            .ok_or_else(|| MemoryError::size_overflow("linear growth"))?;
        let mut new_capacity = state
            .buffer
            .len()
            .saturating_add(self.config.growth_increment)
            .max(required);

        if self.config.max_capacity != 0 {
            if required > self.config.max_capacity {
                return Err(MemoryError::out_of_memory(size, state.remaining()));
            }
            new_capacity = new_capacity.min(self.config.max_capacity);
            if new_capacity <= state.buffer.len() {
                return Err(MemoryError::out_of_memory(size, state.remaining()));
            }
        }

        let buffer = AlignedBuffer::new(new_capacity, alignment.max(CACHE_LINE_SIZE))
            .map_err(|_| MemoryError::out_of_memory(size, state.remaining()))?;
        let old_capacity = state.buffer.len();
        state.buffer = buffer;
        state.offset = 0;
        state.marker_floor = 0;
        state.stats.record_growth();

        self.logger.log(
            &MemoryEvent::new("grow", self.tag.name(), LogLevel::Info, "arena replaced")
                .with_data("old_capacity", old_capacity)
                .with_data("new_capacity", new_capacity),
        );
        Ok(())
    }

    fn try_allocate(
        &self,
        state: &mut LinearState,
        size: usize,
        alignment: usize,
        flags: AllocationFlags,
        location: SourceLocation,
    ) -> MemoryResult<MemoryBlock> {
        if self.at_allocation_limit(state) {
            return Err(MemoryError::allocation_failed(
                size,
                alignment,
                "max_allocations reached",
            ));
        }

        let header = self.header_size();
        let (payload, end) = match state.place(header, size, alignment) {
            Some(placement) => placement,
            None if self.config.allow_growth && state.registry.is_empty() => {
                self.grow(state, size, alignment)?;
                state
                    .place(header, size, alignment)
                    .ok_or_else(|| MemoryError::out_of_memory(size, state.remaining()))?
            }
            None => return Err(MemoryError::out_of_memory(size, state.remaining())),
        };

        let block = MemoryBlock::new(payload, size, alignment, flags, location);
        let base = state.base();

        if header != 0 {
            let header = LinearAllocationHeader {
                size,
                alignment,
                allocation_id: block.allocation_id,
                flags: flags.bits(),
                canary: HEADER_CANARY,
            };
            // SAFETY: Writing the header in front of the payload.
            // - payload - HEADER_SIZE >= cursor (place reserved it)
            // - Range is inside the buffer and not part of any live block
            unsafe {
                state
                    .buffer
                    .at(payload - base - HEADER_SIZE)
                    .cast::<LinearAllocationHeader>()
                    .write_unaligned(header);
            }
        }

        let fill = if flags.contains(AllocationFlags::ZERO_MEMORY) {
            Some(0)
        } else {
            self.config.alloc_pattern
        };
        if let Some(byte) = fill {
            // SAFETY: Payload range was just reserved and is exclusively ours.
            unsafe { state.buffer.fill(payload - base, size, byte) }
        }

        state.offset = end - base;
        state.peak_offset = state.peak_offset.max(state.offset);
        state.registry.insert(block.clone());
        state.stats.record_allocation(size);
        Ok(block)
    }

    fn check_header(&self, state: &LinearState, block: &MemoryBlock) -> MemoryResult<()> {
        if !self.config.use_headers {
            return Ok(());
        }
        // SAFETY: Reading the header written by try_allocate.
        // - Every registered block has HEADER_SIZE bytes in front of it
        //   inside the buffer when headers are enabled
        let header = unsafe {
            state
                .buffer
                .at(block.address - state.base() - HEADER_SIZE)
                .cast::<LinearAllocationHeader>()
                .read_unaligned()
        };
        if header.canary != HEADER_CANARY {
            return Err(MemoryError::corruption(
                self.tag.name(),
                &format!(
                    "header canary {:#x} at block {:#x}",
                    header.canary, block.address
                ),
            ));
        }
        if header.size != block.size || header.allocation_id != block.allocation_id {
            return Err(MemoryError::corruption(
                self.tag.name(),
                &format!("header fields overwritten at block {:#x}", block.address),
            ));
        }
        Ok(())
    }
}

// SAFETY: LinearAllocator upholds the Allocator contract.
// - Payload ranges come from a monotonically advancing cursor under a mutex
// - Payloads are aligned by checked_align_up on absolute addresses
// - The buffer is only replaced while no allocation is live
unsafe impl Allocator for LinearAllocator {
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
                // Payload addresses are offsets from a non-null base.
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
        if self.state.lock().registry.contains(ptr as usize) {
            // Individual frees are not supported; memory returns on reset.
            return Ok(());
        }
        let error = MemoryError::invalid_pointer(ptr as usize, self.tag.name());
        report_failure(self.logger.as_ref(), self.tag.name(), &error);
        Err(error)
    }

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

        // The newest allocation can be resized in place unless a marker was
        // taken after it; moving the cursor would strand that marker.
        let resized = {
            let mut state = self.state.lock();
            let base = state.base();
            let is_tail = state.registry.last().map(|b| b.address) == Some(old.address);
            let fits = old.address + new_size <= state.buffer.end_addr();
            let above_markers = old.address - base >= state.marker_floor;
            if is_tail && fits && above_markers && old.address % alignment == 0 {
                if new_size > old.size && old.flags.contains(AllocationFlags::ZERO_MEMORY) {
                    // SAFETY: Growing tail range is inside the buffer and unused.
                    unsafe { state.buffer.fill(old.end() - base, new_size - old.size, 0) }
                }
                let mut new = old.clone();
                new.size = new_size;
                if let Some(block) = state.registry.get_mut(old.address) {
                    block.size = new_size;
                }
                if self.config.use_headers {
                    // SAFETY: Updating the size field of this block's header.
                    unsafe {
                        let header = state
                            .buffer
                            .at(old.address - base - HEADER_SIZE)
                            .cast::<LinearAllocationHeader>();
                        let mut value = header.read_unaligned();
                        value.size = new_size;
                        header.write_unaligned(value);
                    }
                }
                state.offset = new.end() - base;
                state.peak_offset = state.peak_offset.max(state.offset);
                state.stats.record_reallocation(old.size, new_size);
                Some(new)
            } else {
                None
            }
        };

        if let Some(new) = resized {
            self.hooks.notify_reallocate(&self.tag, &old, &new);
            // SAFETY: ptr was checked for null above.
            return Ok(unsafe { NonNull::new_unchecked(ptr) });
        }

        let new_ptr = relocate(self, ptr, &old, old_size, new_size, alignment)?;
        if let Some(new) = self.block_info(new_ptr.as_ptr()) {
            self.state.lock().stats.total_reallocations += 1;
            self.hooks.notify_reallocate(&self.tag, &old, &new);
        }
        Ok(new_ptr)
    }

    fn reset(&self) {
        let released = {
            let mut state = self.state.lock();
            let released = state.registry.drain();
            let used = state.offset;
            self.clear_range(&state, 0, used);
            state.offset = 0;
            state.marker_floor = 0;
            state.generation = state.generation.wrapping_add(1);

            let bytes = released.iter().map(|block| block.size).sum();
            state.stats.record_release(released.len(), bytes);
            state.stats.record_reset();
            released
        };

        self.logger.log(
            &MemoryEvent::new("reset", self.tag.name(), LogLevel::Info, "arena reset")
                .with_data("released", released.len()),
        );
        self.hooks.notify_release(&self.tag, &released);
    }

    fn trim(&self) -> usize {
        let mut state = self.state.lock();
        if !state.registry.is_empty() || state.buffer.len() <= self.initial_capacity {
            return 0;
        }
        let Ok(buffer) = AlignedBuffer::new(self.initial_capacity, CACHE_LINE_SIZE) else {
            return 0;
        };
        let released = state.buffer.len() - buffer.len();
        state.buffer = buffer;
        state.offset = 0;
        state.marker_floor = 0;
        drop(state);

        self.logger.log(
            &MemoryEvent::new("shrink", self.tag.name(), LogLevel::Info, "arena trimmed")
                .with_data("released_bytes", released),
        );
        released
    }

    fn allocation_info(&self) -> AllocationInfo {
        let state = self.state.lock();
        AllocationInfo {
            total_memory: state.buffer.len(),
            used_memory: state.offset,
            free_memory: state.remaining(),
            peak_memory: state.peak_offset,
            allocation_count: state.registry.len(),
            fragmentation_loss: state.offset - state.registry.total_bytes(),
        }
    }

    fn statistics(&self) -> AllocatorStats {
        self.state.lock().stats
    }

    fn allocations(&self) -> Vec<MemoryBlock> {
        self.state.lock().registry.snapshot()
    }

    fn contains(&self, ptr: *const u8) -> bool {
        self.state.lock().buffer.contains_addr(ptr as usize)
    }

    fn block_info(&self, ptr: *const u8) -> Option<MemoryBlock> {
        self.state.lock().registry.get(ptr as usize).cloned()
    }

    fn validate(&self) -> bool {
        let findings: Vec<MemoryError> = {
            let mut state = self.state.lock();
            let mut findings: Vec<MemoryError> = state
                .registry
                .iter()
                .filter_map(|block| self.check_header(&state, block).err())
                .collect();
            if let Some((a, b)) = state.registry.find_overlap() {
                findings.push(MemoryError::corruption(
                    self.tag.name(),
                    &format!("blocks {:#x} and {:#x} overlap", a.address, b.address),
                ));
            }
            for _ in &findings {
                state.stats.record_corruption();
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
        let block = state
            .registry
            .get(ptr as usize)
            .ok_or_else(|| MemoryError::invalid_pointer(ptr as usize, self.tag.name()))?;
        self.check_header(&state, block)
    }
}

impl core::fmt::Debug for LinearAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LinearAllocator")
            .field("tag", &self.tag)
            .field("capacity", &state.buffer.len())
            .field("offset", &state.offset)
            .field("allocations", &state.registry.len())
            .finish_non_exhaustive()
    }
}
