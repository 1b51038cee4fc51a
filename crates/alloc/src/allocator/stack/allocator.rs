//! Main stack allocator implementation
//!
//! # Safety
//!
//! The allocator hands out disjoint ranges of one [`AlignedBuffer`]:
//! - All state (cursor, markers, frames, registry) lives behind one mutex
//! - Every payload is preceded by a [`StackAllocationHeader`] recording the
//!   cursor before the allocation, read and written unaligned
//! - Only the newest allocation can be released individually
//!
//! ## Invariants
//!
//! - `offset <= buffer.len()`
//! - The buffer is only replaced while no block is registered; with no
//!   block live every marker sits at offset zero
//! - Registered blocks never overlap and are ordered by address
//! - Each header's `previous_position` equals the end of the block below it
//!   (or zero for the first block)
//! - Marker offsets are non-decreasing from the bottom of the marker stack
//!   to the top, and no live block straddles a marker offset

use core::fmt::Write as _;
use core::ptr::NonNull;

use parking_lot::Mutex;

use super::frame::StackFrame;
use super::marker::MarkerRecord;
use super::{MarkerId, StackConfig, StackScope};
use crate::allocator::traits::{relocate, resize_source};
use crate::allocator::{Allocator, AllocatorHooks, report_corruption, report_failure, resolve_request};
use crate::core::alignment::checked_align_up;
use crate::core::{AlignedBuffer, AllocationFlags, AllocatorTag, CACHE_LINE_SIZE, SourceLocation, size};
use crate::error::{MemoryError, MemoryResult};
use crate::logging::{LogLevel, MemoryEvent, SharedLogger, default_logger};
use crate::registry::{AllocationInfo, AllocatorStats, BlockRegistry, MemoryBlock};

const HEADER_CANARY: u32 = 0xBADC_0FFE;

/// Bookkeeping written in front of every payload
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct StackAllocationHeader {
    size: usize,
    alignment: usize,
    previous_position: usize,
    allocation_id: u64,
    flags: u32,
    canary: u32,
}

const HEADER_SIZE: usize = core::mem::size_of::<StackAllocationHeader>();

struct StackState {
    buffer: AlignedBuffer,
    offset: usize,
    peak_offset: usize,
    registry: BlockRegistry,
    markers: Vec<MarkerRecord>,
    frames: Vec<StackFrame>,
    next_marker: u32,
    peak_depth: usize,
    overflow_count: u64,
    underflow_count: u64,
    stats: AllocatorStats,
}

impl StackState {
    fn base(&self) -> usize {
        self.buffer.start_addr()
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    /// Header-prefixed payload address for a request at the cursor, if it fits
    fn place(&self, size: usize, alignment: usize) -> Option<(usize, usize)> {
        let payload = checked_align_up((self.base() + self.offset).checked_add(HEADER_SIZE)?, alignment)?;
        let end = payload.checked_add(size)?;
        (end <= self.buffer.end_addr()).then_some((payload, end))
    }

    fn header_ptr(&self, block_address: usize) -> *mut StackAllocationHeader {
        // SAFETY: Every registered block has a header directly in front of
        // it inside the buffer.
        unsafe {
            self.buffer
                .at(block_address - self.base() - HEADER_SIZE)
                .cast::<StackAllocationHeader>()
        }
    }

    fn read_header(&self, block_address: usize) -> StackAllocationHeader {
        // SAFETY: Header written by try_allocate, see header_ptr.
        unsafe { self.header_ptr(block_address).read_unaligned() }
    }

    fn marker_index(&self, id: MarkerId) -> Option<usize> {
        self.markers.iter().rposition(|marker| marker.id == id)
    }
}

/// Stack allocator that supports LIFO allocation and deallocation
///
/// Allocations are released in reverse order, either one by one from the
/// top or in bulk by popping a marker. Named frames add debugging
/// bookkeeping on top of markers and must nest strictly.
///
/// # Memory Layout
/// ```text
/// [start][hdr][alloc1][pad][hdr][alloc2]----[top]----[free]----[end]
///                 ^ marker                   <-- available -->
/// ```
pub struct StackAllocator {
    state: Mutex<StackState>,
    config: StackConfig,
    initial_capacity: usize,
    tag: AllocatorTag,
    hooks: AllocatorHooks,
    logger: SharedLogger,
}

impl StackAllocator {
    /// Creates a new stack allocator with custom configuration
    pub fn with_config(capacity: usize, config: StackConfig) -> MemoryResult<Self> {
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
            state: Mutex::new(StackState {
                buffer,
                offset: 0,
                peak_offset: 0,
                registry: BlockRegistry::new(),
                markers: Vec::new(),
                frames: Vec::new(),
                next_marker: 1,
                peak_depth: 0,
                overflow_count: 0,
                underflow_count: 0,
                stats: AllocatorStats::new(),
            }),
            config,
            initial_capacity: capacity,
            tag,
            hooks: AllocatorHooks::new(),
            logger: default_logger(),
        })
    }

    /// Creates a new stack allocator with default configuration
    pub fn new(capacity: usize) -> MemoryResult<Self> {
        Self::with_config(capacity, StackConfig::default())
    }

    /// Creates a production-optimized stack allocator
    pub fn production(capacity: usize) -> MemoryResult<Self> {
        Self::with_config(capacity, StackConfig::production())
    }

    /// Creates a debug-optimized stack allocator
    pub fn debug(capacity: usize) -> MemoryResult<Self> {
        Self::with_config(capacity, StackConfig::debug())
    }

    /// Creates a performance-optimized stack allocator
    pub fn performance(capacity: usize) -> MemoryResult<Self> {
        Self::with_config(capacity, StackConfig::performance())
    }

    /// 64 KiB stack
    pub fn small() -> MemoryResult<Self> {
        Self::new(64 * size::KB)
    }

    /// 1 MiB stack
    pub fn medium() -> MemoryResult<Self> {
        Self::new(size::MB)
    }

    /// 16 MiB stack
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
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Returns the total capacity of the allocator
    pub fn capacity(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Returns the amount of memory currently consumed, headers included
    pub fn used(&self) -> usize {
        self.state.lock().offset
    }

    /// Returns the amount of memory available for allocation
    pub fn available(&self) -> usize {
        self.state.lock().remaining()
    }

    /// Number of markers on the marker stack
    pub fn marker_depth(&self) -> usize {
        self.state.lock().markers.len()
    }

    /// Deepest marker stack observed
    pub fn peak_depth(&self) -> usize {
        self.state.lock().peak_depth
    }

    /// Newest marker, if any
    pub fn top_marker(&self) -> Option<MarkerId> {
        self.state.lock().markers.last().map(|marker| marker.id)
    }

    /// Number of rejected overflowing requests
    pub fn overflow_count(&self) -> u64 {
        self.state.lock().overflow_count
    }

    /// Number of rejected pops
    pub fn underflow_count(&self) -> u64 {
        self.state.lock().underflow_count
    }

    /// Pushes a marker at the current cursor
    ///
    /// Fails with `StackOverflow` once `max_stack_depth` markers are live.
    pub fn push_marker(&self) -> MemoryResult<MarkerId> {
        let mut state = self.state.lock();
        let id = self.push_marker_locked(&mut state)?;
        drop(state);

        self.logger
            .log_with_level(LogLevel::Trace, "push_marker", self.tag.name(), "marker pushed");
        Ok(id)
    }

    /// Pops `id` and every newer marker, releasing everything allocated
    /// since `id` was pushed
    ///
    /// Fails with `StackUnderflow`, without touching memory, when no marker
    /// is live or `id` is not on the marker stack. Frames backed by popped
    /// markers are closed.
    pub fn pop_to_marker(&self, id: MarkerId) -> MemoryResult<()> {
        self.pop_locked(|state| {
            if state.markers.is_empty() {
                return Err(MemoryError::stack_underflow("no markers to pop"));
            }
            state
                .marker_index(id)
                .ok_or_else(|| MemoryError::stack_underflow(&format!("{id} is not on the marker stack")))
        })
        .map(|_| ())
    }

    /// Pops the newest marker
    pub fn pop_marker(&self) -> MemoryResult<()> {
        self.pop_locked(|state| {
            if state.markers.is_empty() {
                Err(MemoryError::stack_underflow("no markers to pop"))
            } else {
                Ok(state.markers.len() - 1)
            }
        })
        .map(|_| ())
    }

    /// Opens a scope that pops back to a fresh marker when dropped
    pub fn scope(&self) -> MemoryResult<StackScope<'_>> {
        let marker = self.push_marker()?;
        Ok(StackScope::new(self, marker))
    }

    /// Pushes a named frame recording the caller's location
    #[track_caller]
    pub fn push_frame(&self, name: &str) -> MemoryResult<MarkerId> {
        let location = SourceLocation::caller();
        let mut state = self.state.lock();
        let id = self.push_marker_locked(&mut state)?;
        let position = state.offset;
        state
            .frames
            .push(StackFrame::new(name, id, position, location));
        let depth = state.frames.len();
        drop(state);

        self.logger.log(
            &MemoryEvent::new("frame_push", self.tag.name(), LogLevel::Debug, name)
                .with_data("depth", depth)
                .with_data("location", location),
        );
        Ok(id)
    }

    /// Pops the innermost frame, which must be `id`
    ///
    /// Popping any other frame fails with `StackUnderflow` and changes
    /// nothing. Returns the closed frame's bookkeeping.
    pub fn pop_frame(&self, id: MarkerId) -> MemoryResult<StackFrame> {
        let frames = self.pop_locked(|state| {
            match state.frames.last() {
                None => return Err(MemoryError::stack_underflow("no frames to pop")),
                Some(frame) if frame.marker != id => {
                    let reason = if state.frames.iter().any(|frame| frame.marker == id) {
                        format!("{id} is not the innermost frame")
                    } else {
                        format!("{id} is not an open frame")
                    };
                    return Err(MemoryError::stack_underflow(&reason));
                }
                Some(_) => {}
            }
            state
                .marker_index(id)
                .ok_or_else(|| MemoryError::stack_underflow("frame marker already popped"))
        })?;

        let frame = frames
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::invalid_state("frame vanished while popping"))?;
        self.logger.log(
            &MemoryEvent::new("frame_pop", self.tag.name(), LogLevel::Debug, &*frame.name)
                .with_data("allocations", frame.allocation_count)
                .with_data("bytes", frame.total_size),
        );
        Ok(frame)
    }

    /// Innermost open frame
    pub fn current_frame(&self) -> Option<StackFrame> {
        self.state.lock().frames.last().cloned()
    }

    /// Open frames, outermost first
    pub fn frames(&self) -> Vec<StackFrame> {
        self.state.lock().frames.clone()
    }

    /// Human readable list of open frames
    pub fn dump_frames(&self) -> String {
        let frames = self.frames();
        let mut out = String::new();
        let _ = writeln!(out, "[{}] {} open frame(s)", self.tag, frames.len());
        for (depth, frame) in frames.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {:indent$}{} ({}) at {} pos={} allocations={} bytes={}",
                "",
                frame.name,
                frame.marker,
                frame.location,
                frame.position,
                frame.allocation_count,
                frame.total_size,
                indent = depth * 2,
            );
        }
        out
    }

    fn push_marker_locked(&self, state: &mut StackState) -> MemoryResult<MarkerId> {
        if state.markers.len() >= self.config.max_stack_depth {
            state.overflow_count += 1;
            let error = MemoryError::stack_overflow(
                state.markers.len() + 1,
                self.config.max_stack_depth,
            );
            report_failure(self.logger.as_ref(), self.tag.name(), &error);
            return Err(error);
        }

        let mut id = MarkerId(state.next_marker);
        while state.marker_index(id).is_some() {
            id = MarkerId(id.0.wrapping_add(1).max(1));
        }
        state.next_marker = id.0.wrapping_add(1).max(1);
        state.markers.push(MarkerRecord {
            id,
            offset: state.offset,
            allocation_count: state.registry.len(),
        });
        state.peak_depth = state.peak_depth.max(state.markers.len());
        Ok(id)
    }

    /// Pops the marker at the index chosen by `select` and everything above
    ///
    /// Returns the frames that were closed, innermost first.
    fn pop_locked<F>(&self, select: F) -> MemoryResult<Vec<StackFrame>>
    where
        F: FnOnce(&StackState) -> MemoryResult<usize>,
    {
        let (released, frames, marker) = {
            let mut state = self.state.lock();
            let index = match select(&state) {
                Ok(index) => index,
                Err(error) => {
                    state.underflow_count += 1;
                    drop(state);
                    report_failure(self.logger.as_ref(), self.tag.name(), &error);
                    return Err(error);
                }
            };

            let marker = state.markers[index];
            state.markers.truncate(index);
            let first_closed = state
                .frames
                .iter()
                .position(|frame| state.marker_index(frame.marker).is_none())
                .unwrap_or(state.frames.len());
            let mut frames = state.frames.split_off(first_closed);
            frames.reverse();

            let boundary = state.base() + marker.offset;
            let released = state.registry.release_from(boundary);
            let used = state.offset;
            self.clear_range(&state, marker.offset, used);
            state.offset = marker.offset;

            let bytes = released.iter().map(|block| block.size).sum();
            state.stats.record_release(released.len(), bytes);
            debug_assert_eq!(state.registry.len(), marker.allocation_count);
            (released, frames, marker)
        };

        self.logger.log(
            &MemoryEvent::new("pop_marker", self.tag.name(), LogLevel::Trace, "marker popped")
                .with_data("marker", marker.id)
                .with_data("released", released.len()),
        );
        self.hooks.notify_release(&self.tag, &released);
        Ok(frames)
    }

    /// Replaces the buffer with one large enough for the request
    ///
    /// Only called while no allocation is live, so every marker and frame
    /// sits at offset zero and stays valid.
    fn grow(&self, state: &mut StackState, size: usize, alignment: usize) -> MemoryResult<()> {
        let required = checked_align_up(HEADER_SIZE, alignment)
            .and_then(|prefix| prefix.checked_add(size))
            .ok_or_else(|| MemoryError::size_overflow("stack growth"))?;
        let mut new_capacity = state
            .buffer
            .len()
            .saturating_add(self.config.growth_increment)
            .max(required);

        if self.config.max_capacity != 0 {
            if required > self.config.max_capacity {
                return Err(MemoryError::stack_overflow(size, state.remaining()));
            }
            new_capacity = new_capacity.min(self.config.max_capacity);
            if new_capacity <= state.buffer.len() {
                return Err(MemoryError::stack_overflow(size, state.remaining()));
            }
        }

        let buffer = AlignedBuffer::new(new_capacity, alignment.max(CACHE_LINE_SIZE))?;
        let old_capacity = state.buffer.len();
        state.buffer = buffer;
        state.offset = 0;
        state.stats.record_growth();

        self.logger.log(
            &MemoryEvent::new("grow", self.tag.name(), LogLevel::Info, "stack buffer replaced")
                .with_data("old_capacity", old_capacity)
                .with_data("new_capacity", new_capacity),
        );
        Ok(())
    }

    fn clear_range(&self, state: &StackState, from: usize, to: usize) {
        if to <= from {
            return;
        }
        let byte = if self.config.zero_on_pop {
            Some(0)
        } else {
            self.config.dealloc_pattern
        };
        if let Some(byte) = byte {
            // SAFETY: Clearing a released range inside the buffer.
            // - from < to <= offset <= buffer.len()
            // - No block remains registered inside the range
            unsafe { state.buffer.fill(from, to - from, byte) }
        }
    }

    fn try_allocate(
        &self,
        state: &mut StackState,
        size: usize,
        alignment: usize,
        flags: AllocationFlags,
        location: SourceLocation,
    ) -> MemoryResult<MemoryBlock> {
        let placement = match state.place(size, alignment) {
            Some(placement) => Some(placement),
            None if self.config.allow_growth && state.registry.is_empty() => {
                self.grow(state, size, alignment)
                    .ok()
                    .and_then(|()| state.place(size, alignment))
            }
            None => None,
        };
        let Some((payload, end)) = placement else {
            state.overflow_count += 1;
            return Err(MemoryError::stack_overflow(size, state.remaining()));
        };
        let base = state.base();

        let block = MemoryBlock::new(payload, size, alignment, flags, location);
        let header = StackAllocationHeader {
            size,
            alignment,
            previous_position: state.offset,
            allocation_id: block.allocation_id,
            flags: flags.bits(),
            canary: HEADER_CANARY,
        };
        // SAFETY: Header range [payload - HEADER_SIZE, payload) lies between
        // the old cursor and the payload, inside the buffer, unused.
        unsafe {
            state
                .buffer
                .at(payload - base - HEADER_SIZE)
                .cast::<StackAllocationHeader>()
                .write_unaligned(header);
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
        if let Some(frame) = state.frames.last_mut() {
            frame.record(payload, size);
        }
        Ok(block)
    }

    fn try_deallocate(&self, state: &mut StackState, address: usize) -> MemoryResult<MemoryBlock> {
        let Some(block) = state.registry.get(address).cloned() else {
            return Err(MemoryError::invalid_pointer(address, self.tag.name()));
        };
        if state.registry.last().map(|b| b.address) != Some(address) {
            return Err(MemoryError::deallocation_failed(
                address,
                "only the most recent allocation can be freed",
            ));
        }
        if let Some(top) = state.markers.last() {
            if address < state.base() + top.offset {
                return Err(MemoryError::deallocation_failed(
                    address,
                    "allocation belongs below the top marker",
                ));
            }
        }

        let header = state.read_header(address);
        let payload_offset = address - state.base();
        if self.config.validate_on_deallocate {
            if let Err(error) = self.check_block(state, &block, None) {
                state.stats.record_corruption();
                return Err(error);
            }
        } else if header.previous_position > payload_offset - HEADER_SIZE {
            state.stats.record_corruption();
            return Err(MemoryError::corruption(
                self.tag.name(),
                &format!("previous position out of range at block {address:#x}"),
            ));
        }

        let used = state.offset;
        self.clear_range(state, header.previous_position, used);
        state.offset = header.previous_position;
        state.registry.remove(address);
        state.stats.record_deallocation(block.size);
        if let Some(frame) = state.frames.last_mut() {
            frame.forget(address, block.size);
        }
        Ok(block)
    }

    /// Checks one block's header against the registry and its neighbour
    fn check_block(
        &self,
        state: &StackState,
        block: &MemoryBlock,
        expected_previous: Option<usize>,
    ) -> MemoryResult<StackAllocationHeader> {
        let header = state.read_header(block.address);
        let payload_offset = block.address - state.base();
        if header.canary != HEADER_CANARY {
            return Err(MemoryError::corruption(
                self.tag.name(),
                &format!(
                    "header canary {:#x} at block {:#x}",
                    header.canary, block.address
                ),
            ));
        }
        if header.size != block.size
            || header.allocation_id != block.allocation_id
            || header.previous_position > payload_offset - HEADER_SIZE
        {
            return Err(MemoryError::corruption(
                self.tag.name(),
                &format!("header fields overwritten at block {:#x}", block.address),
            ));
        }
        if let Some(expected) = expected_previous {
            if header.previous_position != expected {
                return Err(MemoryError::corruption(
                    self.tag.name(),
                    &format!(
                        "block {:#x} links to position {} instead of {}",
                        block.address, header.previous_position, expected
                    ),
                ));
            }
        }
        Ok(header)
    }

    fn fail_corruption(&self, error: MemoryError) -> MemoryError {
        report_corruption(
            self.logger.as_ref(),
            self.tag.name(),
            self.config.on_corruption,
            &error,
        );
        error
    }
}

// SAFETY: StackAllocator upholds the Allocator contract.
// - Payload ranges come from a cursor that only moves below a live block
//   when that block is released
// - Payloads are aligned by checked_align_up on absolute addresses
// - The buffer is never replaced
unsafe impl Allocator for StackAllocator {
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
        let address = ptr as usize;

        let result = {
            let mut state = self.state.lock();
            self.try_deallocate(&mut state, address)
        };

        match result {
            Ok(block) => {
                self.hooks.notify_deallocate(&self.tag, &block);
                Ok(())
            }
            Err(error @ MemoryError::Corruption { .. }) => Err(self.fail_corruption(error)),
            Err(error) => {
                report_failure(self.logger.as_ref(), self.tag.name(), &error);
                Err(error)
            }
        }
    }

    /// Resizes the newest allocation in place when it fits
    ///
    /// Any other allocation is copied to the top of the stack; the old
    /// block stays reserved until its marker is popped or the stack resets.
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

        let resized = {
            let mut state = self.state.lock();
            let is_top = state.registry.last().map(|b| b.address) == Some(old.address)
                && state
                    .markers
                    .last()
                    .is_none_or(|top| old.address >= state.base() + top.offset);
            let fits = old.address + new_size <= state.buffer.end_addr();
            if is_top && fits && old.address % alignment == 0 {
                let base = state.base();
                if new_size > old.size && old.flags.contains(AllocationFlags::ZERO_MEMORY) {
                    // SAFETY: Growing top range is inside the buffer and unused.
                    unsafe { state.buffer.fill(old.end() - base, new_size - old.size, 0) }
                }
                let header = state.header_ptr(old.address);
                // SAFETY: Updating the size field of the top block's header.
                unsafe {
                    let mut value = header.read_unaligned();
                    value.size = new_size;
                    header.write_unaligned(value);
                }
                if let Some(block) = state.registry.get_mut(old.address) {
                    block.size = new_size;
                }
                let mut new = old.clone();
                new.size = new_size;
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
            state.markers.clear();
            state.frames.clear();

            let bytes = released.iter().map(|block| block.size).sum();
            state.stats.record_release(released.len(), bytes);
            state.stats.record_reset();
            released
        };

        self.logger.log(
            &MemoryEvent::new("reset", self.tag.name(), LogLevel::Info, "stack reset")
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
        drop(state);

        self.logger.log(
            &MemoryEvent::new("shrink", self.tag.name(), LogLevel::Info, "stack buffer trimmed")
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
            let mut findings = Vec::new();
            let mut expected_previous = 0;
            for block in state.registry.iter() {
                match self.check_block(&state, block, Some(expected_previous)) {
                    Ok(_) => expected_previous = block.end() - state.base(),
                    Err(error) => {
                        findings.push(error);
                        expected_previous = block.end() - state.base();
                    }
                }
            }
            if state
                .markers
                .windows(2)
                .any(|pair| pair[0].offset > pair[1].offset)
            {
                findings.push(MemoryError::corruption(
                    self.tag.name(),
                    "marker offsets are not monotonic",
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
        self.check_block(&state, block, None).map(|_| ())
    }
}

impl core::fmt::Debug for StackAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StackAllocator")
            .field("tag", &self.tag)
            .field("capacity", &state.buffer.len())
            .field("offset", &state.offset)
            .field("markers", &state.markers.len())
            .field("frames", &state.frames.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::logging::RecordingLogger;

    fn alloc(stack: &StackAllocator, size: usize) -> *mut u8 {
        stack
            .allocate(size, 16, AllocationFlags::empty())
            .unwrap()
            .as_ptr()
    }

    #[test]
    fn test_lifo_deallocation() {
        let stack = StackAllocator::new(1024).unwrap();
        let a = alloc(&stack, 32);
        let b = alloc(&stack, 32);

        let err = stack.deallocate(a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeallocationFailed);

        stack.deallocate(b).unwrap();
        stack.deallocate(a).unwrap();
        assert_eq!(stack.used(), 0);
        assert_eq!(stack.allocation_count(), 0);
    }

    #[test]
    fn test_overflow() {
        let stack = StackAllocator::new(256).unwrap();
        alloc(&stack, 128);
        let err = stack
            .allocate(256, 16, AllocationFlags::empty())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackOverflow);
        assert_eq!(stack.overflow_count(), 1);
        assert_eq!(stack.allocation_count(), 1);
    }

    #[test]
    fn test_pop_to_marker_restores_cursor() {
        let stack = StackAllocator::new(4096).unwrap();
        alloc(&stack, 40);
        let used = stack.used();
        let marker = stack.push_marker().unwrap();
        alloc(&stack, 100);
        let inner = stack.push_marker().unwrap();
        alloc(&stack, 100);

        stack.pop_to_marker(marker).unwrap();
        assert_eq!(stack.used(), used);
        assert_eq!(stack.allocation_count(), 1);
        assert_eq!(stack.marker_depth(), 0);

        let err = stack.pop_to_marker(inner).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackUnderflow);
        assert_eq!(stack.underflow_count(), 1);
        assert_eq!(stack.used(), used);
    }

    #[test]
    fn test_pop_without_markers_underflows() {
        let stack = StackAllocator::new(256).unwrap();
        assert_eq!(
            stack.pop_marker().unwrap_err().kind(),
            ErrorKind::StackUnderflow
        );
        assert_eq!(
            stack.pop_to_marker(MarkerId(7)).unwrap_err().kind(),
            ErrorKind::StackUnderflow
        );
    }

    #[test]
    fn test_max_stack_depth() {
        let config = StackConfig {
            max_stack_depth: 2,
            ..StackConfig::default()
        };
        let stack = StackAllocator::with_config(256, config).unwrap();
        stack.push_marker().unwrap();
        stack.push_marker().unwrap();
        assert_eq!(
            stack.push_marker().unwrap_err().kind(),
            ErrorKind::StackOverflow
        );
        assert_eq!(stack.peak_depth(), 2);
    }

    #[test]
    fn test_cannot_free_below_top_marker() {
        let stack = StackAllocator::new(1024).unwrap();
        let a = alloc(&stack, 16);
        stack.push_marker().unwrap();
        let err = stack.deallocate(a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeallocationFailed);
    }

    #[test]
    fn test_frames_nest_strictly() {
        let stack = StackAllocator::new(4096).unwrap();
        let outer = stack.push_frame("outer").unwrap();
        alloc(&stack, 64);
        let inner = stack.push_frame("inner").unwrap();
        alloc(&stack, 32);
        alloc(&stack, 32);

        assert_eq!(
            stack.pop_frame(outer).unwrap_err().kind(),
            ErrorKind::StackUnderflow
        );
        assert_eq!(stack.frames().len(), 2);

        let frame = stack.pop_frame(inner).unwrap();
        assert_eq!(frame.name, "inner");
        assert_eq!(frame.allocation_count, 2);
        assert_eq!(frame.total_size, 64);

        let frame = stack.pop_frame(outer).unwrap();
        assert_eq!(frame.allocation_count, 1);
        assert_eq!(stack.allocation_count(), 0);
        assert!(stack.current_frame().is_none());
    }

    #[test]
    fn test_frame_location_and_dump() {
        let stack = StackAllocator::new(1024).unwrap();
        let id = stack.push_frame("render").unwrap();
        let frame = stack.current_frame().unwrap();
        assert!(frame.location.file.ends_with("allocator.rs"));
        assert_eq!(frame.marker, id);
        assert!(stack.dump_frames().contains("render"));
    }

    #[test]
    fn test_scope_pops_on_drop() {
        let stack = StackAllocator::new(1024).unwrap();
        alloc(&stack, 16);
        {
            let scope = stack.scope().unwrap();
            alloc(scope.allocator(), 128);
            assert_eq!(stack.allocation_count(), 2);
        }
        assert_eq!(stack.allocation_count(), 1);
        assert_eq!(stack.marker_depth(), 0);
    }

    #[test]
    fn test_reset_replays_addresses() {
        let stack = StackAllocator::new(2048).unwrap();
        let first: Vec<_> = [24, 100, 7, 64].iter().map(|&s| alloc(&stack, s)).collect();
        stack.push_marker().unwrap();
        stack.reset();
        assert_eq!(stack.marker_depth(), 0);
        let second: Vec<_> = [24, 100, 7, 64].iter().map(|&s| alloc(&stack, s)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_top_reallocate_in_place() {
        let stack = StackAllocator::new(1024).unwrap();
        let a = alloc(&stack, 32);
        let grown = stack.reallocate(a, 32, 96, 16).unwrap();
        assert_eq!(grown.as_ptr(), a);
        stack.deallocate(a).unwrap();
        assert_eq!(stack.used(), 0);
    }

    #[test]
    fn test_growth_only_while_empty() {
        let config = StackConfig::default().with_growth(1024, 4096);
        let stack = StackAllocator::with_config(256, config).unwrap();

        let big = alloc(&stack, 1000);
        assert!(stack.capacity() >= 1000);
        assert_eq!(stack.statistics().growth_count, 1);

        let err = stack.allocate(3000, 16, AllocationFlags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackOverflow);
        assert_eq!(stack.statistics().growth_count, 1);

        stack.deallocate(big).unwrap();
        alloc(&stack, 3000);
        assert!((3000..=4096).contains(&stack.capacity()));

        let err = stack.allocate(8192, 16, AllocationFlags::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StackOverflow);
    }

    #[test]
    fn test_growth_keeps_empty_markers_valid() {
        let config = StackConfig::default().with_growth(4096, 0);
        let stack = StackAllocator::with_config(128, config).unwrap();
        let marker = stack.push_marker().unwrap();

        alloc(&stack, 512);
        stack.pop_to_marker(marker).unwrap();
        assert_eq!(stack.used(), 0);
        assert_eq!(stack.allocation_count(), 0);

        assert!(stack.trim() > 0);
        assert_eq!(stack.capacity(), 128);
    }

    #[test]
    fn test_frames_survive_marker_id_wraparound() {
        let stack = StackAllocator::new(1024).unwrap();
        stack.state.lock().next_marker = u32::MAX;

        let outer = stack.push_frame("outer").unwrap();
        let inner = stack.push_frame("inner").unwrap();
        assert_eq!(outer.get(), u32::MAX);
        assert_eq!(inner.get(), 1);

        let closed = stack.pop_frame(inner).unwrap();
        assert_eq!(closed.name, "inner");
        assert_eq!(stack.frames().len(), 1);
        assert_eq!(stack.current_frame().map(|frame| frame.marker), Some(outer));

        stack.pop_frame(outer).unwrap();
        assert!(stack.frames().is_empty());
    }

    #[test]
    fn test_wrapped_ids_skip_live_markers() {
        let stack = StackAllocator::new(1024).unwrap();
        let first = stack.push_marker().unwrap();
        stack.state.lock().next_marker = first.get();

        let second = stack.push_marker().unwrap();
        assert_ne!(first, second);
        stack.pop_to_marker(second).unwrap();
        assert_eq!(stack.top_marker(), Some(first));
    }

    #[test]
    fn test_corruption_detected_on_deallocate() {
        let logger = Arc::new(RecordingLogger::new());
        let stack = StackAllocator::new(1024)
            .unwrap()
            .with_logger(logger.clone());
        let a = alloc(&stack, 32);
        assert!(stack.validate());

        unsafe { a.sub(4).write_bytes(0xFF, 4) };
        assert!(!stack.validate());
        let err = stack.deallocate(a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptionDetected);
        assert_eq!(stack.allocation_count(), 1);
        assert!(logger.count("corruption") >= 2);
    }
}
