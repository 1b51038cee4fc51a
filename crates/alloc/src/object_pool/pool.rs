//! Typed object pool
//!
//! # Safety
//!
//! Objects live in fixed slot segments that never move:
//! - `ObjectPool` owns every segment; a slot is written only while it is
//!   off the free list and owned by exactly one caller
//! - Slot state (free, raw, object, handle) is only read or changed under
//!   the state mutex
//! - Released and reset objects are moved out of their slot under the lock
//!   and dropped after it is released, so `Drop` impls and hooks may call
//!   back into the pool
//!
//! ## Invariants
//!
//! - `free.len() + in_use == entries.len() == sum of segment lengths`
//! - A slot holds an initialised `T` iff its state is `Object` or `Handle`
//! - Slots owned by a live [`PooledObject`] are never released through a
//!   raw pointer and survive [`reset`](Allocator::reset)
//! - Only trailing, fully free segments are dropped

use core::fmt::Write as _;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use parking_lot::Mutex;

use super::handle::PooledObject;
use super::storage::{ObjectPoolEntry, Segment, SlotState};
use super::{ObjectPoolConfig, ObjectPoolStats};
use crate::allocator::traits::resize_source;
use crate::allocator::{Allocator, AllocatorHooks, report_corruption, report_failure, resolve_request};
use crate::core::{AllocationFlags, AllocatorTag, SourceLocation};
use crate::error::{MemoryError, MemoryResult};
use crate::logging::{LogLevel, MemoryEvent, SharedLogger, default_logger};
use crate::registry::{AllocationInfo, AllocatorStats, MemoryBlock};

type Constructor<T> = Box<dyn Fn() -> T + Send + Sync>;
type Destructor<T> = Box<dyn Fn(&mut T) + Send + Sync>;
type Validator<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// How a slot is being given back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Release {
    /// Through a raw pointer; handle-owned slots are refused
    Raw,
    /// From a dropped `PooledObject`
    Handle,
    /// From `PooledObject::into_inner`; the value is handed back
    Detach,
}

struct ObjectPoolState<T> {
    segments: Vec<Segment<T>>,
    entries: Vec<ObjectPoolEntry>,
    /// Free slot indices; the next acquisition pops from the end
    free: Vec<usize>,
    peak_in_use: usize,
    counters: ObjectPoolStats,
    stats: AllocatorStats,
}

impl<T> ObjectPoolState<T> {
    fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn in_use(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    fn locate(&self, addr: usize) -> Option<usize> {
        self.segments.iter().find_map(|segment| segment.index_of(addr))
    }

    fn slot_ptr(&self, index: usize) -> *mut T {
        let position = self
            .segments
            .partition_point(|segment| segment.first_index() + segment.len() <= index);
        self.segments[position].slot_ptr(index)
    }

    fn push_segment(&mut self, len: usize) -> MemoryResult<()> {
        let first = self.entries.len();
        self.segments.push(Segment::new(first, len)?);
        self.entries
            .extend((0..len).map(|_| ObjectPoolEntry::free()));
        // New slots go under the existing free ones and pop lowest first.
        self.free.splice(0..0, (first..first + len).rev());
        Ok(())
    }
}

/// Pool of pre-reserved, typed slots
///
/// Objects are constructed in place on acquisition and dropped on release.
/// Pointers stay valid until the object is released, the pool is reset or
/// the pool is dropped.
///
/// # Examples
///
/// ```
/// use nebula_alloc::object_pool::ObjectPool;
///
/// let pool = ObjectPool::new(16, || Vec::<u8>::with_capacity(256))?;
/// {
///     let mut buffer = pool.get()?;
///     buffer.extend_from_slice(b"payload");
///     assert_eq!(pool.in_use(), 1);
/// }
/// assert_eq!(pool.in_use(), 0);
/// # Ok::<(), nebula_alloc::error::MemoryError>(())
/// ```
pub struct ObjectPool<T: Send + 'static> {
    state: Mutex<ObjectPoolState<T>>,
    config: ObjectPoolConfig,
    tag: AllocatorTag,
    hooks: AllocatorHooks,
    logger: SharedLogger,
    constructor: Constructor<T>,
    destructor: Option<Destructor<T>>,
    validator: Option<Validator<T>>,
}

impl<T: Send + 'static> ObjectPool<T> {
    /// Creates a pool of `capacity` slots filled by `constructor`
    pub fn new<F>(capacity: usize, constructor: F) -> MemoryResult<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_config(ObjectPoolConfig::new(capacity), constructor)
    }

    /// Creates a pool with custom configuration
    ///
    /// Zero-sized types are rejected with `InvalidSize`.
    pub fn with_config<F>(config: ObjectPoolConfig, constructor: F) -> MemoryResult<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        if size_of::<T>() == 0 {
            return Err(MemoryError::invalid_size(0, "zero-sized types cannot be pooled"));
        }
        config.validate()?;

        let mut state = ObjectPoolState {
            segments: Vec::new(),
            entries: Vec::new(),
            free: Vec::new(),
            peak_in_use: 0,
            counters: ObjectPoolStats::default(),
            stats: AllocatorStats::new(),
        };
        state.push_segment(config.initial_capacity)?;
        let tag = AllocatorTag::new(&config.name);

        Ok(Self {
            state: Mutex::new(state),
            config,
            tag,
            hooks: AllocatorHooks::new(),
            logger: default_logger(),
            constructor: Box::new(constructor),
            destructor: None,
            validator: None,
        })
    }

    /// Replaces the logger
    #[must_use = "builder methods must be chained or built"]
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Runs `hook` on every released object before it is dropped
    #[must_use = "builder methods must be chained or built"]
    pub fn with_destructor<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.destructor = Some(Box::new(hook));
        self
    }

    /// Checks released objects when `validate_on_release` is set
    #[must_use = "builder methods must be chained or built"]
    pub fn with_validator<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(hook));
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &ObjectPoolConfig {
        &self.config
    }

    /// Constructs an object in a free slot, growing if allowed
    #[track_caller]
    pub fn acquire(&self) -> MemoryResult<NonNull<T>> {
        let location = SourceLocation::caller();
        let value = (self.constructor)();
        self.place(value, self.config.allow_growth, SlotState::Object, location)
    }

    /// Constructs an object only if a slot is already free
    #[track_caller]
    pub fn try_acquire(&self) -> Option<NonNull<T>> {
        let location = SourceLocation::caller();
        if self.state.lock().free.is_empty() {
            return None;
        }
        let value = (self.constructor)();
        self.place(value, false, SlotState::Object, location).ok()
    }

    /// Moves `value` into a free slot, growing if allowed
    #[track_caller]
    pub fn acquire_with(&self, value: T) -> MemoryResult<NonNull<T>> {
        let location = SourceLocation::caller();
        self.place(value, self.config.allow_growth, SlotState::Object, location)
    }

    /// Acquires an object behind a handle that releases it on drop
    #[track_caller]
    pub fn get(&self) -> MemoryResult<PooledObject<'_, T>> {
        let location = SourceLocation::caller();
        let value = (self.constructor)();
        let ptr = self.place(value, self.config.allow_growth, SlotState::Handle, location)?;
        // SAFETY: The slot was just initialised and marked handle-owned.
        Ok(unsafe { PooledObject::new(ptr, self) })
    }

    /// Drops the object behind `ptr` and frees its slot
    ///
    /// Fails with `InvalidPointer` outside slot storage or off a slot
    /// boundary, `DoubleFree` for a slot that is already free and
    /// `DeallocationFailed` for a slot owned by a [`PooledObject`].
    pub fn release(&self, ptr: *mut T) -> MemoryResult<()> {
        self.release_slot(ptr as usize, Release::Raw).map(drop)
    }

    /// Adds `additional` slots
    pub fn grow(&self, additional: usize) -> MemoryResult<()> {
        if additional == 0 {
            return Err(MemoryError::invalid_size(0, "cannot grow by zero slots"));
        }
        let mut state = self.state.lock();
        self.grow_locked(&mut state, additional)
    }

    /// Returns true if `ptr` is a slot boundary of this pool
    pub fn contains_object(&self, ptr: *const T) -> bool {
        self.object_index(ptr).is_some()
    }

    /// Slot index of `ptr`
    pub fn object_index(&self, ptr: *const T) -> Option<usize> {
        self.state.lock().locate(ptr as usize)
    }

    /// Slots across all segments
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }

    /// Slots handed out
    pub fn in_use(&self) -> usize {
        self.state.lock().in_use()
    }

    /// Slots on the free list
    pub fn available(&self) -> usize {
        self.state.lock().free.len()
    }

    /// `in_use / capacity`
    pub fn utilization_ratio(&self) -> f64 {
        self.pool_stats().utilization_ratio()
    }

    /// Slot-level statistics
    pub fn pool_stats(&self) -> ObjectPoolStats {
        let state = self.state.lock();
        ObjectPoolStats {
            object_size: size_of::<T>(),
            capacity: state.capacity(),
            in_use: state.in_use(),
            available: state.free.len(),
            peak_in_use: state.peak_in_use,
            segments: state.segments.len(),
            ..state.counters
        }
    }

    /// Human readable list of slots in use
    pub fn dump_objects(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        let _ = writeln!(out, "[{}] {} object(s) in use", self.tag, state.in_use());
        for (index, entry) in state.entries.iter().enumerate() {
            if let Some(block) = &entry.block {
                let _ = writeln!(
                    out,
                    "  slot {index} ({:?}, object #{}): {block}",
                    entry.state, entry.object_id
                );
            }
        }
        out
    }

    fn grow_locked(&self, state: &mut ObjectPoolState<T>, additional: usize) -> MemoryResult<()> {
        let capacity = state.capacity();
        if self.config.max_capacity != 0 && capacity + additional > self.config.max_capacity {
            return Err(MemoryError::out_of_memory(
                additional * size_of::<T>(),
                (self.config.max_capacity - capacity) * size_of::<T>(),
            ));
        }
        state.push_segment(additional)?;
        state.counters.growth_count += 1;
        state.stats.record_growth();

        self.logger.log(
            &MemoryEvent::new("grow", self.tag.name(), LogLevel::Info, "slots added")
                .with_data("slots", additional)
                .with_data("capacity", state.capacity()),
        );
        Ok(())
    }

    fn take_slot(&self, state: &mut ObjectPoolState<T>, grow: bool) -> MemoryResult<usize> {
        if let Some(index) = state.free.pop() {
            return Ok(index);
        }
        let remaining = if self.config.max_capacity == 0 {
            usize::MAX
        } else {
            self.config.max_capacity.saturating_sub(state.capacity())
        };
        if !grow || remaining == 0 {
            return Err(MemoryError::out_of_memory(size_of::<T>(), 0));
        }
        self.grow_locked(state, self.config.growth_increment.min(remaining))?;
        state
            .free
            .pop()
            .ok_or_else(|| MemoryError::out_of_memory(size_of::<T>(), 0))
    }

    fn occupy(
        &self,
        state: &mut ObjectPoolState<T>,
        index: usize,
        kind: SlotState,
        block: MemoryBlock,
    ) {
        let entry = &mut state.entries[index];
        entry.state = kind;
        if kind.holds_object() {
            entry.object_id = block.allocation_id;
            state.counters.constructed += 1;
        }
        state.entries[index].block = Some(block);
        state.counters.acquisitions += 1;
        state.peak_in_use = state.peak_in_use.max(state.in_use());
    }

    fn place(
        &self,
        value: T,
        grow: bool,
        kind: SlotState,
        location: SourceLocation,
    ) -> MemoryResult<NonNull<T>> {
        let mut state = self.state.lock();
        let index = match self.take_slot(&mut state, grow) {
            Ok(index) => index,
            Err(error) => {
                state.stats.record_failure();
                drop(state);
                drop(value);
                report_failure(self.logger.as_ref(), self.tag.name(), &error);
                return Err(error);
            }
        };

        let ptr = state.slot_ptr(index);
        // SAFETY: Initialising a slot that was just taken off the free list.
        // - ptr points into an owned segment and is aligned for T
        // - No other owner exists for a slot off the free list
        unsafe { ptr.write(value) };

        let block = MemoryBlock::new(
            ptr as usize,
            size_of::<T>(),
            align_of::<T>(),
            AllocationFlags::empty(),
            location,
        );
        self.occupy(&mut state, index, kind, block.clone());
        state.stats.record_allocation(size_of::<T>());
        drop(state);

        self.hooks.notify_allocate(&self.tag, &block);
        // SAFETY: Slot pointers come from a non-null boxed slice.
        Ok(unsafe { NonNull::new_unchecked(ptr) })
    }

    pub(super) fn release_slot(&self, addr: usize, mode: Release) -> MemoryResult<Option<T>> {
        let outcome = {
            let mut state = self.state.lock();
            self.vacate(&mut state, addr, mode)
        };

        let (value, block) = match outcome {
            Ok(released) => released,
            Err(error @ MemoryError::DoubleFree { .. }) => {
                report_corruption(
                    self.logger.as_ref(),
                    self.tag.name(),
                    self.config.on_corruption,
                    &error,
                );
                return Err(error);
            }
            Err(error) => {
                report_failure(self.logger.as_ref(), self.tag.name(), &error);
                return Err(error);
            }
        };

        let value = match value {
            Some(value) if mode == Release::Detach => Some(value),
            Some(mut value) => {
                self.finish(&mut value);
                drop(value);
                None
            }
            None => None,
        };
        if let Some(block) = &block {
            self.hooks.notify_deallocate(&self.tag, block);
        }
        Ok(value)
    }

    /// Takes a slot out of use under the lock, moving its object out
    fn vacate(
        &self,
        state: &mut ObjectPoolState<T>,
        addr: usize,
        mode: Release,
    ) -> MemoryResult<(Option<T>, Option<MemoryBlock>)> {
        let Some(index) = state.locate(addr) else {
            state.counters.invalid_release_count += 1;
            state.stats.record_failure();
            return Err(MemoryError::invalid_pointer(addr, self.tag.name()));
        };

        match state.entries[index].state {
            SlotState::Free => {
                state.counters.double_release_count += 1;
                state.stats.record_corruption();
                return Err(MemoryError::double_free(addr));
            }
            SlotState::Handle if mode == Release::Raw => {
                return Err(MemoryError::deallocation_failed(
                    addr,
                    "slot is owned by a PooledObject handle",
                ));
            }
            _ => {}
        }

        let kind = state.entries[index].state;
        let value = kind.holds_object().then(|| {
            // SAFETY: Moving the object out of its slot.
            // - Object and Handle slots hold an initialised T
            // - The slot is marked free below, so the value is read once
            unsafe { state.slot_ptr(index).read() }
        });

        let entry = &mut state.entries[index];
        entry.state = SlotState::Free;
        let block = entry.block.take();
        state.free.push(index);

        state.counters.releases += 1;
        if value.is_some() && mode != Release::Detach {
            state.counters.destructed += 1;
        }
        let size = block.as_ref().map_or(size_of::<T>(), |block| block.size);
        state.stats.record_deallocation(size);
        Ok((value, block))
    }

    /// Validator and destructor hooks for an object leaving the pool
    fn finish(&self, value: &mut T) {
        if self.config.validate_on_release
            && let Some(validator) = &self.validator
            && !validator(value)
        {
            self.state.lock().counters.validation_failures += 1;
            self.logger.warn(
                "validation_failed",
                self.tag.name(),
                "released object failed validation",
            );
        }
        if self.config.destruct_on_release
            && let Some(destructor) = &self.destructor
        {
            destructor(value);
        }
    }

    /// Drops trailing fully free segments beyond the first; returns bytes
    fn trim_segments(&self) -> usize {
        let (segments, bytes) = {
            let mut state = self.state.lock();
            let mut segments = 0;
            let mut bytes = 0;
            while state.segments.len() > 1 {
                let Some(last) = state.segments.last() else {
                    break;
                };
                let first = last.first_index();
                if state.entries[first..].iter().any(|entry| entry.state.is_in_use()) {
                    break;
                }
                bytes += last.bytes();
                segments += 1;
                state.segments.pop();
                state.entries.truncate(first);
                state.free.retain(|&index| index < first);
            }
            (segments, bytes)
        };

        if segments > 0 {
            self.logger.log(
                &MemoryEvent::new("shrink", self.tag.name(), LogLevel::Info, "segments removed")
                    .with_data("segments", segments)
                    .with_data("bytes", bytes),
            );
        }
        bytes
    }
}

// SAFETY: ObjectPool upholds the Allocator contract.
// - Raw allocations are whole slots taken off the free list
// - Slots are aligned for T and raw requests above align_of::<T>() fail
// - Segments are only dropped while every slot in them is free
unsafe impl<T: Send + 'static> Allocator for ObjectPool<T> {
    fn tag(&self) -> &AllocatorTag {
        &self.tag
    }

    fn hooks(&self) -> &AllocatorHooks {
        &self.hooks
    }

    /// Hands out one slot as uninitialised storage
    ///
    /// Values written through the returned pointer are not dropped by the
    /// pool.
    fn allocate_at(
        &self,
        size: usize,
        alignment: usize,
        flags: AllocationFlags,
        location: SourceLocation,
    ) -> MemoryResult<NonNull<u8>> {
        let result = {
            let mut state = self.state.lock();
            let result = resolve_request(size, alignment, flags)
                .and_then(|alignment| {
                    if size > size_of::<T>() {
                        return Err(MemoryError::invalid_size(size, "request exceeds slot size"));
                    }
                    if alignment > align_of::<T>() {
                        return Err(MemoryError::invalid_alignment(alignment));
                    }
                    Ok(alignment)
                })
                .and_then(|alignment| {
                    let index = self.take_slot(&mut state, self.config.allow_growth)?;
                    let ptr = state.slot_ptr(index).cast::<u8>();
                    if flags.contains(AllocationFlags::ZERO_MEMORY) {
                        // SAFETY: Zeroing a whole slot this caller now owns.
                        unsafe { core::ptr::write_bytes(ptr, 0, size_of::<T>()) };
                    }
                    let block = MemoryBlock::new(ptr as usize, size, alignment, flags, location);
                    self.occupy(&mut state, index, SlotState::Raw, block.clone());
                    state.stats.record_allocation(size);
                    Ok(block)
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
                    .ok_or_else(|| MemoryError::allocation_failed(size, alignment, "null slot"))
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
        self.release_slot(ptr as usize, Release::Raw).map(drop)
    }

    /// Resizes within the slot; requests beyond the slot size fail
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
        if new_size > size_of::<T>() {
            return Err(MemoryError::invalid_size(new_size, "request exceeds slot size"));
        }
        if alignment > align_of::<T>() {
            return Err(MemoryError::invalid_alignment(alignment));
        }

        let new = {
            let mut state = self.state.lock();
            let index = state
                .locate(old.address)
                .ok_or_else(|| MemoryError::invalid_pointer(old.address, self.tag.name()))?;
            let block = state.entries[index]
                .block
                .as_mut()
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

    /// Drops every object owned through a raw pointer and frees its slot
    ///
    /// Slots owned by a live [`PooledObject`] are left in place.
    fn reset(&self) {
        let (values, released, kept) = {
            let mut state = self.state.lock();
            let mut values = Vec::new();
            let mut released = Vec::new();
            let mut kept = 0;
            for index in 0..state.entries.len() {
                match state.entries[index].state {
                    SlotState::Free => continue,
                    SlotState::Handle => {
                        kept += 1;
                        continue;
                    }
                    SlotState::Object => {
                        // SAFETY: Object slots hold an initialised T that
                        // is moved out exactly once here.
                        values.push(unsafe { state.slot_ptr(index).read() });
                    }
                    SlotState::Raw => {}
                }
                let entry = &mut state.entries[index];
                entry.state = SlotState::Free;
                released.extend(entry.block.take());
            }

            let free: Vec<usize> = (0..state.entries.len())
                .rev()
                .filter(|&index| state.entries[index].state == SlotState::Free)
                .collect();
            state.free = free;
            state.counters.destructed += values.len() as u64;
            let bytes = released.iter().map(|block| block.size).sum();
            state.stats.record_release(released.len(), bytes);
            state.stats.record_reset();
            (values, released, kept)
        };

        for mut value in values {
            if self.config.destruct_on_release
                && let Some(destructor) = &self.destructor
            {
                destructor(&mut value);
            }
        }

        self.logger.log(
            &MemoryEvent::new("reset", self.tag.name(), LogLevel::Info, "object pool reset")
                .with_data("released", released.len())
                .with_data("kept", kept),
        );
        self.hooks.notify_release(&self.tag, &released);
    }

    fn trim(&self) -> usize {
        self.trim_segments()
    }

    /// Reorders the free list lowest slot first, then trims
    fn compact(&self) -> usize {
        self.state
            .lock()
            .free
            .sort_unstable_by(|a, b| b.cmp(a));
        self.trim_segments()
    }

    fn allocation_info(&self) -> AllocationInfo {
        let state = self.state.lock();
        let slot = size_of::<T>();
        let slack = state
            .entries
            .iter()
            .filter_map(|entry| entry.block.as_ref())
            .map(|block| slot - block.size)
            .sum();
        AllocationInfo {
            total_memory: state.capacity() * slot,
            used_memory: state.in_use() * slot,
            free_memory: state.free.len() * slot,
            peak_memory: state.peak_in_use * slot,
            allocation_count: state.in_use(),
            fragmentation_loss: slack,
        }
    }

    fn statistics(&self) -> AllocatorStats {
        self.state.lock().stats
    }

    fn allocations(&self) -> Vec<MemoryBlock> {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .filter_map(|entry| entry.block.clone())
            .collect()
    }

    fn contains(&self, ptr: *const u8) -> bool {
        let state = self.state.lock();
        state
            .segments
            .iter()
            .any(|segment| segment.contains_addr(ptr as usize))
    }

    fn block_info(&self, ptr: *const u8) -> Option<MemoryBlock> {
        let state = self.state.lock();
        let index = state.locate(ptr as usize)?;
        state.entries[index].block.clone()
    }

    /// Cross-checks slot states against the free list
    fn validate(&self) -> bool {
        let findings = {
            let state = self.state.lock();
            let mut findings = Vec::new();
            let mut seen = vec![false; state.entries.len()];
            for &index in &state.free {
                if index >= seen.len() || seen[index] {
                    findings.push(format!("free list repeats slot {index}"));
                    continue;
                }
                seen[index] = true;
                if state.entries[index].state != SlotState::Free {
                    findings.push(format!("slot {index} is both free and in use"));
                }
            }
            for (index, entry) in state.entries.iter().enumerate() {
                if entry.state.is_in_use() != entry.block.is_some() {
                    findings.push(format!("slot {index} has an inconsistent record"));
                }
                if entry.state == SlotState::Free && !seen[index] {
                    findings.push(format!("free slot {index} is missing from the free list"));
                }
            }
            findings
        };

        for details in &findings {
            let error = MemoryError::corruption(self.tag.name(), details);
            report_corruption(
                self.logger.as_ref(),
                self.tag.name(),
                self.config.on_corruption,
                &error,
            );
        }
        findings.is_empty()
    }

    fn validate_pointer(&self, ptr: *const u8) -> MemoryResult<()> {
        let state = self.state.lock();
        let address = ptr as usize;
        match state.locate(address) {
            Some(index) if state.entries[index].state.is_in_use() => Ok(()),
            _ => Err(MemoryError::invalid_pointer(address, self.tag.name())),
        }
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

impl<T: Send + 'static> Drop for ObjectPool<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let mut leaked = 0;
        for index in 0..state.entries.len() {
            if state.entries[index].state.holds_object() {
                leaked += 1;
                // SAFETY: The slot holds an initialised T and the pool is
                // being dropped, so nothing can reach it afterwards.
                unsafe { core::ptr::drop_in_place(state.slot_ptr(index)) };
            }
        }
        if leaked > 0 {
            self.logger.log(
                &MemoryEvent::new(
                    "leak",
                    self.tag.name(),
                    LogLevel::Warn,
                    "objects still acquired when the pool was dropped",
                )
                .with_data("count", leaked),
            );
        }
    }
}

impl<T: Send + 'static> core::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ObjectPool")
            .field("tag", &self.tag)
            .field("object_size", &size_of::<T>())
            .field("capacity", &state.capacity())
            .field("in_use", &state.in_use())
            .finish_non_exhaustive()
    }
}
