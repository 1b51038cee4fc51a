//! Slot storage and per-slot bookkeeping

use core::mem::MaybeUninit;

use crate::core::SyncUnsafeCell;
use crate::error::{MemoryError, MemoryResult};
use crate::registry::MemoryBlock;

/// What occupies a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SlotState {
    /// On the free list
    Free,
    /// Handed out through the raw [`Allocator`](crate::allocator::Allocator)
    /// interface; contents are uninitialised as far as the pool knows
    Raw,
    /// Holds a constructed object owned through a raw pointer
    Object,
    /// Holds a constructed object owned by a live `PooledObject`
    Handle,
}

impl SlotState {
    pub(super) fn is_in_use(self) -> bool {
        self != Self::Free
    }

    pub(super) fn holds_object(self) -> bool {
        matches!(self, Self::Object | Self::Handle)
    }
}

/// Bookkeeping for one slot
#[derive(Debug, Clone)]
pub(super) struct ObjectPoolEntry {
    pub(super) state: SlotState,
    /// Id of the object last constructed in this slot; zero before the
    /// first construction
    pub(super) object_id: u64,
    pub(super) block: Option<MemoryBlock>,
}

impl ObjectPoolEntry {
    pub(super) const fn free() -> Self {
        Self {
            state: SlotState::Free,
            object_id: 0,
            block: None,
        }
    }
}

/// One contiguous run of slots
///
/// A segment never moves once allocated, so pointers into it stay valid
/// while the segment is owned.
pub(super) struct Segment<T> {
    first_index: usize,
    slots: Box<[SyncUnsafeCell<MaybeUninit<T>>]>,
}

impl<T> Segment<T> {
    pub(super) fn new(first_index: usize, len: usize) -> MemoryResult<Self> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(len).map_err(|_| {
            MemoryError::out_of_memory(len.saturating_mul(core::mem::size_of::<T>()), 0)
        })?;
        slots.extend((0..len).map(|_| SyncUnsafeCell::new(MaybeUninit::uninit())));
        Ok(Self {
            first_index,
            slots: slots.into_boxed_slice(),
        })
    }

    pub(super) fn first_index(&self) -> usize {
        self.first_index
    }

    pub(super) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(super) fn bytes(&self) -> usize {
        self.slots.len() * core::mem::size_of::<T>()
    }

    pub(super) fn start_addr(&self) -> usize {
        self.slots.as_ptr() as usize
    }

    pub(super) fn contains_addr(&self, addr: usize) -> bool {
        addr >= self.start_addr() && addr < self.start_addr() + self.bytes()
    }

    /// Global slot index of `addr`, if it sits exactly on a slot boundary
    pub(super) fn index_of(&self, addr: usize) -> Option<usize> {
        if !self.contains_addr(addr) {
            return None;
        }
        let offset = addr - self.start_addr();
        let size = core::mem::size_of::<T>();
        (offset % size == 0).then(|| self.first_index + offset / size)
    }

    /// Pointer to the slot with global index `index`
    pub(super) fn slot_ptr(&self, index: usize) -> *mut T {
        self.slots[index - self.first_index].get().cast::<T>()
    }
}
