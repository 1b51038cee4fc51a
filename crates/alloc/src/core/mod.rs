//! Core functionality for nebula-alloc
//!
//! This module contains the fundamental building blocks shared by every
//! allocator:
//! - Alignment arithmetic and platform constants
//! - Allocation flags
//! - Source locations, allocator tags and corruption policy
//! - Over-aligned byte arenas
//! - Slot cells shared under an external lock

pub mod alignment;
pub mod buffer;
pub mod flags;
pub(crate) mod sync_cell;
pub mod types;

pub use alignment::{
    CACHE_LINE_SIZE, DEFAULT_ALIGNMENT, MAX_ALIGNMENT, MIN_ALIGNMENT, PAGE_SIZE, align_down,
    align_up, is_aligned, is_power_of_two, page_size,
};
pub(crate) use sync_cell::SyncUnsafeCell;

pub use buffer::AlignedBuffer;
pub use flags::AllocationFlags;
pub use types::{AllocatorTag, CorruptionPolicy, SourceLocation, size};

/// Core prelude for convenient imports
pub mod prelude {
    pub use super::alignment::{DEFAULT_ALIGNMENT, align_up};
    pub use super::flags::AllocationFlags;
    pub use super::types::{CorruptionPolicy, SourceLocation};
    pub use crate::error::{MemoryError, MemoryResult};
}
