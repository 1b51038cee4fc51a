//! Live-block registry and allocator statistics
//!
//! Every allocator keeps a [`BlockRegistry`] of the blocks it handed out
//! and an [`AllocatorStats`] of counters, both inside its state lock.

mod block;
mod stats;

pub use block::{BlockRegistry, MemoryBlock, next_allocation_id};
pub use stats::{AllocationInfo, AllocatorStats};
