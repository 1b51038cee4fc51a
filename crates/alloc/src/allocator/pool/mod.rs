//! Fixed-size block pool
//!
//! ## Modules
//! - `allocator` - Main `MemoryPool` implementation
//! - `chunk` - One growth unit of blocks with its free list
//! - `config` - Configuration variants (production, debug, performance)
//! - `header` - In-place block headers, magic values and block geometry
//! - `stats` - Block-level statistics

mod allocator;
mod chunk;
mod config;
mod header;
mod stats;

pub use allocator::MemoryPool;
pub use config::PoolConfig;
pub use header::{CANARY, MAGIC_FREE, MAGIC_IN_USE};
pub use stats::MemoryPoolStats;
