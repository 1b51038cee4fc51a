//! # nebula-alloc
//!
//! Custom allocators and allocation tracking for the Nebula workflow
//! automation ecosystem.
//!
//! This crate provides:
//! - A pluggable, object-safe [`Allocator`](allocator::Allocator) contract
//! - Bump, LIFO and fixed-block strategies with in-place headers and canaries
//! - A typed object pool with RAII handles
//! - An allocation tracker for leak and corruption diagnostics
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use nebula_alloc::prelude::*;
//!
//! // Bump allocation, released all at once
//! let arena = LinearAllocator::new(4096)?;
//! let first = arena.allocate(100, 16, AllocationFlags::empty())?;
//! arena.reset();
//!
//! // Fixed-size blocks with double-free detection
//! let pool = Arc::new(MemoryPool::new(64, 32)?);
//! let tracker = Arc::new(MemoryTracker::new());
//! tracker.initialize()?;
//! tracker.attach(&pool);
//!
//! let block = pool.allocate(48, 8, AllocationFlags::empty())?;
//! pool.deallocate(block.as_ptr())?;
//! assert!(tracker.destroy()?.leaks.is_empty());
//!
//! // Recycled typed objects
//! let strings = ObjectPool::new(8, String::new)?;
//! let mut name = strings.get()?;
//! name.push_str("workflow");
//! # let _ = first;
//! # Ok::<(), MemoryError>(())
//! ```
//!
//! ## Features
//!
//! - `std` (default): Platform page size through `libc`
//! - `logging` (default): Default logger forwards events to `tracing`
//! - `profiling`: `backtrace`-backed call-stack capture for the tracker
//!
//! ## Architecture
//!
//! - Standalone error handling via [`error`] module
//! - Injectable event logging via [`logging`]
//! - Observer hooks connect allocators to an explicitly constructed
//!   [`MemoryTracker`](tracker::MemoryTracker)

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::all)]
#![warn(clippy::perf)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]
// Precision loss in usize/u64 -> f64 casts is acceptable for statistics
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::inline_always)]
// Struct bool fields are configuration switches
#![allow(clippy::struct_excessive_bools)]
// Cast truncation/sign-loss in memory code is reviewed per-site
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::double_must_use)]
#![allow(clippy::return_self_not_must_use)]
// Headers are read and written unaligned; the casts only name the type
#![allow(clippy::cast_ptr_alignment)]

// Error types
pub mod error;

// Core modules
pub mod allocator;
pub mod core;
pub mod logging;
pub mod object_pool;
pub mod registry;
pub mod tracker;

pub use crate::error::{MemoryError, MemoryResult, Result};

// Public API exports
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::core::{AllocationFlags, AllocatorTag, CorruptionPolicy, SourceLocation};

    // Error types
    pub use crate::error::{ErrorKind, MemoryError, MemoryResult, Result};

    // Allocator types
    pub use crate::allocator::{
        AllocError, AllocResult, AllocationObserver, Allocator, LinearAllocator, LinearConfig,
        MemoryPool, PoolConfig, StackAllocator, StackConfig,
    };
    pub use crate::registry::{AllocationInfo, AllocatorStats, MemoryBlock};

    pub use crate::object_pool::{ObjectPool, ObjectPoolConfig, PooledObject};

    pub use crate::tracker::{MemoryTracker, ReportFormat, TrackerConfig};

    pub use crate::logging::{MemoryLogger, SharedLogger};
}

// Re-export allocator types at crate root for convenience
pub use crate::allocator::{AllocError, AllocResult};

#[cfg(feature = "logging")]
use tracing::{debug, info};

/// Initialize nebula-alloc.
///
/// Allocators and trackers are explicit instances, so this only resolves
/// platform parameters and logs them.
///
/// # Examples
///
/// ```rust
/// fn main() -> nebula_alloc::MemoryResult<()> {
///     nebula_alloc::init()?;
///
///     // Your application code here
///
///     nebula_alloc::shutdown()
/// }
/// ```
pub fn init() -> MemoryResult<()> {
    #[cfg(feature = "logging")]
    {
        debug!("Initializing nebula-alloc");
    }

    let page_size = crate::core::page_size();
    if !crate::core::is_power_of_two(page_size) {
        return Err(MemoryError::invalid_config(
            "platform page size is not a power of two",
        ));
    }

    #[cfg(feature = "logging")]
    {
        info!(
            page_size,
            cache_line = crate::core::CACHE_LINE_SIZE,
            default_alignment = crate::core::DEFAULT_ALIGNMENT,
            "nebula-alloc initialized"
        );
    }

    Ok(())
}

/// Shutdown nebula-alloc.
///
/// Trackers report their own leaks on `destroy`; nothing global is held.
pub fn shutdown() -> MemoryResult<()> {
    #[cfg(feature = "logging")]
    {
        debug!("Shutting down nebula-alloc");
        info!("nebula-alloc shutdown complete");
    }

    Ok(())
}
