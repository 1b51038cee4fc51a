//! LIFO stack allocator
//!
//! ## Modules
//! - `allocator` - Main `StackAllocator` implementation with LIFO semantics
//! - `config` - Configuration variants (production, debug, performance)
//! - `frame` - Named frames and the RAII scope guard
//! - `marker` - Marker ids for scoped deallocation

mod allocator;
mod config;
mod frame;
mod marker;

pub use allocator::StackAllocator;
pub use config::StackConfig;
pub use frame::{StackFrame, StackScope};
pub use marker::MarkerId;
