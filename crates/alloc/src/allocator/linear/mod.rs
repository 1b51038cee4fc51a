//! Linear (bump) allocator
//!
//! ## Modules
//! - `allocator` - Main `LinearAllocator` implementation
//! - `config` - Configuration variants (production, debug, performance)
//! - `scope` - Markers and the RAII scope guard

mod allocator;
mod config;
mod scope;

pub use allocator::LinearAllocator;
pub use config::LinearConfig;
pub use scope::{LinearMarker, LinearScope};
