//! Typed object pool
//!
//! ## Modules
//! - `pool` - Main `ObjectPool` implementation
//! - `handle` - RAII `PooledObject` handle
//! - `storage` - Slot segments and per-slot bookkeeping
//! - `config` - Configuration variants (production, debug, performance)
//! - `stats` - Slot-level statistics

mod config;
mod handle;
mod pool;
mod stats;
mod storage;

pub use config::ObjectPoolConfig;
pub use handle::PooledObject;
pub use pool::ObjectPool;
pub use stats::ObjectPoolStats;
