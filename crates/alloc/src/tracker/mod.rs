//! Allocation tracking
//!
//! An explicitly constructed [`MemoryTracker`] observes allocators and keeps
//! a ledger of live allocations for leak and corruption diagnostics.
//!
//! ## Modules
//! - `ledger` - The `MemoryTracker` itself and its lifecycle
//! - `record` - Per-allocation records with thread and call-stack data
//! - `capture` - Pluggable call-stack capture
//! - `stats` - Histogram, per-thread and per-location statistics, pattern analysis
//! - `report` - Leak, corruption and full reports in text, JSON, CSV, HTML and XML
//! - `config` - Configuration variants (production, debug, performance)

mod capture;
mod config;
mod ledger;
mod record;
mod report;
mod stats;

#[cfg(feature = "profiling")]
pub use capture::BacktraceCapturer;
pub use capture::{CallStackCapturer, format_call_stack};
pub use config::TrackerConfig;
pub use ledger::{MemoryTracker, TrackerPhase};
pub use record::{MemoryAllocationRecord, RECORD_CANARY, ThreadStamp, current_thread_id};
pub use report::{
    CorruptionFinding, CorruptionKind, LeakGroup, MemoryCorruptionReport, MemoryLeakReport,
    ReportFormat, TrackerReport,
};
pub use stats::{
    AllocationPattern, LocationStats, MemoryStatistics, OptimizationSuggestion, SizeHistogram,
    SuggestionKind, ThreadAllocationInfo,
};
