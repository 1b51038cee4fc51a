//! Allocation tracker
//!
//! [`MemoryTracker`] keeps a ledger of live allocations keyed by address.
//! Allocators feed it through [`AllocationObserver`] once
//! [`attached`](MemoryTracker::attach), or callers report events directly
//! with the `track_*` methods.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --initialize--> Active --destroy--> Destroyed
//!                                 |  ^                  |
//!                                 reset                 initialize
//! ```
//!
//! Tracking, detection and reports require the `Active` phase and fail with
//! `InvalidState` otherwise. Observer notifications outside that phase are
//! ignored with a warning.
//!
//! ## Invariants
//!
//! - At most one record per address; a record leaves the ledger exactly
//!   when its free is seen
//! - The tracker never frees or touches tracked memory; allocators are held
//!   as `Weak` references and only asked to validate pointers
//! - Allocator validation and logging run outside the tracker lock
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use nebula_alloc::allocator::{Allocator, MemoryPool};
//! use nebula_alloc::core::AllocationFlags;
//! use nebula_alloc::tracker::MemoryTracker;
//!
//! let tracker = Arc::new(MemoryTracker::new());
//! tracker.initialize()?;
//!
//! let pool = Arc::new(MemoryPool::new(64, 16)?);
//! tracker.attach(&pool);
//!
//! let ptr = pool.allocate(32, 8, AllocationFlags::empty())?;
//! assert_eq!(tracker.detect_leaks()?.leak_count(), 1);
//!
//! pool.deallocate(ptr.as_ptr())?;
//! assert!(!tracker.detect_leaks()?.has_leaks());
//! # Ok::<(), nebula_alloc::error::MemoryError>(())
//! ```

use core::fmt::{self, Write as _};
use core::ops::RangeBounds;
use core::time::Duration;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Weak};

use chrono::Utc;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;

use super::capture::CallStackCapturer;
use super::config::TrackerConfig;
use super::record::{MemoryAllocationRecord, ThreadStamp};
use super::report::{
    CorruptionFinding, CorruptionKind, MemoryCorruptionReport, MemoryLeakReport, ReportFormat,
    TrackerReport,
};
use super::stats::{
    AllocationPattern, LocationStats, MemoryStatistics, OptimizationSuggestion, SizeHistogram,
    SuggestionKind, ThreadAllocationInfo,
};
use crate::allocator::{AllocationObserver, Allocator, report_corruption, report_failure};
use crate::core::{AllocatorTag, SourceLocation};
use crate::error::{ErrorKind, MemoryError, MemoryResult};
use crate::logging::{LogLevel, MemoryEvent, SharedLogger, default_logger};
use crate::registry::MemoryBlock;

/// Lifecycle phase of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrackerPhase {
    #[default]
    Uninitialized,
    Active,
    Destroyed,
}

impl fmt::Display for TrackerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Active => "active",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

struct AttachedAllocator {
    tag: AllocatorTag,
    allocator: Weak<dyn Allocator>,
}

enum Insertion {
    Added,
    /// The address was still registered; the stale record was retired
    Replaced(u64),
    Untracked,
}

enum Removal {
    Freed,
    /// Allocation seen while the record cap was reached
    Untracked,
    DoubleFree,
    Unknown,
}

/// Retired ids kept for frees that arrive after their address was reused
const SUPERSEDED_LIMIT: usize = 4096;

#[derive(Default)]
struct TrackerState {
    phase: TrackerPhase,
    records: HashMap<usize, MemoryAllocationRecord>,
    /// Live addresses that went unrecorded because of the cap
    untracked: HashSet<usize>,
    /// Ids retired because their address was handed out again before the
    /// free was reported
    superseded: VecDeque<u64>,
    freed: VecDeque<MemoryAllocationRecord>,
    statistics: MemoryStatistics,
    threads: HashMap<u64, ThreadAllocationInfo>,
    locations: HashMap<SourceLocation, LocationStats>,
    allocators: HashMap<u64, AttachedAllocator>,
}

impl TrackerState {
    fn ensure_active(&self, operation: &str) -> MemoryResult<()> {
        if self.phase == TrackerPhase::Active {
            Ok(())
        } else {
            Err(MemoryError::invalid_state(&format!(
                "{operation} requires an active tracker, current phase is {}",
                self.phase
            )))
        }
    }

    fn clear_tracking(&mut self) {
        self.records.clear();
        self.untracked.clear();
        self.superseded.clear();
        self.freed.clear();
        self.statistics = MemoryStatistics::default();
        self.threads.clear();
        self.locations.clear();
    }

    fn insert(&mut self, record: MemoryAllocationRecord, config: &TrackerConfig) -> Insertion {
        let address = record.address();
        if !self.records.contains_key(&address)
            && self.records.len() >= config.max_tracked_allocations
        {
            self.statistics.untracked_allocations += 1;
            self.untracked.insert(address);
            return Insertion::Untracked;
        }
        self.untracked.remove(&address);

        let size = record.size();
        self.statistics.record_allocation(size);
        if record.thread.id != 0 {
            self.threads
                .entry(record.thread.id)
                .or_insert_with(|| ThreadAllocationInfo::new(record.thread.id, record.thread.name.clone()))
                .record_allocation(size);
        }
        let location = self
            .locations
            .entry(record.block.location)
            .or_insert_with(|| LocationStats::new(record.location_key()));
        location.allocations += 1;
        location.total_bytes += size as u64;
        location.live_allocations += 1;
        location.live_bytes += size;

        match self.records.insert(address, record) {
            Some(stale) => {
                let id = stale.allocation_id();
                if self.superseded.len() >= SUPERSEDED_LIMIT {
                    self.superseded.pop_front();
                }
                self.superseded.push_back(id);
                self.retire(stale, config);
                Insertion::Replaced(id)
            }
            None => Insertion::Added,
        }
    }

    /// Removes the record at `address`
    ///
    /// With an `id`, only the record of that allocation is removed; a free
    /// reported after the address was already reused retires nothing.
    fn remove(&mut self, address: usize, id: Option<u64>, config: &TrackerConfig) -> Removal {
        let matches = self
            .records
            .get(&address)
            .is_some_and(|record| id.is_none_or(|id| record.allocation_id() == id));
        if matches && let Some(record) = self.records.remove(&address) {
            self.retire(record, config);
            return Removal::Freed;
        }
        if let Some(id) = id
            && self.take_superseded(id)
        {
            return Removal::Freed;
        }
        if self.untracked.remove(&address) {
            return Removal::Untracked;
        }
        if let Some(previous) = self.freed.iter_mut().rev().find(|record| {
            record.address() == address && id.is_none_or(|id| record.allocation_id() == id)
        }) {
            previous.is_double_freed = true;
            self.statistics.double_free_detections += 1;
            return Removal::DoubleFree;
        }
        self.statistics.invalid_free_detections += 1;
        Removal::Unknown
    }

    fn take_superseded(&mut self, id: u64) -> bool {
        match self.superseded.iter().position(|&stale| stale == id) {
            Some(index) => {
                self.superseded.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drops the record of `block` without counting unknown addresses
    fn release(&mut self, block: &MemoryBlock, config: &TrackerConfig) -> bool {
        let matches = self
            .records
            .get(&block.address)
            .is_some_and(|record| record.allocation_id() == block.allocation_id);
        if matches && let Some(record) = self.records.remove(&block.address) {
            self.retire(record, config);
            return true;
        }
        if !self.take_superseded(block.allocation_id) {
            self.untracked.remove(&block.address);
        }
        false
    }

    /// Folds a record that just left the ledger into the aggregates
    fn retire(&mut self, mut record: MemoryAllocationRecord, config: &TrackerConfig) {
        record.close();
        let size = record.size();
        self.statistics.record_deallocation(size);
        if let Some(thread) = self.threads.get_mut(&record.thread.id) {
            thread.record_deallocation(size);
        }
        if let Some(location) = self.locations.get_mut(&record.block.location) {
            location.live_allocations = location.live_allocations.saturating_sub(1);
            location.live_bytes = location.live_bytes.saturating_sub(size);
        }

        if config.freed_history == 0 {
            return;
        }
        if self.freed.len() >= config.freed_history {
            self.freed.pop_front();
        }
        self.freed.push_back(record);
    }

    /// Updates a live record whose block changed size in place
    fn resize(&mut self, new: &MemoryBlock) -> bool {
        let Some(record) = self.records.get_mut(&new.address) else {
            return false;
        };
        let old_size = record.size();
        let thread_id = record.thread.id;
        let location = record.block.location;
        record.block.size = new.size;
        record.block.alignment = new.alignment;

        let stats = &mut self.statistics;
        stats.current_bytes = stats.current_bytes.saturating_sub(old_size) + new.size;
        stats.peak_bytes = stats.peak_bytes.max(stats.current_bytes);
        stats.largest_allocation = stats.largest_allocation.max(new.size);
        if new.size > old_size {
            stats.total_bytes_allocated += (new.size - old_size) as u64;
        }
        if let Some(thread) = self.threads.get_mut(&thread_id) {
            thread.current_bytes = thread.current_bytes.saturating_sub(old_size) + new.size;
            thread.peak_bytes = thread.peak_bytes.max(thread.current_bytes);
        }
        if let Some(location) = self.locations.get_mut(&location) {
            location.live_bytes = location.live_bytes.saturating_sub(old_size) + new.size;
        }
        true
    }

    fn sorted_records(&self) -> Vec<MemoryAllocationRecord> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by_key(MemoryAllocationRecord::allocation_id);
        records
    }

    fn top_locations(&self, n: usize) -> Vec<LocationStats> {
        let mut locations: Vec<_> = self.locations.values().cloned().collect();
        locations.sort_by(|a, b| {
            b.allocations
                .cmp(&a.allocations)
                .then(b.total_bytes.cmp(&a.total_bytes))
                .then_with(|| a.location.cmp(&b.location))
        });
        locations.truncate(n);
        locations
    }

    fn top_leaking(&self, n: usize) -> Vec<LocationStats> {
        let mut locations: Vec<_> = self
            .locations
            .values()
            .filter(|location| location.live_allocations > 0)
            .cloned()
            .collect();
        locations.sort_by(|a, b| {
            b.live_bytes
                .cmp(&a.live_bytes)
                .then(b.live_allocations.cmp(&a.live_allocations))
                .then_with(|| a.location.cmp(&b.location))
        });
        locations.truncate(n);
        locations
    }

    fn threads(&self) -> Vec<ThreadAllocationInfo> {
        let mut threads: Vec<_> = self.threads.values().cloned().collect();
        threads.sort_by_key(|thread| thread.thread_id);
        threads
    }

    fn top_threads(&self, n: usize) -> Vec<ThreadAllocationInfo> {
        let mut threads: Vec<_> = self.threads.values().cloned().collect();
        threads.sort_by(|a, b| {
            b.total_bytes
                .cmp(&a.total_bytes)
                .then(a.thread_id.cmp(&b.thread_id))
        });
        threads.truncate(n);
        threads
    }

    fn pattern(&self, short_lived: Duration) -> AllocationPattern {
        let sizes: Vec<usize> = self
            .records
            .values()
            .chain(self.freed.iter())
            .map(MemoryAllocationRecord::size)
            .collect();
        let lifetimes: Vec<Duration> = self
            .freed
            .iter()
            .map(|record| record.lifetime().to_std().unwrap_or_default())
            .collect();
        AllocationPattern::from_samples(&sizes, &lifetimes, short_lived)
    }

    fn suggestions(&self, config: &TrackerConfig) -> Vec<OptimizationSuggestion> {
        let stats = &self.statistics;
        let mut suggestions = Vec::new();
        if stats.total_allocations == 0 {
            return suggestions;
        }
        let pattern = self.pattern(config.short_lived_threshold);
        let mut suggest = |kind, message: String| {
            suggestions.push(OptimizationSuggestion { kind, message });
        };

        let small = stats.histogram.small_ratio();
        if stats.total_allocations >= 16 && small > 0.5 {
            suggest(
                SuggestionKind::UsePool,
                format!(
                    "{:.0}% of allocations are 64 bytes or smaller; a MemoryPool with {}-byte blocks avoids per-allocation overhead",
                    small * 100.0,
                    pattern.mode_size.max(1)
                ),
            );
        }

        if !self.freed.is_empty() && pattern.short_lived_ratio > 0.5 {
            suggest(
                SuggestionKind::UseArena,
                format!(
                    "{:.0}% of freed allocations lived under {:?}; a LinearAllocator or StackAllocator scope releases them in bulk",
                    pattern.short_lived_ratio * 100.0,
                    config.short_lived_threshold
                ),
            );
        }

        if let Some(top) = self.top_locations(1).into_iter().next()
            && top.allocations >= 8
            && top.allocations * 2 > stats.total_allocations
        {
            suggest(
                SuggestionKind::UseObjectPool,
                format!(
                    "{} issues {} of {} allocations; an ObjectPool would recycle them",
                    top.location, top.allocations, stats.total_allocations
                ),
            );
        }

        if pattern.sample_count >= 2 && pattern.size_spread() > 1.0 {
            suggest(
                SuggestionKind::ReduceFragmentation,
                format!(
                    "allocation sizes vary widely (coefficient of variation {:.2}); size-segregated pools reduce fragmentation",
                    pattern.size_spread()
                ),
            );
        }

        if stats.leak_detections > 0 {
            let source = self
                .top_leaking(1)
                .into_iter()
                .next()
                .map_or_else(|| "<unknown>".to_string(), |location| location.location);
            suggest(
                SuggestionKind::FixLeaks,
                format!(
                    "{} leaked allocation(s) found by the last leak check, largest source {source}",
                    stats.leak_detections
                ),
            );
        }

        if stats.error_count() > 0 {
            suggest(
                SuggestionKind::FixMisuse,
                format!(
                    "{} double free(s), {} invalid free(s) and {} corruption(s) detected",
                    stats.double_free_detections,
                    stats.invalid_free_detections,
                    stats.corruption_detections
                ),
            );
        }

        suggestions
    }
}

/// Ledger of live allocations with leak and corruption detection
pub struct MemoryTracker {
    state: Mutex<TrackerState>,
    config: TrackerConfig,
    logger: SharedLogger,
    capturer: Option<Arc<dyn CallStackCapturer>>,
}

impl MemoryTracker {
    /// Tracker with the default configuration, not yet initialized
    pub fn new() -> Self {
        Self::build(TrackerConfig::default())
    }

    /// Tracker with a validated configuration, not yet initialized
    pub fn with_config(config: TrackerConfig) -> MemoryResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: TrackerConfig) -> Self {
        let capturer = default_capturer(&config);
        Self {
            state: Mutex::new(TrackerState::default()),
            config,
            logger: default_logger(),
            capturer,
        }
    }

    /// Replaces the logger
    #[must_use = "builder methods must be chained or built"]
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Installs the call-stack capturer used when `capture_call_stacks` is on
    #[must_use = "builder methods must be chained or built"]
    pub fn with_capturer(mut self, capturer: Arc<dyn CallStackCapturer>) -> Self {
        self.capturer = Some(capturer);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn phase(&self) -> TrackerPhase {
        self.state.lock().phase
    }

    /// Returns true while the tracker accepts events
    pub fn is_tracking(&self) -> bool {
        self.phase() == TrackerPhase::Active
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Starts tracking with an empty ledger
    ///
    /// A destroyed tracker can be initialized again.
    pub fn initialize(&self) -> MemoryResult<()> {
        {
            let mut state = self.state.lock();
            if state.phase == TrackerPhase::Active {
                return Err(MemoryError::invalid_state("tracker is already initialized"));
            }
            state.clear_tracking();
            state.phase = TrackerPhase::Active;
        }
        self.logger
            .info("initialize", &self.config.name, "tracking started");
        Ok(())
    }

    /// Forgets every record and counter, keeping attached allocators
    pub fn reset(&self) -> MemoryResult<()> {
        let dropped = {
            let mut state = self.state.lock();
            state.ensure_active("reset")?;
            let dropped = state.records.len();
            state.clear_tracking();
            dropped
        };
        self.logger.log(
            &MemoryEvent::new("reset", self.name(), LogLevel::Info, "tracker reset")
                .with_data("dropped_records", dropped),
        );
        Ok(())
    }

    /// Stops tracking, detaches from every allocator and reports what leaked
    pub fn destroy(&self) -> MemoryResult<MemoryLeakReport> {
        let (report, attached) = {
            let mut state = self.state.lock();
            state.ensure_active("destroy")?;
            let leaks: Vec<_> = state.records.values().cloned().collect();
            let attached: Vec<_> = state
                .allocators
                .drain()
                .map(|(_, attached)| attached.allocator)
                .collect();
            state.clear_tracking();
            state.phase = TrackerPhase::Destroyed;
            (MemoryLeakReport::new(self.name(), leaks), attached)
        };

        for allocator in attached.iter().filter_map(Weak::upgrade) {
            allocator.hooks().remove_observer(self);
        }
        if self.config.report_leaks_on_destroy {
            self.log_leaks(&report);
        }
        self.logger.log(
            &MemoryEvent::new("destroy", self.name(), LogLevel::Info, "tracking stopped")
                .with_data("leaks", report.leak_count()),
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    fn new_record(&self, block: &MemoryBlock, allocator: Option<&AllocatorTag>) -> MemoryAllocationRecord {
        let call_stack = match &self.capturer {
            Some(capturer) if self.config.capture_call_stacks => {
                let mut frames = capturer.capture(self.config.max_stack_depth);
                frames.truncate(self.config.max_stack_depth);
                frames
            }
            _ => Vec::new(),
        };
        let thread = if self.config.track_threads {
            ThreadStamp::current()
        } else {
            ThreadStamp::untracked()
        };
        MemoryAllocationRecord::new(block.clone(), allocator.cloned(), thread, call_stack)
    }

    fn log_insertion(&self, block: &MemoryBlock, insertion: &Insertion) {
        match insertion {
            Insertion::Added => {}
            Insertion::Replaced(stale) => self.logger.log(
                &MemoryEvent::new(
                    "stale_record",
                    self.name(),
                    LogLevel::Debug,
                    "address reused before its free was reported",
                )
                .with_data("address", format!("{:#x}", block.address))
                .with_data("stale_id", stale),
            ),
            Insertion::Untracked => self.logger.log(
                &MemoryEvent::new(
                    "untracked",
                    self.name(),
                    LogLevel::Debug,
                    "record limit reached, allocation not tracked",
                )
                .with_data("limit", self.config.max_tracked_allocations),
            ),
        }
    }

    fn report_removal(&self, address: usize, removal: Removal) -> MemoryResult<()> {
        match removal {
            Removal::Freed | Removal::Untracked => Ok(()),
            Removal::DoubleFree => {
                let error = MemoryError::double_free(address);
                report_corruption(
                    self.logger.as_ref(),
                    self.name(),
                    self.config.on_corruption,
                    &error,
                );
                Err(error)
            }
            Removal::Unknown => {
                let error = MemoryError::invalid_pointer(address, self.name());
                report_failure(self.logger.as_ref(), self.name(), &error);
                Err(error)
            }
        }
    }

    /// Registers a new allocation
    pub fn track_allocation(
        &self,
        block: &MemoryBlock,
        allocator: Option<&AllocatorTag>,
    ) -> MemoryResult<()> {
        let record = self.new_record(block, allocator);
        let insertion = {
            let mut state = self.state.lock();
            state.ensure_active("track_allocation")?;
            state.insert(record, &self.config)
        };
        self.log_insertion(block, &insertion);
        Ok(())
    }

    /// Removes the record at `address`
    ///
    /// Fails with `DoubleFree` if the address was freed recently and with
    /// `InvalidPointer` if it was never tracked.
    pub fn track_deallocation(&self, address: usize) -> MemoryResult<()> {
        self.untrack(address, None)
    }

    fn untrack(&self, address: usize, id: Option<u64>) -> MemoryResult<()> {
        let removal = {
            let mut state = self.state.lock();
            state.ensure_active("track_deallocation")?;
            state.remove(address, id, &self.config)
        };
        self.report_removal(address, removal)
    }

    /// Moves the record at `old_address` to `new`
    ///
    /// When the addresses match the record is resized in place and keeps
    /// its lifetime.
    pub fn track_reallocation(
        &self,
        old_address: usize,
        new: &MemoryBlock,
        allocator: Option<&AllocatorTag>,
    ) -> MemoryResult<()> {
        let record = self.new_record(new, allocator);
        let insertion = {
            let mut state = self.state.lock();
            state.ensure_active("track_reallocation")?;
            if old_address == new.address && state.resize(new) {
                state.statistics.total_reallocations += 1;
                return Ok(());
            }
            match state.remove(old_address, None, &self.config) {
                Removal::Freed | Removal::Untracked => {}
                removal => {
                    drop(state);
                    return self.report_removal(old_address, removal);
                }
            }
            state.statistics.total_reallocations += 1;
            state.insert(record, &self.config)
        };
        self.log_insertion(new, &insertion);
        Ok(())
    }

    /// Removes every listed block at once, as after an arena reset
    ///
    /// Blocks the tracker does not know are skipped. Returns the number of
    /// records removed.
    pub fn track_release(&self, blocks: &[MemoryBlock]) -> MemoryResult<usize> {
        let mut state = self.state.lock();
        state.ensure_active("track_release")?;
        let mut released = 0;
        for block in blocks {
            if state.release(block, &self.config) {
                released += 1;
            }
        }
        Ok(released)
    }

    fn observe_reallocation(&self, tag: &AllocatorTag, new: &MemoryBlock) {
        let record = self.new_record(new, Some(tag));
        let insertion = {
            let mut state = self.state.lock();
            if let Err(error) = state.ensure_active("on_reallocate") {
                drop(state);
                self.ignored("reallocate", &error);
                return;
            }
            state.statistics.total_reallocations += 1;
            // A moved block arrives as allocate + deallocate events of its own.
            if state.resize(new) {
                return;
            }
            state.insert(record, &self.config)
        };
        self.log_insertion(new, &insertion);
    }

    fn ignored(&self, event: &'static str, error: &MemoryError) {
        if error.kind() == ErrorKind::InvalidState {
            self.logger.log(
                &MemoryEvent::new(event, self.name(), LogLevel::Warn, "event ignored")
                    .with_data("reason", error),
            );
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Live record at `address`
    pub fn record(&self, address: usize) -> Option<MemoryAllocationRecord> {
        self.state.lock().records.get(&address).cloned()
    }

    /// Live records in allocation order
    pub fn records(&self) -> Vec<MemoryAllocationRecord> {
        self.state.lock().sorted_records()
    }

    /// Recently freed records, oldest first
    pub fn freed_records(&self) -> Vec<MemoryAllocationRecord> {
        self.state.lock().freed.iter().cloned().collect()
    }

    pub fn records_by_thread(&self, thread_id: u64) -> Vec<MemoryAllocationRecord> {
        self.records_where(|record| record.thread.id == thread_id)
    }

    pub fn records_by_size(&self, range: impl RangeBounds<usize>) -> Vec<MemoryAllocationRecord> {
        self.records_where(|record| range.contains(&record.size()))
    }

    /// Live records whose source file ends with `file`
    pub fn records_by_location(&self, file: &str) -> Vec<MemoryAllocationRecord> {
        self.records_where(|record| record.block.location.file.ends_with(file))
    }

    fn records_where<F>(&self, predicate: F) -> Vec<MemoryAllocationRecord>
    where
        F: Fn(&MemoryAllocationRecord) -> bool,
    {
        let mut records: Vec<_> = self
            .state
            .lock()
            .records
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect();
        records.sort_by_key(MemoryAllocationRecord::allocation_id);
        records
    }

    pub fn live_allocations(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn live_bytes(&self) -> usize {
        self.state.lock().statistics.current_bytes
    }

    // ------------------------------------------------------------------
    // Detection
    // ------------------------------------------------------------------

    /// Reports every record still registered
    pub fn detect_leaks(&self) -> MemoryResult<MemoryLeakReport> {
        let leaks = {
            let mut state = self.state.lock();
            state.ensure_active("detect_leaks")?;
            for record in state.records.values_mut() {
                record.is_leaked = true;
            }
            state.statistics.leak_detections = state.records.len() as u64;
            state.records.values().cloned().collect()
        };
        Ok(MemoryLeakReport::new(self.name(), leaks))
    }

    /// Fails with `LeakDetected` if anything is still registered
    pub fn check_leaks(&self) -> MemoryResult<()> {
        self.detect_leaks()?.into_result()
    }

    /// Re-validates every live record and asks owning allocators to check
    /// their blocks
    pub fn detect_corruption(&self) -> MemoryResult<MemoryCorruptionReport> {
        let (records, allocators) = {
            let state = self.state.lock();
            state.ensure_active("detect_corruption")?;
            let allocators: HashMap<u64, Weak<dyn Allocator>> = state
                .allocators
                .iter()
                .map(|(id, attached)| (*id, attached.allocator.clone()))
                .collect();
            (state.sorted_records(), allocators)
        };

        let mut findings = Vec::new();
        for record in &records {
            if !record.validate_canary() {
                findings.push(CorruptionFinding::new(
                    CorruptionKind::RecordCanary,
                    record,
                    "record guard overwritten".to_string(),
                ));
                continue;
            }
            let Some(allocator) = record
                .allocator
                .as_ref()
                .and_then(|tag| allocators.get(&tag.id()))
                .and_then(Weak::upgrade)
            else {
                continue;
            };
            if let Err(error) = allocator.validate_pointer(record.address() as *const u8) {
                let kind = match error.kind() {
                    ErrorKind::CorruptionDetected => CorruptionKind::BlockCorrupted,
                    ErrorKind::InvalidPointer => CorruptionKind::UnknownToAllocator,
                    _ => CorruptionKind::AllocatorRejected,
                };
                findings.push(CorruptionFinding::new(kind, record, error.to_string()));
            }
        }

        {
            let mut state = self.state.lock();
            for finding in &findings {
                if let Some(record) = state.records.get_mut(&finding.address)
                    && record.allocation_id() == finding.allocation_id
                {
                    record.is_corrupted = true;
                }
            }
            state.statistics.corruption_detections += findings.len() as u64;
        }

        for finding in &findings {
            let error = MemoryError::corruption(self.name(), &finding.to_string());
            report_corruption(
                self.logger.as_ref(),
                self.name(),
                self.config.on_corruption,
                &error,
            );
        }

        Ok(MemoryCorruptionReport {
            tracker: self.name().to_string(),
            generated_at: Utc::now(),
            checked: records.len(),
            findings,
        })
    }

    fn log_leaks(&self, report: &MemoryLeakReport) {
        if !report.has_leaks() {
            return;
        }
        self.logger.log(
            &MemoryEvent::new(
                "leak",
                self.name(),
                LogLevel::Warn,
                format!(
                    "{} allocation(s) leaked, {} bytes",
                    report.leak_count(),
                    report.total_bytes()
                ),
            )
            .with_data("count", report.leak_count())
            .with_data("bytes", report.total_bytes()),
        );
        if self.logger.enabled(LogLevel::Debug) {
            for leak in &report.leaks {
                self.logger.debug("leak", self.name(), &leak.to_string());
            }
        }
    }

    // ------------------------------------------------------------------
    // Attachment
    // ------------------------------------------------------------------

    /// Subscribes to an allocator's events and keeps a weak handle for
    /// pointer validation
    ///
    /// Attaching the same allocator twice has no further effect.
    pub fn attach<A>(self: &Arc<Self>, allocator: &Arc<A>)
    where
        A: Allocator + 'static,
    {
        let tag = allocator.tag().clone();
        let weak = Arc::downgrade(allocator);
        let weak: Weak<dyn Allocator> = weak;
        let newly_attached = self
            .state
            .lock()
            .allocators
            .insert(
                tag.id(),
                AttachedAllocator {
                    tag: tag.clone(),
                    allocator: weak,
                },
            )
            .is_none();

        if newly_attached {
            allocator
                .hooks()
                .register(Arc::clone(self) as Arc<dyn AllocationObserver>);
            self.logger.log(
                &MemoryEvent::new("attach", self.name(), LogLevel::Debug, "allocator attached")
                    .with_data("allocator", &tag),
            );
        }
    }

    /// Stops observing an allocator, returning true if it was attached
    pub fn detach<A>(&self, allocator: &A) -> bool
    where
        A: Allocator + ?Sized,
    {
        let removed = self
            .state
            .lock()
            .allocators
            .remove(&allocator.tag().id())
            .is_some();
        allocator.hooks().remove_observer(self);
        removed
    }

    /// Tags of attached allocators that are still alive
    pub fn attached_allocators(&self) -> Vec<AllocatorTag> {
        let mut tags: Vec<_> = self
            .state
            .lock()
            .allocators
            .values()
            .filter(|attached| attached.allocator.strong_count() > 0)
            .map(|attached| attached.tag.clone())
            .collect();
        tags.sort_by_key(AllocatorTag::id);
        tags
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn statistics(&self) -> MemoryStatistics {
        self.state.lock().statistics.clone()
    }

    /// Per-thread activity ordered by thread id
    pub fn thread_info(&self) -> Vec<ThreadAllocationInfo> {
        self.state.lock().threads()
    }

    pub fn size_histogram(&self) -> SizeHistogram {
        self.state.lock().statistics.histogram.clone()
    }

    /// Locations with the most allocations
    pub fn top_allocating_locations(&self, n: usize) -> Vec<LocationStats> {
        self.state.lock().top_locations(n)
    }

    /// Locations holding the most live bytes
    pub fn top_leaking_locations(&self, n: usize) -> Vec<LocationStats> {
        self.state.lock().top_leaking(n)
    }

    /// Threads that allocated the most bytes
    pub fn top_allocating_threads(&self, n: usize) -> Vec<ThreadAllocationInfo> {
        self.state.lock().top_threads(n)
    }

    /// Size and lifetime profile over live and recently freed records
    pub fn analyze_patterns(&self) -> AllocationPattern {
        self.state.lock().pattern(self.config.short_lived_threshold)
    }

    pub fn optimization_suggestions(&self) -> Vec<OptimizationSuggestion> {
        self.state.lock().suggestions(&self.config)
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    /// Consistent snapshot of the whole ledger
    pub fn report(&self) -> MemoryResult<TrackerReport> {
        let state = self.state.lock();
        state.ensure_active("report")?;
        Ok(TrackerReport {
            tracker: self.name().to_string(),
            generated_at: Utc::now(),
            statistics: state.statistics.clone(),
            records: state.sorted_records(),
            top_locations: state.top_locations(self.config.top_n),
            threads: state.threads(),
            pattern: state.pattern(self.config.short_lived_threshold),
            suggestions: state.suggestions(&self.config),
        })
    }

    pub fn generate_report(&self, format: ReportFormat) -> MemoryResult<String> {
        self.report()?.render(format)
    }

    /// Writes a report to `path`, failing with `ReportFailed` on I/O errors
    pub fn write_report(&self, path: impl AsRef<Path>, format: ReportFormat) -> MemoryResult<()> {
        let path = path.as_ref();
        self.report()?.write_to(path, format)?;
        self.logger.log(
            &MemoryEvent::new("report", self.name(), LogLevel::Info, "report written")
                .with_data("path", path.display())
                .with_data("format", format),
        );
        Ok(())
    }

    pub fn dump_statistics(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        let _ = writeln!(out, "[{}] {}", self.name(), state.phase);
        let _ = write!(out, "{}", state.statistics);
        let threads = state.threads();
        if !threads.is_empty() {
            let _ = writeln!(out, "  Threads:");
            for thread in &threads {
                let _ = writeln!(out, "    {thread}");
            }
        }
        out
    }

    pub fn dump_allocations(&self) -> String {
        let records = self.records();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "[{}] {} live allocation(s)",
            self.name(),
            records.len()
        );
        for record in &records {
            let _ = writeln!(out, "  {record}");
        }
        out
    }
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn default_capturer(config: &TrackerConfig) -> Option<Arc<dyn CallStackCapturer>> {
    #[cfg(feature = "profiling")]
    {
        if config.capture_call_stacks {
            return Some(Arc::new(super::capture::BacktraceCapturer::new()));
        }
    }
    let _ = config;
    None
}

impl AllocationObserver for MemoryTracker {
    fn on_allocate(&self, tag: &AllocatorTag, block: &MemoryBlock) {
        if let Err(error) = self.track_allocation(block, Some(tag)) {
            self.ignored("allocate", &error);
        }
    }

    fn on_deallocate(&self, _tag: &AllocatorTag, block: &MemoryBlock) {
        if let Err(error) = self.untrack(block.address, Some(block.allocation_id)) {
            self.ignored("deallocate", &error);
        }
    }

    fn on_reallocate(&self, tag: &AllocatorTag, _old: &MemoryBlock, new: &MemoryBlock) {
        self.observe_reallocation(tag, new);
    }

    fn on_release(&self, _tag: &AllocatorTag, blocks: &[MemoryBlock]) {
        if let Err(error) = self.track_release(blocks) {
            self.ignored("release", &error);
        }
    }
}

impl Drop for MemoryTracker {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.phase != TrackerPhase::Active || !self.config.report_leaks_on_destroy {
            return;
        }
        let leaks: Vec<_> = state.records.values().cloned().collect();
        let report = MemoryLeakReport::new(&self.config.name, leaks);
        self.log_leaks(&report);
    }
}

impl fmt::Debug for MemoryTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryTracker")
            .field("name", &self.config.name)
            .field("phase", &state.phase)
            .field("live", &state.records.len())
            .field("freed_history", &state.freed.len())
            .field("allocators", &state.allocators.len())
            .finish()
    }
}
