//! Per-allocation ledger entries

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::core::AllocatorTag;
use crate::registry::MemoryBlock;

/// Guard value written at both ends of every record
pub const RECORD_CANARY: u32 = 0xFEED_FACE;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

std::thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Small sequential id of the calling thread, stable for its lifetime
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

/// Thread that made an allocation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadStamp {
    pub id: u64,
    pub name: Option<String>,
}

impl ThreadStamp {
    /// The calling thread
    pub fn current() -> Self {
        Self {
            id: current_thread_id(),
            name: std::thread::current().name().map(str::to_string),
        }
    }

    /// Placeholder when thread tracking is off
    pub fn untracked() -> Self {
        Self { id: 0, name: None }
    }
}

impl fmt::Display for ThreadStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} (#{})", self.id),
            None => write!(f, "thread #{}", self.id),
        }
    }
}

/// Everything the tracker knows about one allocation
#[derive(Debug, Clone)]
pub struct MemoryAllocationRecord {
    canary_start: u32,
    pub block: MemoryBlock,
    /// Allocator that handed the block out, if known
    pub allocator: Option<AllocatorTag>,
    pub thread: ThreadStamp,
    /// Raw return addresses, innermost first
    pub call_stack: Vec<usize>,
    pub lifetime_start: DateTime<Utc>,
    pub lifetime_end: Option<DateTime<Utc>>,
    pub is_leaked: bool,
    pub is_corrupted: bool,
    pub is_double_freed: bool,
    pub is_invalid_free: bool,
    canary_end: u32,
}

impl MemoryAllocationRecord {
    pub fn new(
        block: MemoryBlock,
        allocator: Option<AllocatorTag>,
        thread: ThreadStamp,
        call_stack: Vec<usize>,
    ) -> Self {
        Self {
            canary_start: RECORD_CANARY,
            block,
            allocator,
            thread,
            call_stack,
            lifetime_start: Utc::now(),
            lifetime_end: None,
            is_leaked: false,
            is_corrupted: false,
            is_double_freed: false,
            is_invalid_free: false,
            canary_end: RECORD_CANARY,
        }
    }

    #[inline]
    pub fn address(&self) -> usize {
        self.block.address
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.block.size
    }

    #[inline]
    pub fn allocation_id(&self) -> u64 {
        self.block.allocation_id
    }

    /// Returns true if both record canaries are intact
    pub fn validate_canary(&self) -> bool {
        self.canary_start == RECORD_CANARY && self.canary_end == RECORD_CANARY
    }

    /// Time between allocation and deallocation, or until now if live
    pub fn lifetime(&self) -> chrono::Duration {
        self.lifetime_end.unwrap_or_else(Utc::now) - self.lifetime_start
    }

    /// Marks the record as freed now
    pub(super) fn close(&mut self) {
        self.lifetime_end = Some(Utc::now());
    }

    /// `file:line`, the key used to group records by location
    pub fn location_key(&self) -> String {
        self.block.location.to_string()
    }

    /// Allocator display name, or `-`
    pub fn allocator_name(&self) -> String {
        self.allocator
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string)
    }

    #[cfg(test)]
    pub(super) fn corrupt_canary(&mut self) {
        self.canary_end = !RECORD_CANARY;
    }
}

impl fmt::Display for MemoryAllocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {:#x} ({} bytes) at {} by {} on {}",
            self.allocation_id(),
            self.address(),
            self.size(),
            self.block.location,
            self.allocator_name(),
            self.thread
        )?;
        if self.is_corrupted {
            f.write_str(" [corrupted]")?;
        }
        if self.is_double_freed {
            f.write_str(" [double freed]")?;
        }
        Ok(())
    }
}
