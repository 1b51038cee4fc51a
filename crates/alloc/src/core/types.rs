//! Common types and constants for memory management

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Memory size constants
pub mod size {
    /// 1 Kilobyte
    pub const KB: usize = 1024;

    /// 1 Megabyte
    pub const MB: usize = 1024 * KB;

    /// 1 Gigabyte
    pub const GB: usize = 1024 * MB;
}

/// Source location of an allocation request
///
/// Captured with `#[track_caller]` so call sites never have to spell out
/// file and line themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    /// Location of the caller of the function this is invoked from
    #[track_caller]
    #[must_use]
    pub fn caller() -> Self {
        let location = core::panic::Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }

    /// Placeholder for requests with no known origin
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            file: "<unknown>",
            line: 0,
            column: 0,
        }
    }

    /// Returns true if this is the [`unknown`](Self::unknown) placeholder
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.line == 0 && self.file == "<unknown>"
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// What an allocator does after it detects corruption or a double free
///
/// Detection is always logged and counted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptionPolicy {
    /// Return an error from the failing operation and keep running
    #[default]
    Report,
    /// Panic with the error message
    Panic,
    /// Abort the process
    Abort,
}

static NEXT_ALLOCATOR_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an allocator instance, attached to every event it emits
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AllocatorTag {
    id: u64,
    name: Arc<str>,
}

impl AllocatorTag {
    /// Creates a tag with a process-unique id
    pub fn new(name: &str) -> Self {
        Self {
            id: NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
        }
    }

    /// Unique id of the allocator instance
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Human readable allocator name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for AllocatorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_location_caller() {
        let location = SourceLocation::caller();
        assert!(location.file.ends_with("types.rs"));
        assert!(location.line > 0);
        assert!(!location.is_unknown());
        assert!(SourceLocation::unknown().is_unknown());
    }

    #[test]
    fn test_allocator_tags_are_unique() {
        let a = AllocatorTag::new("pool");
        let b = AllocatorTag::new("pool");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), "pool");
        assert!(a.to_string().starts_with("pool#"));
    }
}
