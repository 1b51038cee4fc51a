//! Markers and scoping support for linear allocator

use super::LinearAllocator;

/// Saved cursor position of a [`LinearAllocator`]
///
/// Only valid until the next reset; rewinding to a marker from an earlier
/// generation is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearMarker {
    pub(super) offset: usize,
    pub(super) allocation_count: usize,
    pub(super) generation: u32,
}

impl LinearMarker {
    /// Cursor offset from the start of the arena
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Live allocations when the marker was taken
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }
}

/// RAII guard for automatic marker restoration
///
/// When dropped, releases everything allocated through the allocator since
/// the guard was created.
pub struct LinearScope<'a> {
    allocator: &'a LinearAllocator,
    marker: LinearMarker,
}

impl<'a> LinearScope<'a> {
    pub(super) fn new(allocator: &'a LinearAllocator) -> Self {
        Self {
            marker: allocator.marker(),
            allocator,
        }
    }

    /// Gets the underlying allocator
    pub fn allocator(&self) -> &'a LinearAllocator {
        self.allocator
    }

    /// Marker the scope rewinds to
    pub fn marker(&self) -> LinearMarker {
        self.marker
    }
}

impl Drop for LinearScope<'_> {
    fn drop(&mut self) {
        // A reset inside the scope makes the marker stale; nothing to undo then.
        if self.marker.generation != self.allocator.generation() {
            return;
        }
        if let Err(error) = self.allocator.rewind(self.marker) {
            self.allocator.report_scope_failure(&error);
        }
    }
}
