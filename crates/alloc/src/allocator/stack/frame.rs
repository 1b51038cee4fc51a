//! Named frames and the RAII scope guard

use chrono::{DateTime, Utc};

use super::{MarkerId, StackAllocator};
use crate::core::SourceLocation;

/// Debug bookkeeping for one named frame
///
/// A frame is a marker with a name, an origin and the list of allocations
/// made while it was the innermost frame.
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// Frame name given to [`push_frame`](StackAllocator::push_frame)
    pub name: String,
    /// Marker backing the frame
    pub marker: MarkerId,
    /// Cursor offset when the frame was pushed
    pub position: usize,
    /// Allocations made directly in this frame
    pub allocation_count: usize,
    /// Bytes requested directly in this frame
    pub total_size: usize,
    /// Where the frame was pushed
    pub location: SourceLocation,
    /// When the frame was pushed
    pub timestamp: DateTime<Utc>,
    /// Addresses of allocations made directly in this frame
    pub allocations: Vec<usize>,
}

impl StackFrame {
    pub(super) fn new(
        name: &str,
        marker: MarkerId,
        position: usize,
        location: SourceLocation,
    ) -> Self {
        Self {
            name: name.to_string(),
            marker,
            position,
            allocation_count: 0,
            total_size: 0,
            location,
            timestamp: Utc::now(),
            allocations: Vec::new(),
        }
    }

    pub(super) fn record(&mut self, address: usize, size: usize) {
        self.allocation_count += 1;
        self.total_size += size;
        self.allocations.push(address);
    }

    pub(super) fn forget(&mut self, address: usize, size: usize) {
        if let Some(index) = self.allocations.iter().rposition(|&a| a == address) {
            self.allocations.remove(index);
            self.allocation_count -= 1;
            self.total_size -= size;
        }
    }
}

/// RAII helper for stack-based scoped allocation
///
/// Pushes a marker on creation and pops back to it when dropped.
pub struct StackScope<'a> {
    allocator: &'a StackAllocator,
    marker: MarkerId,
}

impl<'a> StackScope<'a> {
    pub(super) fn new(allocator: &'a StackAllocator, marker: MarkerId) -> Self {
        Self { allocator, marker }
    }

    /// Gets the underlying allocator
    pub fn allocator(&self) -> &'a StackAllocator {
        self.allocator
    }

    /// Marker the scope pops back to
    pub fn marker(&self) -> MarkerId {
        self.marker
    }

    /// Manually restore and consume this scope
    pub fn restore(self) {
        drop(self);
    }
}

impl Drop for StackScope<'_> {
    fn drop(&mut self) {
        // Already gone if an enclosing marker was popped or the stack reset.
        let _ = self.allocator.pop_to_marker(self.marker);
    }
}
