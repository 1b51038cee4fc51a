//! Stack markers for position tracking

use core::fmt;

/// Handle to a marker pushed onto a [`StackAllocator`](super::StackAllocator)
///
/// Popping the marker releases every allocation made after it was pushed.
/// Ids are unique among the markers currently on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub(super) u32);

impl MarkerId {
    /// Raw id value
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

/// Saved cursor state behind a [`MarkerId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct MarkerRecord {
    pub(super) id: MarkerId,
    pub(super) offset: usize,
    pub(super) allocation_count: usize,
}
