//! Object pool statistics

use core::fmt;

/// Slot-level statistics of an [`ObjectPool`](super::ObjectPool)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectPoolStats {
    /// Bytes per slot
    pub object_size: usize,
    /// Slots across all segments
    pub capacity: usize,
    /// Slots holding an object
    pub in_use: usize,
    /// Slots on the free list
    pub available: usize,
    /// Highest `in_use` seen
    pub peak_in_use: usize,
    /// Slot segments currently owned
    pub segments: usize,
    /// Objects written into slots
    pub constructed: u64,
    /// Objects dropped on release, reset or pool drop
    pub destructed: u64,
    /// Successful acquisitions
    pub acquisitions: u64,
    /// Successful releases
    pub releases: u64,
    /// Segments added after construction
    pub growth_count: u64,
    /// Releases of slots that were already free
    pub double_release_count: u64,
    /// Releases of pointers outside slot storage or off a slot boundary
    pub invalid_release_count: u64,
    /// Released objects rejected by the validator hook
    pub validation_failures: u64,
}

impl ObjectPoolStats {
    /// `in_use / capacity`, in `0.0..=1.0`
    pub fn utilization_ratio(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.in_use as f64 / self.capacity as f64
        }
    }

    /// Objects constructed and not yet dropped
    pub fn live_objects(&self) -> u64 {
        self.constructed.saturating_sub(self.destructed)
    }
}

impl fmt::Display for ObjectPoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Object Pool Statistics:")?;
        writeln!(f, "  Object size: {} bytes", self.object_size)?;
        writeln!(
            f,
            "  Slots: {} in use / {} available / {} total ({} segment(s))",
            self.in_use, self.available, self.capacity, self.segments
        )?;
        writeln!(f, "  Peak in use: {}", self.peak_in_use)?;
        writeln!(
            f,
            "  Utilization: {:.2}%",
            self.utilization_ratio() * 100.0
        )?;
        writeln!(
            f,
            "  Objects: {} constructed, {} destructed",
            self.constructed, self.destructed
        )?;
        writeln!(
            f,
            "  Acquisitions: {}, releases: {}",
            self.acquisitions, self.releases
        )?;
        writeln!(f, "  Growths: {}", self.growth_count)?;
        writeln!(f, "  Double releases: {}", self.double_release_count)?;
        writeln!(f, "  Invalid releases: {}", self.invalid_release_count)?;
        writeln!(f, "  Validation failures: {}", self.validation_failures)?;
        Ok(())
    }
}
