//! Allocator statistics tracking
//!
//! Counters are plain integers updated under each allocator's state lock;
//! readers get a [`Copy`] snapshot.

use core::fmt;

/// Statistics for one allocator instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocatorStats {
    /// Allocations ever made
    pub total_allocations: u64,
    /// Allocations currently live
    pub current_allocations: u64,
    /// Highest number of simultaneously live allocations
    pub peak_allocations: u64,
    /// Deallocations ever made (bulk releases included)
    pub total_deallocations: u64,
    /// Reallocations ever made
    pub total_reallocations: u64,
    /// Requests that returned an error
    pub failed_allocations: u64,
    /// Bytes ever allocated (cumulative)
    pub total_bytes_allocated: u64,
    /// Bytes ever released (cumulative)
    pub total_bytes_deallocated: u64,
    /// Bytes currently live
    pub current_bytes: usize,
    /// Highest number of simultaneously live bytes
    pub peak_bytes: usize,
    /// Largest single request served
    pub largest_allocation: usize,
    /// Smallest single request served
    pub smallest_allocation: usize,
    /// Number of bulk resets
    pub reset_count: u64,
    /// Number of times backing memory grew
    pub growth_count: u64,
    /// Corruptions and double frees detected
    pub corruption_detections: u64,
}

impl AllocatorStats {
    /// Creates a new empty stats object
    pub const fn new() -> Self {
        Self {
            total_allocations: 0,
            current_allocations: 0,
            peak_allocations: 0,
            total_deallocations: 0,
            total_reallocations: 0,
            failed_allocations: 0,
            total_bytes_allocated: 0,
            total_bytes_deallocated: 0,
            current_bytes: 0,
            peak_bytes: 0,
            largest_allocation: 0,
            smallest_allocation: 0,
            reset_count: 0,
            growth_count: 0,
            corruption_detections: 0,
        }
    }

    /// Reset all statistics to zero
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Record a successful allocation of `size` bytes
    pub fn record_allocation(&mut self, size: usize) {
        self.total_allocations += 1;
        self.current_allocations += 1;
        self.peak_allocations = self.peak_allocations.max(self.current_allocations);
        self.total_bytes_allocated += size as u64;
        self.current_bytes += size;
        self.peak_bytes = self.peak_bytes.max(self.current_bytes);
        self.largest_allocation = self.largest_allocation.max(size);
        self.smallest_allocation = if self.smallest_allocation == 0 {
            size
        } else {
            self.smallest_allocation.min(size)
        };
    }

    /// Record the release of one allocation of `size` bytes
    pub fn record_deallocation(&mut self, size: usize) {
        self.total_deallocations += 1;
        self.current_allocations = self.current_allocations.saturating_sub(1);
        self.total_bytes_deallocated += size as u64;
        self.current_bytes = self.current_bytes.saturating_sub(size);
    }

    /// Record a reallocation that changed the live size in place
    pub fn record_reallocation(&mut self, old_size: usize, new_size: usize) {
        self.total_reallocations += 1;
        if new_size >= old_size {
            let grown = new_size - old_size;
            self.total_bytes_allocated += grown as u64;
            self.current_bytes += grown;
            self.peak_bytes = self.peak_bytes.max(self.current_bytes);
        } else {
            let shrunk = old_size - new_size;
            self.total_bytes_deallocated += shrunk as u64;
            self.current_bytes = self.current_bytes.saturating_sub(shrunk);
        }
        self.largest_allocation = self.largest_allocation.max(new_size);
    }

    /// Record a failed request
    pub fn record_failure(&mut self) {
        self.failed_allocations += 1;
    }

    /// Record a bulk release of `count` allocations totalling `bytes`
    pub fn record_release(&mut self, count: usize, bytes: usize) {
        self.total_deallocations += count as u64;
        self.current_allocations = self.current_allocations.saturating_sub(count as u64);
        self.total_bytes_deallocated += bytes as u64;
        self.current_bytes = self.current_bytes.saturating_sub(bytes);
    }

    /// Record a reset
    pub fn record_reset(&mut self) {
        self.reset_count += 1;
    }

    /// Record a growth step
    pub fn record_growth(&mut self) {
        self.growth_count += 1;
    }

    /// Record a detected corruption or double free
    pub fn record_corruption(&mut self) {
        self.corruption_detections += 1;
    }

    /// Calculate the average allocation size
    pub fn average_allocation_size(&self) -> Option<f64> {
        if self.total_allocations > 0 {
            Some(self.total_bytes_allocated as f64 / self.total_allocations as f64)
        } else {
            None
        }
    }

    /// Share of allocations that have since been released
    ///
    /// `1 - current / total`; zero when nothing was ever allocated.
    pub fn fragmentation_ratio(&self) -> f64 {
        if self.total_allocations == 0 {
            0.0
        } else {
            1.0 - self.current_allocations as f64 / self.total_allocations as f64
        }
    }

    /// Calculate current allocation efficiency (0.0 to 1.0)
    pub fn allocation_efficiency(&self) -> f64 {
        let attempts = self.total_allocations + self.failed_allocations;
        if attempts > 0 {
            self.total_allocations as f64 / attempts as f64
        } else {
            1.0
        }
    }

    /// Check if there are any active allocations
    pub fn has_active_allocations(&self) -> bool {
        self.current_allocations > 0
    }
}

impl Default for AllocatorStats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Allocator Statistics:")?;
        writeln!(f, "  Current allocated: {} bytes", self.current_bytes)?;
        writeln!(f, "  Peak allocated: {} bytes", self.peak_bytes)?;
        writeln!(f, "  Live allocations: {}", self.current_allocations)?;
        writeln!(f, "  Peak allocations: {}", self.peak_allocations)?;
        writeln!(f, "  Allocations: {}", self.total_allocations)?;
        writeln!(f, "  Deallocations: {}", self.total_deallocations)?;
        writeln!(f, "  Reallocations: {}", self.total_reallocations)?;
        writeln!(f, "  Failed allocations: {}", self.failed_allocations)?;

        if let Some(avg) = self.average_allocation_size() {
            writeln!(f, "  Average allocation size: {avg:.2} bytes")?;
            writeln!(
                f,
                "  Size range: {}..={} bytes",
                self.smallest_allocation, self.largest_allocation
            )?;
        }

        writeln!(
            f,
            "  Fragmentation ratio: {:.2}%",
            self.fragmentation_ratio() * 100.0
        )?;
        writeln!(f, "  Resets: {}", self.reset_count)?;
        writeln!(f, "  Growths: {}", self.growth_count)?;
        writeln!(f, "  Corruptions detected: {}", self.corruption_detections)?;

        Ok(())
    }
}

/// Point-in-time memory figures of an allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocationInfo {
    /// Bytes the allocator can hand out in total
    pub total_memory: usize,
    /// Bytes currently consumed (headers and padding included)
    pub used_memory: usize,
    /// Bytes still available
    pub free_memory: usize,
    /// Highest `used_memory` observed
    pub peak_memory: usize,
    /// Allocations currently live
    pub allocation_count: usize,
    /// Bytes unusable because of padding or per-block overhead
    pub fragmentation_loss: usize,
}

impl AllocationInfo {
    /// Share of capacity in use, in `0.0..=1.0`
    pub fn usage_ratio(&self) -> f64 {
        if self.total_memory == 0 {
            0.0
        } else {
            self.used_memory as f64 / self.total_memory as f64
        }
    }
}

impl fmt::Display for AllocationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} used={} free={} peak={} allocations={} overhead={}",
            self.total_memory,
            self.used_memory,
            self.free_memory,
            self.peak_memory,
            self.allocation_count,
            self.fragmentation_loss
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_allocation_and_deallocation() {
        let mut stats = AllocatorStats::new();
        stats.record_allocation(100);
        stats.record_allocation(50);
        stats.record_deallocation(100);

        assert_eq!(stats.total_allocations, 2);
        assert_eq!(stats.current_allocations, 1);
        assert_eq!(stats.peak_allocations, 2);
        assert_eq!(stats.current_bytes, 50);
        assert_eq!(stats.peak_bytes, 150);
        assert_eq!(stats.largest_allocation, 100);
        assert_eq!(stats.smallest_allocation, 50);
        assert!((stats.fragmentation_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_release() {
        let mut stats = AllocatorStats::new();
        for _ in 0..4 {
            stats.record_allocation(16);
        }
        stats.record_release(4, 64);
        assert_eq!(stats.current_allocations, 0);
        assert_eq!(stats.current_bytes, 0);
        assert_eq!(stats.total_deallocations, 4);
        assert!(!stats.has_active_allocations());
    }

    #[test]
    fn test_record_reallocation() {
        let mut stats = AllocatorStats::new();
        stats.record_allocation(32);
        stats.record_reallocation(32, 96);
        assert_eq!(stats.current_bytes, 96);
        assert_eq!(stats.peak_bytes, 96);
        stats.record_reallocation(96, 8);
        assert_eq!(stats.current_bytes, 8);
        assert_eq!(stats.total_reallocations, 2);
    }

    #[test]
    fn test_efficiency_and_display() {
        let mut stats = AllocatorStats::new();
        assert!((stats.allocation_efficiency() - 1.0).abs() < f64::EPSILON);
        stats.record_allocation(10);
        stats.record_failure();
        assert!((stats.allocation_efficiency() - 0.5).abs() < f64::EPSILON);

        let text = stats.to_string();
        assert!(text.starts_with("Allocator Statistics:"));
        assert!(text.contains("Failed allocations: 1"));
    }

    #[test]
    fn test_allocation_info_usage_ratio() {
        let info = AllocationInfo {
            total_memory: 1000,
            used_memory: 250,
            ..AllocationInfo::default()
        };
        assert!((info.usage_ratio() - 0.25).abs() < f64::EPSILON);
        assert!(AllocationInfo::default().usage_ratio().abs() < f64::EPSILON);
    }
}
