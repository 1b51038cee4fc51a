//! Aggregate statistics and allocation pattern analysis

use core::fmt;
use core::time::Duration;

use hashbrown::HashMap;
use serde::Serialize;

/// Upper bounds (inclusive) of the fixed size buckets; the last bucket is open
const BUCKET_LIMITS: [usize; 7] = [16, 64, 256, 1024, 4 * 1024, 16 * 1024, 64 * 1024];

const BUCKET_LABELS: [&str; 8] = [
    "0-16B", "17-64B", "65-256B", "257B-1KB", "1-4KB", "4-16KB", "16-64KB", "64KB+",
];

/// Allocation counts over fixed size classes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SizeHistogram {
    counts: [u64; 8],
}

impl SizeHistogram {
    /// Number of buckets
    pub const BUCKETS: usize = 8;

    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket index for an allocation of `size` bytes
    pub fn bucket_of(size: usize) -> usize {
        BUCKET_LIMITS
            .iter()
            .position(|&limit| size <= limit)
            .unwrap_or(BUCKET_LIMITS.len())
    }

    /// Counts one allocation
    pub fn record(&mut self, size: usize) {
        self.counts[Self::bucket_of(size)] += 1;
    }

    /// Count in bucket `index`
    pub fn count(&self, index: usize) -> u64 {
        self.counts.get(index).copied().unwrap_or(0)
    }

    /// Total samples across all buckets
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// `(label, count)` pairs in size order
    pub fn buckets(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        BUCKET_LABELS.iter().copied().zip(self.counts.iter().copied())
    }

    /// Share of samples at or below 64 bytes
    pub fn small_ratio(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.counts[0] + self.counts[1]) as f64 / total as f64
        }
    }

    pub fn clear(&mut self) {
        self.counts = [0; 8];
    }
}

impl fmt::Display for SizeHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total().max(1);
        for (label, count) in self.buckets() {
            let bar = "#".repeat((count * 40 / total) as usize);
            writeln!(f, "  {label:>9} {count:>8} {bar}")?;
        }
        Ok(())
    }
}

/// Allocation activity of one thread
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThreadAllocationInfo {
    pub thread_id: u64,
    pub thread_name: Option<String>,
    pub allocations: u64,
    pub deallocations: u64,
    pub total_bytes: u64,
    pub current_bytes: usize,
    pub peak_bytes: usize,
}

impl ThreadAllocationInfo {
    pub(super) fn new(thread_id: u64, thread_name: Option<String>) -> Self {
        Self {
            thread_id,
            thread_name,
            ..Self::default()
        }
    }

    pub(super) fn record_allocation(&mut self, size: usize) {
        self.allocations += 1;
        self.total_bytes += size as u64;
        self.current_bytes += size;
        self.peak_bytes = self.peak_bytes.max(self.current_bytes);
    }

    pub(super) fn record_deallocation(&mut self, size: usize) {
        self.deallocations += 1;
        self.current_bytes = self.current_bytes.saturating_sub(size);
    }

    /// Allocations not yet matched by a deallocation
    pub fn live_allocations(&self) -> u64 {
        self.allocations.saturating_sub(self.deallocations)
    }
}

impl fmt::Display for ThreadAllocationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.thread_name.as_deref().unwrap_or("<unnamed>");
        write!(
            f,
            "{name} (#{}): {} allocs, {} frees, {} bytes live, {} bytes peak",
            self.thread_id, self.allocations, self.deallocations, self.current_bytes, self.peak_bytes
        )
    }
}

/// Allocation activity attributed to one source location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocationStats {
    /// `file:line`
    pub location: String,
    pub allocations: u64,
    pub total_bytes: u64,
    pub live_allocations: u64,
    pub live_bytes: usize,
}

impl LocationStats {
    pub(super) fn new(location: String) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }
}

impl fmt::Display for LocationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} allocs ({} bytes), {} live ({} bytes)",
            self.location, self.allocations, self.total_bytes, self.live_allocations, self.live_bytes
        )
    }
}

/// Tracker-wide counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStatistics {
    pub total_allocations: u64,
    pub total_deallocations: u64,
    pub total_reallocations: u64,
    pub total_bytes_allocated: u64,
    pub total_bytes_freed: u64,
    pub current_allocations: usize,
    pub current_bytes: usize,
    pub peak_allocations: usize,
    pub peak_bytes: usize,
    pub largest_allocation: usize,
    pub smallest_allocation: Option<usize>,
    pub double_free_detections: u64,
    pub invalid_free_detections: u64,
    pub corruption_detections: u64,
    pub leak_detections: u64,
    /// Allocations seen after the record cap was reached
    pub untracked_allocations: u64,
    pub histogram: SizeHistogram,
}

impl MemoryStatistics {
    pub(super) fn record_allocation(&mut self, size: usize) {
        self.total_allocations += 1;
        self.total_bytes_allocated += size as u64;
        self.current_allocations += 1;
        self.current_bytes += size;
        self.peak_allocations = self.peak_allocations.max(self.current_allocations);
        self.peak_bytes = self.peak_bytes.max(self.current_bytes);
        self.largest_allocation = self.largest_allocation.max(size);
        self.smallest_allocation = Some(self.smallest_allocation.map_or(size, |s| s.min(size)));
        self.histogram.record(size);
    }

    pub(super) fn record_deallocation(&mut self, size: usize) {
        self.total_deallocations += 1;
        self.total_bytes_freed += size as u64;
        self.current_allocations = self.current_allocations.saturating_sub(1);
        self.current_bytes = self.current_bytes.saturating_sub(size);
    }

    /// Mean size over every tracked allocation
    pub fn average_allocation_size(&self) -> f64 {
        if self.total_allocations == 0 {
            0.0
        } else {
            self.total_bytes_allocated as f64 / self.total_allocations as f64
        }
    }

    /// Total of all detected misuse events
    pub fn error_count(&self) -> u64 {
        self.double_free_detections + self.invalid_free_detections + self.corruption_detections
    }
}

impl fmt::Display for MemoryStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tracker Statistics:")?;
        writeln!(f, "  Allocations: {}", self.total_allocations)?;
        writeln!(f, "  Deallocations: {}", self.total_deallocations)?;
        writeln!(f, "  Reallocations: {}", self.total_reallocations)?;
        writeln!(
            f,
            "  Live: {} ({} bytes)",
            self.current_allocations, self.current_bytes
        )?;
        writeln!(f, "  Peak: {} ({} bytes)", self.peak_allocations, self.peak_bytes)?;
        writeln!(f, "  Bytes allocated: {}", self.total_bytes_allocated)?;
        writeln!(f, "  Bytes freed: {}", self.total_bytes_freed)?;
        writeln!(
            f,
            "  Average size: {:.1} bytes",
            self.average_allocation_size()
        )?;
        writeln!(f, "  Largest: {} bytes", self.largest_allocation)?;
        writeln!(f, "  Double frees: {}", self.double_free_detections)?;
        writeln!(f, "  Invalid frees: {}", self.invalid_free_detections)?;
        writeln!(f, "  Corruptions: {}", self.corruption_detections)?;
        writeln!(f, "  Leaks: {}", self.leak_detections)?;
        if self.untracked_allocations > 0 {
            writeln!(f, "  Untracked: {}", self.untracked_allocations)?;
        }
        writeln!(f, "  Size distribution:")?;
        write!(f, "{}", self.histogram)
    }
}

/// Shape of the allocation workload
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllocationPattern {
    pub sample_count: usize,
    pub average_size: f64,
    pub median_size: usize,
    /// Most frequent size, smallest wins ties
    pub mode_size: usize,
    pub size_variance: f64,
    /// Mean lifetime of freed allocations
    pub average_lifetime: Duration,
    /// Share of freed allocations that lived shorter than the threshold
    pub short_lived_ratio: f64,
}

impl AllocationPattern {
    /// Derives the pattern from allocation sizes and completed lifetimes
    pub fn from_samples(sizes: &[usize], lifetimes: &[Duration], short_lived: Duration) -> Self {
        let mut pattern = Self {
            sample_count: sizes.len(),
            ..Self::default()
        };

        if !sizes.is_empty() {
            let n = sizes.len() as f64;
            let mean = sizes.iter().map(|&s| s as f64).sum::<f64>() / n;
            pattern.average_size = mean;
            pattern.size_variance =
                sizes.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n;

            let mut sorted = sizes.to_vec();
            sorted.sort_unstable();
            pattern.median_size = sorted[sorted.len() / 2];

            let mut frequency: HashMap<usize, usize> = HashMap::new();
            for &size in &sorted {
                *frequency.entry(size).or_default() += 1;
            }
            pattern.mode_size = frequency
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
                .map_or(0, |(size, _)| size);
        }

        if !lifetimes.is_empty() {
            let total: Duration = lifetimes.iter().sum();
            pattern.average_lifetime = total / lifetimes.len() as u32;
            let short = lifetimes.iter().filter(|&&l| l < short_lived).count();
            pattern.short_lived_ratio = short as f64 / lifetimes.len() as f64;
        }

        pattern
    }

    /// Coefficient of variation of allocation sizes
    pub fn size_spread(&self) -> f64 {
        if self.average_size == 0.0 {
            0.0
        } else {
            self.size_variance.sqrt() / self.average_size
        }
    }
}

impl fmt::Display for AllocationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Allocation Pattern:")?;
        writeln!(f, "  Samples: {}", self.sample_count)?;
        writeln!(f, "  Average size: {:.1} bytes", self.average_size)?;
        writeln!(f, "  Median size: {} bytes", self.median_size)?;
        writeln!(f, "  Mode size: {} bytes", self.mode_size)?;
        writeln!(f, "  Size variance: {:.1}", self.size_variance)?;
        writeln!(f, "  Average lifetime: {:?}", self.average_lifetime)?;
        write!(f, "  Short-lived: {:.1}%", self.short_lived_ratio * 100.0)
    }
}

/// Area an optimization suggestion targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SuggestionKind {
    /// Many small same-sized allocations
    UsePool,
    /// Mostly short-lived allocations
    UseArena,
    /// One location dominates allocation traffic
    UseObjectPool,
    /// Allocation sizes vary widely
    ReduceFragmentation,
    /// Live allocations at shutdown or misuse events
    FixLeaks,
    FixMisuse,
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UsePool => "use-pool",
            Self::UseArena => "use-arena",
            Self::UseObjectPool => "use-object-pool",
            Self::ReduceFragmentation => "reduce-fragmentation",
            Self::FixLeaks => "fix-leaks",
            Self::FixMisuse => "fix-misuse",
        };
        f.write_str(name)
    }
}

/// Advice derived from the tracked workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizationSuggestion {
    pub kind: SuggestionKind,
    pub message: String,
}

impl fmt::Display for OptimizationSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_buckets() {
        let mut histogram = SizeHistogram::new();
        for size in [0, 16, 17, 64, 65, 1024, 1025, 70_000] {
            histogram.record(size);
        }
        assert_eq!(histogram.count(0), 2);
        assert_eq!(histogram.count(1), 2);
        assert_eq!(histogram.count(2), 1);
        assert_eq!(histogram.count(3), 1);
        assert_eq!(histogram.count(4), 1);
        assert_eq!(histogram.count(7), 1);
        assert_eq!(histogram.total(), 8);
        assert_eq!(histogram.small_ratio(), 0.5);
        assert!(histogram.to_string().contains("64KB+"));
    }

    #[test]
    fn test_statistics_peaks() {
        let mut stats = MemoryStatistics::default();
        stats.record_allocation(100);
        stats.record_allocation(50);
        stats.record_deallocation(100);
        stats.record_allocation(10);

        assert_eq!(stats.current_allocations, 2);
        assert_eq!(stats.current_bytes, 60);
        assert_eq!(stats.peak_bytes, 150);
        assert_eq!(stats.peak_allocations, 2);
        assert_eq!(stats.smallest_allocation, Some(10));
        assert_eq!(stats.largest_allocation, 100);
        assert!(stats.to_string().starts_with("Tracker Statistics:"));
    }

    #[test]
    fn test_pattern_from_samples() {
        let sizes = [32, 32, 64, 128, 32];
        let lifetimes = [
            Duration::from_micros(10),
            Duration::from_micros(20),
            Duration::from_millis(30),
        ];
        let pattern = AllocationPattern::from_samples(&sizes, &lifetimes, Duration::from_millis(1));

        assert_eq!(pattern.sample_count, 5);
        assert_eq!(pattern.median_size, 32);
        assert_eq!(pattern.mode_size, 32);
        assert!((pattern.average_size - 57.6).abs() < 1e-9);
        assert!(pattern.size_variance > 0.0);
        assert_eq!(pattern.average_lifetime, Duration::from_micros(10_010));
        assert!((pattern.short_lived_ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_pattern_mode_ties_pick_smallest() {
        let pattern = AllocationPattern::from_samples(&[64, 16, 64, 16], &[], Duration::ZERO);
        assert_eq!(pattern.mode_size, 16);
        assert_eq!(pattern.short_lived_ratio, 0.0);
    }

    #[test]
    fn test_thread_info() {
        let mut info = ThreadAllocationInfo::new(3, Some("worker".into()));
        info.record_allocation(40);
        info.record_allocation(60);
        info.record_deallocation(40);
        assert_eq!(info.live_allocations(), 1);
        assert_eq!(info.peak_bytes, 100);
        assert_eq!(info.current_bytes, 60);
        assert!(info.to_string().starts_with("worker (#3)"));
    }
}
