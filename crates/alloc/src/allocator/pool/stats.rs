//! Pool allocator statistics

use core::fmt;

/// Block-level figures of a [`MemoryPool`](super::MemoryPool)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryPoolStats {
    /// Payload bytes per block
    pub block_size: usize,
    /// Bytes per slot, header and canary included
    pub stride: usize,
    /// Blocks across all chunks
    pub total_blocks: usize,
    /// Blocks handed out
    pub used_blocks: usize,
    /// Blocks on free lists
    pub free_blocks: usize,
    /// Highest `used_blocks` observed
    pub peak_used_blocks: usize,
    /// Chunks currently owned
    pub chunk_count: usize,
    /// Chunks added after construction
    pub growth_count: u64,
    /// Chunks removed by shrinking
    pub shrink_count: u64,
    /// Double frees detected
    pub double_free_count: u64,
    /// Frees of pointers the pool does not own
    pub invalid_free_count: u64,
    /// Header or canary mismatches detected
    pub corruption_count: u64,
}

impl MemoryPoolStats {
    /// `used_blocks / total_blocks`, in `0.0..=1.0`
    pub fn utilization_ratio(&self) -> f64 {
        if self.total_blocks == 0 {
            0.0
        } else {
            self.used_blocks as f64 / self.total_blocks as f64
        }
    }

    /// Returns true if `used + free == total`
    pub fn is_conserved(&self) -> bool {
        self.used_blocks + self.free_blocks == self.total_blocks
    }
}

impl fmt::Display for MemoryPoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pool Statistics:")?;
        writeln!(
            f,
            "  Block size: {} bytes ({} bytes per slot)",
            self.block_size, self.stride
        )?;
        writeln!(
            f,
            "  Blocks: {} used / {} free / {} total",
            self.used_blocks, self.free_blocks, self.total_blocks
        )?;
        writeln!(f, "  Peak used blocks: {}", self.peak_used_blocks)?;
        writeln!(
            f,
            "  Utilization: {:.2}%",
            self.utilization_ratio() * 100.0
        )?;
        writeln!(
            f,
            "  Chunks: {} (grown {}, shrunk {})",
            self.chunk_count, self.growth_count, self.shrink_count
        )?;
        writeln!(f, "  Double frees: {}", self.double_free_count)?;
        writeln!(f, "  Invalid frees: {}", self.invalid_free_count)?;
        writeln!(f, "  Corruptions: {}", self.corruption_count)?;
        Ok(())
    }
}
