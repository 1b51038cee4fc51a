//! Allocation request flags

use crate::error::{MemoryError, MemoryResult};

bitflags::bitflags! {
    /// Per-request allocation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AllocationFlags: u32 {
        /// Zero-fill the payload before returning it
        const ZERO_MEMORY = 0x0001;
        /// Raise alignment to 16 bytes
        const ALIGN_16 = 0x0002;
        /// Raise alignment to 32 bytes
        const ALIGN_32 = 0x0004;
        /// Raise alignment to 64 bytes
        const ALIGN_64 = 0x0008;
        /// Raise alignment to 128 bytes
        const ALIGN_128 = 0x0010;
        /// Raise alignment to 256 bytes
        const ALIGN_256 = 0x0020;
        /// Raise alignment to 512 bytes
        const ALIGN_512 = 0x0040;
        /// Raise alignment to 1024 bytes
        const ALIGN_1024 = 0x0080;
        /// Never coalesce with neighbouring blocks
        const NO_MERGE = 0x0100;
        /// Short-lived allocation
        const TEMPORARY = 0x0200;
        /// Allocation expected to live for the whole program
        const PERSISTENT = 0x0400;
        /// Record extra debug information for this allocation
        const DEBUG_INFO = 0x0800;
        /// Request guard pages around the allocation
        ///
        /// Accepted for compatibility; no allocator in this crate maps guard
        /// pages.
        const GUARD_PAGES = 0x1000;
        /// Surround the payload with canary bytes
        const CANARY_BYTES = 0x2000;

        /// Every alignment flag
        const ALIGN_MASK = Self::ALIGN_16.bits()
            | Self::ALIGN_32.bits()
            | Self::ALIGN_64.bits()
            | Self::ALIGN_128.bits()
            | Self::ALIGN_256.bits()
            | Self::ALIGN_512.bits()
            | Self::ALIGN_1024.bits();
    }
}

impl AllocationFlags {
    /// Alignment requested through an `ALIGN_*` flag, if any
    #[must_use]
    pub fn alignment(self) -> Option<usize> {
        let bits = (self & Self::ALIGN_MASK).bits();
        if bits == 0 {
            None
        } else {
            // ALIGN_16 is bit 1, each following flag doubles the alignment.
            Some(16usize << (bits.trailing_zeros() - 1))
        }
    }

    /// Combines a requested alignment with any `ALIGN_*` flag
    #[must_use]
    pub fn effective_alignment(self, alignment: usize) -> usize {
        self.alignment().map_or(alignment, |flag| flag.max(alignment))
    }

    /// Rejects contradictory flag combinations
    pub fn validate(self) -> MemoryResult<Self> {
        if (self & Self::ALIGN_MASK).bits().count_ones() > 1 {
            return Err(MemoryError::invalid_flags(
                self.bits(),
                "more than one ALIGN_* flag set",
            ));
        }
        if self.contains(Self::TEMPORARY | Self::PERSISTENT) {
            return Err(MemoryError::invalid_flags(
                self.bits(),
                "TEMPORARY and PERSISTENT are mutually exclusive",
            ));
        }
        Ok(self)
    }

    /// Parses raw bits, rejecting unknown flags
    pub fn from_raw(bits: u32) -> MemoryResult<Self> {
        Self::from_bits(bits)
            .ok_or_else(|| MemoryError::invalid_flags(bits, "unknown flag bits"))?
            .validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_flags() {
        assert_eq!(AllocationFlags::empty().alignment(), None);
        assert_eq!(AllocationFlags::ALIGN_16.alignment(), Some(16));
        assert_eq!(AllocationFlags::ALIGN_64.alignment(), Some(64));
        assert_eq!(AllocationFlags::ALIGN_1024.alignment(), Some(1024));
    }

    #[test]
    fn test_effective_alignment_takes_maximum() {
        let flags = AllocationFlags::ALIGN_32 | AllocationFlags::ZERO_MEMORY;
        assert_eq!(flags.effective_alignment(8), 32);
        assert_eq!(flags.effective_alignment(128), 128);
        assert_eq!(AllocationFlags::empty().effective_alignment(16), 16);
    }

    #[test]
    fn test_contradictory_flags() {
        let both = AllocationFlags::TEMPORARY | AllocationFlags::PERSISTENT;
        assert!(both.validate().is_err());

        let two_aligns = AllocationFlags::ALIGN_16 | AllocationFlags::ALIGN_64;
        assert!(two_aligns.validate().is_err());

        assert!(AllocationFlags::ZERO_MEMORY.validate().is_ok());
    }

    #[test]
    fn test_from_raw() {
        assert_eq!(
            AllocationFlags::from_raw(0x0001).unwrap(),
            AllocationFlags::ZERO_MEMORY
        );
        assert!(AllocationFlags::from_raw(0x8000_0000).is_err());
    }
}
