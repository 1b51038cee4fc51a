//! Linear allocator configuration

use crate::core::{CorruptionPolicy, DEFAULT_ALIGNMENT, MIN_ALIGNMENT, is_power_of_two};
use crate::error::{MemoryError, MemoryResult};

/// Configuration for linear allocator
#[derive(Debug, Clone)]
pub struct LinearConfig {
    /// Name used in logs and reports
    pub name: String,

    /// Replace the arena with a larger one when it runs out
    ///
    /// Growth moves the arena, so it is only attempted while no
    /// allocation is live.
    pub allow_growth: bool,
    /// Minimum number of bytes added per growth step
    pub growth_increment: usize,
    /// Upper bound for the arena size; zero means unbounded
    pub max_capacity: usize,

    /// Limit on simultaneously live allocations; zero means unbounded
    pub max_allocations: usize,
    /// Alignment used by [`LinearAllocator::alloc`](super::LinearAllocator::alloc)
    pub default_alignment: usize,

    /// Write a canary-carrying header in front of every payload
    pub use_headers: bool,
    /// Zero the used range on reset and rewind
    pub zero_on_reset: bool,

    /// Fill patterns for debugging
    pub alloc_pattern: Option<u8>,
    pub dealloc_pattern: Option<u8>,

    /// What to do after a header mismatch is found
    pub on_corruption: CorruptionPolicy,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            name: "linear".to_string(),
            allow_growth: false,
            growth_increment: 64 * 1024,
            max_capacity: 0,
            max_allocations: 0,
            default_alignment: DEFAULT_ALIGNMENT,
            use_headers: false,
            zero_on_reset: false,
            alloc_pattern: None,
            dealloc_pattern: None,
            on_corruption: CorruptionPolicy::Report,
        }
    }
}

impl LinearConfig {
    /// Production configuration - optimized for performance
    #[must_use]
    pub fn production() -> Self {
        Self {
            allow_growth: true,
            growth_increment: 1024 * 1024,
            ..Self::default()
        }
    }

    /// Debug configuration - optimized for debugging
    #[must_use]
    pub fn debug() -> Self {
        Self {
            use_headers: true,
            zero_on_reset: true,
            alloc_pattern: Some(0xCC),
            dealloc_pattern: Some(0xDD),
            ..Self::default()
        }
    }

    /// Performance configuration - minimal overhead
    #[must_use]
    pub fn performance() -> Self {
        Self {
            default_alignment: MIN_ALIGNMENT,
            ..Self::default()
        }
    }

    /// Sets the name used in logs and reports
    #[must_use = "builder methods must be chained or built"]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables growth in steps of `increment` bytes up to `max_capacity`
    #[must_use = "builder methods must be chained or built"]
    pub fn with_growth(mut self, increment: usize, max_capacity: usize) -> Self {
        self.allow_growth = true;
        self.growth_increment = increment;
        self.max_capacity = max_capacity;
        self
    }

    /// Rejects inconsistent settings
    pub fn validate(&self) -> MemoryResult<()> {
        if !is_power_of_two(self.default_alignment) || self.default_alignment < MIN_ALIGNMENT {
            return Err(MemoryError::invalid_config(
                "default_alignment must be a power of two of at least pointer size",
            ));
        }
        if self.allow_growth && self.growth_increment == 0 {
            return Err(MemoryError::invalid_config(
                "growth_increment must be non-zero when growth is allowed",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(LinearConfig::default().validate().is_ok());
        assert!(LinearConfig::production().validate().is_ok());
        assert!(LinearConfig::debug().validate().is_ok());
        assert!(LinearConfig::performance().validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = LinearConfig {
            default_alignment: 12,
            ..LinearConfig::default()
        };
        assert!(config.validate().is_err());

        let config = LinearConfig::default().with_growth(0, 0);
        assert!(config.validate().is_err());
    }
}
