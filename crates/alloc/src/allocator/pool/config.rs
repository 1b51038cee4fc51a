//! Pool allocator configuration

use crate::core::{CorruptionPolicy, DEFAULT_ALIGNMENT, MAX_ALIGNMENT, MIN_ALIGNMENT, is_power_of_two};
use crate::error::{MemoryError, MemoryResult};

/// Configuration for pool allocator
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Name used in logs and reports
    pub name: String,

    /// Payload bytes per block
    pub block_size: usize,
    /// Blocks in the first chunk
    pub block_count: usize,
    /// Alignment of every payload
    pub alignment: usize,

    /// Add chunks when every block is in use
    pub allow_growth: bool,
    /// Blocks per added chunk
    pub growth_increment: usize,
    /// Upper bound on total blocks; zero means unbounded
    pub max_blocks: usize,

    /// Guard each payload with a leading and trailing canary
    pub use_canary: bool,
    /// Zero the payload when a block is freed
    pub zero_on_free: bool,

    /// Fill patterns for debugging
    pub alloc_pattern: Option<u8>,
    pub dealloc_pattern: Option<u8>,

    /// What to do after corruption or a double free is found
    pub on_corruption: CorruptionPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            block_size: 64,
            block_count: 1024,
            alignment: DEFAULT_ALIGNMENT,
            allow_growth: false,
            growth_increment: 1024,
            max_blocks: 0,
            use_canary: true,
            zero_on_free: false,
            alloc_pattern: if cfg!(debug_assertions) { Some(0xCC) } else { None },
            dealloc_pattern: if cfg!(debug_assertions) { Some(0xDD) } else { None },
            on_corruption: CorruptionPolicy::Report,
        }
    }
}

impl PoolConfig {
    /// Default configuration for `block_count` blocks of `block_size` bytes
    #[must_use]
    pub fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            block_size,
            block_count,
            growth_increment: block_count,
            ..Self::default()
        }
    }

    /// Production configuration - optimized for performance
    #[must_use]
    pub fn production() -> Self {
        Self {
            allow_growth: true,
            use_canary: false,
            alloc_pattern: None,
            dealloc_pattern: None,
            ..Self::default()
        }
    }

    /// Debug configuration - optimized for debugging
    #[must_use]
    pub fn debug() -> Self {
        Self {
            use_canary: true,
            zero_on_free: false,
            alloc_pattern: Some(0xCC),
            dealloc_pattern: Some(0xDD),
            ..Self::default()
        }
    }

    /// Performance configuration - minimal overhead
    #[must_use]
    pub fn performance() -> Self {
        Self {
            use_canary: false,
            alloc_pattern: None,
            dealloc_pattern: None,
            ..Self::default()
        }
    }

    /// Sets block geometry
    #[must_use = "builder methods must be chained or built"]
    pub fn with_blocks(mut self, block_size: usize, block_count: usize) -> Self {
        self.block_size = block_size;
        self.block_count = block_count;
        self
    }

    /// Enables growth in chunks of `increment` blocks up to `max_blocks`
    #[must_use = "builder methods must be chained or built"]
    pub fn with_growth(mut self, increment: usize, max_blocks: usize) -> Self {
        self.allow_growth = true;
        self.growth_increment = increment;
        self.max_blocks = max_blocks;
        self
    }

    /// Sets the name used in logs and reports
    #[must_use = "builder methods must be chained or built"]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Rejects inconsistent settings
    pub fn validate(&self) -> MemoryResult<()> {
        if self.block_size == 0 {
            return Err(MemoryError::invalid_config("block_size cannot be zero"));
        }
        if self.block_count == 0 {
            return Err(MemoryError::invalid_config("block_count cannot be zero"));
        }
        if !is_power_of_two(self.alignment)
            || !(MIN_ALIGNMENT..=MAX_ALIGNMENT).contains(&self.alignment)
        {
            return Err(MemoryError::invalid_config(
                "alignment must be a power of two between pointer size and 4096",
            ));
        }
        if self.allow_growth && self.growth_increment == 0 {
            return Err(MemoryError::invalid_config(
                "growth_increment must be non-zero when growth is allowed",
            ));
        }
        if self.max_blocks != 0 && self.block_count > self.max_blocks {
            return Err(MemoryError::invalid_config(
                "block_count exceeds max_blocks",
            ));
        }
        if self.block_count > u32::MAX as usize || self.growth_increment > u32::MAX as usize {
            return Err(MemoryError::invalid_config("too many blocks per chunk"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(PoolConfig::production().validate().is_ok());
        assert!(PoolConfig::debug().validate().is_ok());
        assert!(PoolConfig::performance().validate().is_ok());
        assert!(PoolConfig::new(64, 4).validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        assert!(PoolConfig::new(0, 4).validate().is_err());
        assert!(PoolConfig::new(64, 0).validate().is_err());
        assert!(PoolConfig::new(64, 8).with_growth(8, 4).validate().is_err());

        let config = PoolConfig {
            alignment: 2,
            ..PoolConfig::new(64, 4)
        };
        assert!(config.validate().is_err());
    }
}
