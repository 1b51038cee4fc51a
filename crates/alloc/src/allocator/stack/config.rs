//! Stack allocator configuration

use crate::core::CorruptionPolicy;
use crate::error::{MemoryError, MemoryResult};

/// Configuration for stack allocator
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Name used in logs and reports
    pub name: String,

    /// Maximum number of markers (frames included) on the marker stack
    pub max_stack_depth: usize,

    /// Replace the buffer with a larger one when a request overflows
    ///
    /// Only attempted while the stack holds no allocation.
    pub allow_growth: bool,
    /// Minimum number of bytes added per growth step
    pub growth_increment: usize,
    /// Upper bound for the buffer size; zero means unbounded
    pub max_capacity: usize,

    /// Check the header canary before every individual deallocation
    pub validate_on_deallocate: bool,
    /// Zero released ranges on pop and reset
    pub zero_on_pop: bool,

    /// Fill patterns for debugging
    pub alloc_pattern: Option<u8>,
    pub dealloc_pattern: Option<u8>,

    /// What to do after a header mismatch is found
    pub on_corruption: CorruptionPolicy,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            name: "stack".to_string(),
            max_stack_depth: 64,
            allow_growth: false,
            growth_increment: 64 * 1024,
            max_capacity: 0,
            validate_on_deallocate: true,
            zero_on_pop: false,
            alloc_pattern: if cfg!(debug_assertions) { Some(0xCC) } else { None },
            dealloc_pattern: if cfg!(debug_assertions) { Some(0xDD) } else { None },
            on_corruption: CorruptionPolicy::Report,
        }
    }
}

impl StackConfig {
    /// Production configuration - optimized for performance
    #[must_use]
    pub fn production() -> Self {
        Self {
            max_stack_depth: 256,
            alloc_pattern: None,
            dealloc_pattern: None,
            ..Self::default()
        }
    }

    /// Debug configuration - optimized for debugging
    #[must_use]
    pub fn debug() -> Self {
        Self {
            validate_on_deallocate: true,
            alloc_pattern: Some(0xCC),
            dealloc_pattern: Some(0xDD),
            ..Self::default()
        }
    }

    /// Performance configuration - minimal overhead
    #[must_use]
    pub fn performance() -> Self {
        Self {
            validate_on_deallocate: false,
            alloc_pattern: None,
            dealloc_pattern: None,
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
        if self.max_stack_depth == 0 {
            return Err(MemoryError::invalid_config(
                "max_stack_depth must be at least one",
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
        assert!(StackConfig::default().validate().is_ok());
        assert!(StackConfig::production().validate().is_ok());
        assert!(StackConfig::debug().validate().is_ok());
        assert!(!StackConfig::performance().validate_on_deallocate);

        let config = StackConfig {
            max_stack_depth: 0,
            ..StackConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(StackConfig::default().with_growth(0, 0).validate().is_err());
        assert!(StackConfig::default().with_growth(1024, 4096).validate().is_ok());
    }
}
