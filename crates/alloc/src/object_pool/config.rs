//! Object pool configuration

use crate::core::CorruptionPolicy;
use crate::error::{MemoryError, MemoryResult};

/// Configuration for [`ObjectPool`](super::ObjectPool)
#[derive(Debug, Clone)]
pub struct ObjectPoolConfig {
    /// Name used in logs and reports
    pub name: String,

    /// Slots reserved at construction
    pub initial_capacity: usize,
    /// Reserve more slots when every slot is in use
    pub allow_growth: bool,
    /// Slots per growth step
    pub growth_increment: usize,
    /// Upper bound on slots; zero means unbounded
    pub max_capacity: usize,

    /// Run the validator hook on every released object
    pub validate_on_release: bool,
    /// Run the destructor hook before a released object is dropped
    ///
    /// The object itself is always dropped.
    pub destruct_on_release: bool,

    /// What to do after a double release is found
    pub on_corruption: CorruptionPolicy,
}

impl Default for ObjectPoolConfig {
    fn default() -> Self {
        Self {
            name: "object_pool".to_string(),
            initial_capacity: 64,
            allow_growth: true,
            growth_increment: 64,
            max_capacity: 0,
            validate_on_release: cfg!(debug_assertions),
            destruct_on_release: true,
            on_corruption: CorruptionPolicy::Report,
        }
    }
}

impl ObjectPoolConfig {
    /// Default configuration with `capacity` pre-reserved slots
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            initial_capacity: capacity,
            growth_increment: capacity.max(1),
            ..Self::default()
        }
    }

    /// Production configuration - optimized for performance
    #[must_use]
    pub fn production() -> Self {
        Self {
            initial_capacity: 1024,
            growth_increment: 1024,
            validate_on_release: false,
            ..Self::default()
        }
    }

    /// Debug configuration - optimized for debugging
    #[must_use]
    pub fn debug() -> Self {
        Self {
            initial_capacity: 16,
            growth_increment: 16,
            validate_on_release: true,
            on_corruption: CorruptionPolicy::Panic,
            ..Self::default()
        }
    }

    /// Performance configuration - minimal overhead
    #[must_use]
    pub fn performance() -> Self {
        Self {
            initial_capacity: 4096,
            allow_growth: false,
            validate_on_release: false,
            destruct_on_release: false,
            ..Self::default()
        }
    }

    /// Caps the pool at `max_capacity` slots, growing `increment` at a time
    #[must_use = "builder methods must be chained or built"]
    pub fn with_growth(mut self, increment: usize, max_capacity: usize) -> Self {
        self.allow_growth = true;
        self.growth_increment = increment;
        self.max_capacity = max_capacity;
        self
    }

    /// Disables growth
    #[must_use = "builder methods must be chained or built"]
    pub fn fixed(mut self) -> Self {
        self.allow_growth = false;
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
        if self.initial_capacity == 0 {
            return Err(MemoryError::invalid_config("initial_capacity cannot be zero"));
        }
        if self.allow_growth && self.growth_increment == 0 {
            return Err(MemoryError::invalid_config(
                "growth_increment must be non-zero when growth is allowed",
            ));
        }
        if self.max_capacity != 0 && self.initial_capacity > self.max_capacity {
            return Err(MemoryError::invalid_config(
                "initial_capacity exceeds max_capacity",
            ));
        }
        Ok(())
    }
}
