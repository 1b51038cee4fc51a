//! Tracker configuration

use core::time::Duration;

use crate::core::CorruptionPolicy;
use crate::error::{MemoryError, MemoryResult};

/// Configuration for [`MemoryTracker`](super::MemoryTracker)
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Name used in logs and reports
    pub name: String,

    /// Capture return addresses for every tracked allocation
    ///
    /// Requires a [`CallStackCapturer`](super::CallStackCapturer).
    pub capture_call_stacks: bool,
    /// Frames kept per captured call stack
    pub max_stack_depth: usize,

    /// Live records kept at most; further allocations go untracked
    pub max_tracked_allocations: usize,
    /// Freed records kept for double-free detection and lifetime analysis
    pub freed_history: usize,

    /// Record the allocating thread
    pub track_threads: bool,
    /// Allocations freed sooner than this count as short-lived
    pub short_lived_threshold: Duration,
    /// Entries in top-N lists of reports
    pub top_n: usize,

    /// Log a leak report when the tracker is destroyed
    pub report_leaks_on_destroy: bool,

    /// What to do after corruption or a double free is found
    pub on_corruption: CorruptionPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            name: "tracker".to_string(),
            capture_call_stacks: false,
            max_stack_depth: 32,
            max_tracked_allocations: 100_000,
            freed_history: 1024,
            track_threads: true,
            short_lived_threshold: Duration::from_millis(1),
            top_n: 10,
            report_leaks_on_destroy: true,
            on_corruption: CorruptionPolicy::Report,
        }
    }
}

impl TrackerConfig {
    /// Production configuration - bookkeeping only
    #[must_use]
    pub fn production() -> Self {
        Self {
            capture_call_stacks: false,
            freed_history: 256,
            track_threads: false,
            ..Self::default()
        }
    }

    /// Debug configuration - capture everything
    #[must_use]
    pub fn debug() -> Self {
        Self {
            capture_call_stacks: true,
            max_stack_depth: 64,
            freed_history: 16 * 1024,
            ..Self::default()
        }
    }

    /// Performance configuration - minimal overhead
    #[must_use]
    pub fn performance() -> Self {
        Self {
            capture_call_stacks: false,
            freed_history: 0,
            track_threads: false,
            report_leaks_on_destroy: false,
            ..Self::default()
        }
    }

    /// Sets the name used in logs and reports
    #[must_use = "builder methods must be chained or built"]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Rejects inconsistent settings
    pub fn validate(&self) -> MemoryResult<()> {
        if self.max_tracked_allocations == 0 {
            return Err(MemoryError::invalid_config(
                "max_tracked_allocations cannot be zero",
            ));
        }
        if self.capture_call_stacks && self.max_stack_depth == 0 {
            return Err(MemoryError::invalid_config(
                "max_stack_depth must be non-zero when capturing call stacks",
            ));
        }
        if self.top_n == 0 {
            return Err(MemoryError::invalid_config("top_n cannot be zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(TrackerConfig::default().validate().is_ok());
        assert!(TrackerConfig::production().validate().is_ok());
        assert!(TrackerConfig::debug().validate().is_ok());
        assert!(TrackerConfig::performance().validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = TrackerConfig {
            max_tracked_allocations: 0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TrackerConfig {
            capture_call_stacks: true,
            max_stack_depth: 0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
