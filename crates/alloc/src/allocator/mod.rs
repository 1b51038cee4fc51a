//! Allocation strategies
//!
//! ## Modules
//! - `traits` - The [`Allocator`] contract every strategy implements
//! - `hooks` - Observers notified after successful operations
//! - `linear` - Bump allocator with rewindable markers and scopes
//! - `stack` - LIFO allocator with markers and named frames
//! - `pool` - Fixed-size block pool with corruption detection

pub mod hooks;
pub mod linear;
pub mod pool;
pub mod stack;
pub mod traits;

pub use hooks::{AllocationObserver, AllocatorHooks, CallbackObserver};
pub use linear::{LinearAllocator, LinearConfig, LinearMarker, LinearScope};
pub use pool::{MemoryPool, MemoryPoolStats, PoolConfig};
pub use stack::{MarkerId, StackAllocator, StackConfig, StackFrame, StackScope};
pub use traits::Allocator;

pub use crate::error::{AllocError, AllocResult};

use crate::core::alignment::{validate_alignment, validate_size};
use crate::core::{AllocationFlags, CorruptionPolicy};
use crate::error::{MemoryError, MemoryResult};
use crate::logging::{LogLevel, MemoryEvent, MemoryLogger};

/// Validates an allocation request, returning the effective alignment
///
/// `ALIGN_*` flags can only raise the requested alignment.
pub(crate) fn resolve_request(
    size: usize,
    alignment: usize,
    flags: AllocationFlags,
) -> MemoryResult<usize> {
    validate_size(size)?;
    validate_alignment(alignment)?;
    let flags = flags.validate()?;
    Ok(flags.effective_alignment(alignment))
}

/// Logs an integrity finding, then applies the configured policy
pub(crate) fn report_corruption(
    logger: &dyn MemoryLogger,
    source: &str,
    policy: CorruptionPolicy,
    error: &MemoryError,
) {
    logger.log(
        &MemoryEvent::new(error_event(error), source, LogLevel::Error, error.to_string())
            .with_data("code", error.code()),
    );

    match policy {
        CorruptionPolicy::Report => {}
        CorruptionPolicy::Panic => panic!("{source}: {error}"),
        CorruptionPolicy::Abort => std::process::abort(),
    }
}

/// Logs a failed request at warning level
pub(crate) fn report_failure(logger: &dyn MemoryLogger, source: &str, error: &MemoryError) {
    if logger.enabled(LogLevel::Warn) {
        logger.log(
            &MemoryEvent::new(error_event(error), source, LogLevel::Warn, error.to_string())
                .with_data("code", error.code()),
        );
    }
}

fn error_event(error: &MemoryError) -> &'static str {
    match error {
        MemoryError::OutOfMemory { .. } => "out_of_memory",
        MemoryError::DoubleFree { .. } => "double_free",
        MemoryError::InvalidPointer { .. } => "invalid_pointer",
        MemoryError::Corruption { .. } => "corruption",
        MemoryError::StackOverflow { .. } => "stack_overflow",
        MemoryError::StackUnderflow { .. } => "stack_underflow",
        MemoryError::DeallocationFailed { .. } => "deallocation_failed",
        MemoryError::LeakDetected { .. } => "leak",
        _ => "allocation_failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::RecordingLogger;

    #[test]
    fn test_resolve_request() {
        assert_eq!(resolve_request(8, 8, AllocationFlags::empty()).unwrap(), 8);
        assert_eq!(resolve_request(8, 8, AllocationFlags::ALIGN_64).unwrap(), 64);
        assert_eq!(resolve_request(8, 128, AllocationFlags::ALIGN_16).unwrap(), 128);

        assert!(matches!(
            resolve_request(0, 8, AllocationFlags::empty()),
            Err(MemoryError::InvalidSize { .. })
        ));
        assert!(matches!(
            resolve_request(8, 3, AllocationFlags::empty()),
            Err(MemoryError::InvalidAlignment { .. })
        ));
        assert!(matches!(
            resolve_request(8, 1, AllocationFlags::empty()),
            Err(MemoryError::InvalidAlignment { .. })
        ));
        assert!(matches!(
            resolve_request(8, 8, AllocationFlags::TEMPORARY | AllocationFlags::PERSISTENT),
            Err(MemoryError::InvalidFlags { .. })
        ));
    }

    #[test]
    fn test_report_corruption_logs() {
        let logger = RecordingLogger::new();
        report_corruption(
            &logger,
            "pool",
            CorruptionPolicy::Report,
            &MemoryError::double_free(0x40),
        );
        assert_eq!(logger.count("double_free"), 1);
        assert_eq!(logger.count_level(LogLevel::Error), 1);
    }

    #[test]
    #[should_panic(expected = "Double free")]
    fn test_report_corruption_panic_policy() {
        let logger = RecordingLogger::new();
        report_corruption(
            &logger,
            "pool",
            CorruptionPolicy::Panic,
            &MemoryError::double_free(0x40),
        );
    }
}
