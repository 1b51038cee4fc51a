//! Standalone error types for nebula-alloc
//!
//! Uses thiserror for clean, idiomatic Rust error definitions. Every
//! allocator operation reports failure through [`MemoryError`]; nothing in
//! this crate panics on an expected failure such as exhaustion.

use thiserror::Error;

// ============================================================================
// Error kinds
// ============================================================================

/// Coarse classification of a [`MemoryError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OutOfMemory,
    InvalidSize,
    InvalidAlignment,
    InvalidFlags,
    AllocationFailed,
    DeallocationFailed,
    CorruptionDetected,
    DoubleFree,
    InvalidPointer,
    LeakDetected,
    StackOverflow,
    StackUnderflow,
    InvalidConfig,
    InvalidState,
    ReportFailed,
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::InvalidSize => "INVALID_SIZE",
            Self::InvalidAlignment => "INVALID_ALIGNMENT",
            Self::InvalidFlags => "INVALID_FLAGS",
            Self::AllocationFailed => "ALLOCATION_FAILED",
            Self::DeallocationFailed => "DEALLOCATION_FAILED",
            Self::CorruptionDetected => "CORRUPTION_DETECTED",
            Self::DoubleFree => "DOUBLE_FREE",
            Self::InvalidPointer => "INVALID_POINTER",
            Self::LeakDetected => "LEAK_DETECTED",
            Self::StackOverflow => "STACK_OVERFLOW",
            Self::StackUnderflow => "STACK_UNDERFLOW",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::InvalidState => "INVALID_STATE",
            Self::ReportFailed => "REPORT_FAILED",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Main Error Type
// ============================================================================

/// Memory management errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Allocation Errors ---
    #[error("Out of memory: requested {requested} bytes, {available} bytes available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("Invalid allocation size {size}: {reason}")]
    InvalidSize { size: usize, reason: String },

    #[error("Invalid alignment: {alignment}")]
    InvalidAlignment { alignment: usize },

    #[error("Invalid allocation flags {flags:#x}: {reason}")]
    InvalidFlags { flags: u32, reason: String },

    #[error("Memory allocation failed: {size} bytes with {align} byte alignment ({reason})")]
    AllocationFailed {
        size: usize,
        align: usize,
        reason: String,
    },

    // --- Deallocation Errors ---
    #[error("Deallocation failed at {address:#x}: {reason}")]
    DeallocationFailed { address: usize, reason: String },

    #[error("Double free detected at {address:#x}")]
    DoubleFree { address: usize },

    #[error("Invalid pointer {address:#x}: not owned by {component}")]
    InvalidPointer { address: usize, component: String },

    // --- Diagnostics ---
    #[error("Memory corruption detected in {component}: {details}")]
    Corruption { component: String, details: String },

    #[error("Memory leak detected: {count} allocations, {bytes} bytes")]
    LeakDetected { count: usize, bytes: usize },

    // --- Stack Errors ---
    #[error("Stack overflow: requested {requested} bytes, {available} bytes available")]
    StackOverflow { requested: usize, available: usize },

    #[error("Stack underflow: {reason}")]
    StackUnderflow { reason: String },

    // --- Setup Errors ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("Failed to write report to '{path}': {reason}")]
    ReportFailed { path: String, reason: String },
}

impl MemoryError {
    /// Classification of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::InvalidSize { .. } => ErrorKind::InvalidSize,
            Self::InvalidAlignment { .. } => ErrorKind::InvalidAlignment,
            Self::InvalidFlags { .. } => ErrorKind::InvalidFlags,
            Self::AllocationFailed { .. } => ErrorKind::AllocationFailed,
            Self::DeallocationFailed { .. } => ErrorKind::DeallocationFailed,
            Self::DoubleFree { .. } => ErrorKind::DoubleFree,
            Self::InvalidPointer { .. } => ErrorKind::InvalidPointer,
            Self::Corruption { .. } => ErrorKind::CorruptionDetected,
            Self::LeakDetected { .. } => ErrorKind::LeakDetected,
            Self::StackOverflow { .. } => ErrorKind::StackOverflow,
            Self::StackUnderflow { .. } => ErrorKind::StackUnderflow,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::ReportFailed { .. } => ErrorKind::ReportFailed,
        }
    }

    /// Check if error is retryable
    ///
    /// Exhaustion may clear once other allocations are released; every
    /// other failure is a caller or integrity problem.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::OutOfMemory { .. } | Self::StackOverflow { .. }
        )
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => "MEM:ALLOC:OOM",
            Self::InvalidSize { .. } => "MEM:ALLOC:SIZE",
            Self::InvalidAlignment { .. } => "MEM:ALLOC:ALIGN",
            Self::InvalidFlags { .. } => "MEM:ALLOC:FLAGS",
            Self::AllocationFailed { .. } => "MEM:ALLOC:FAILED",
            Self::DeallocationFailed { .. } => "MEM:DEALLOC:FAILED",
            Self::DoubleFree { .. } => "MEM:DEALLOC:DOUBLE_FREE",
            Self::InvalidPointer { .. } => "MEM:DEALLOC:INVALID_PTR",
            Self::Corruption { .. } => "MEM:SYSTEM:CORRUPTION",
            Self::LeakDetected { .. } => "MEM:SYSTEM:LEAK",
            Self::StackOverflow { .. } => "MEM:STACK:OVERFLOW",
            Self::StackUnderflow { .. } => "MEM:STACK:UNDERFLOW",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::InvalidState { .. } => "MEM:SYSTEM:STATE",
            Self::ReportFailed { .. } => "MEM:REPORT:IO",
        }
    }

    // ============================================================================
    // Convenience Constructors - Allocation Errors
    // ============================================================================

    /// Create out of memory error
    #[must_use]
    pub fn out_of_memory(requested: usize, available: usize) -> Self {
        Self::OutOfMemory {
            requested,
            available,
        }
    }

    /// Create invalid size error
    pub fn invalid_size(size: usize, reason: &str) -> Self {
        Self::InvalidSize {
            size,
            reason: reason.to_string(),
        }
    }

    /// Create invalid alignment error
    #[must_use]
    pub fn invalid_alignment(alignment: usize) -> Self {
        Self::InvalidAlignment { alignment }
    }

    /// Create invalid flags error
    pub fn invalid_flags(flags: u32, reason: &str) -> Self {
        Self::InvalidFlags {
            flags,
            reason: reason.to_string(),
        }
    }

    /// Create allocation failed error
    pub fn allocation_failed(size: usize, align: usize, reason: &str) -> Self {
        Self::AllocationFailed {
            size,
            align,
            reason: reason.to_string(),
        }
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        Self::InvalidSize {
            size: usize::MAX,
            reason: format!("size overflow during {operation}"),
        }
    }

    // --- Deallocation Errors ---

    /// Create deallocation failed error
    pub fn deallocation_failed(address: usize, reason: &str) -> Self {
        Self::DeallocationFailed {
            address,
            reason: reason.to_string(),
        }
    }

    /// Create double free error
    #[must_use]
    pub fn double_free(address: usize) -> Self {
        Self::DoubleFree { address }
    }

    /// Create invalid pointer error
    pub fn invalid_pointer(address: usize, component: &str) -> Self {
        Self::InvalidPointer {
            address,
            component: component.to_string(),
        }
    }

    // --- Diagnostics ---

    /// Create memory corruption error
    pub fn corruption(component: &str, details: &str) -> Self {
        Self::Corruption {
            component: component.to_string(),
            details: details.to_string(),
        }
    }

    /// Create leak detected error
    #[must_use]
    pub fn leak_detected(count: usize, bytes: usize) -> Self {
        Self::LeakDetected { count, bytes }
    }

    // --- Stack Errors ---

    /// Create stack overflow error
    #[must_use]
    pub fn stack_overflow(requested: usize, available: usize) -> Self {
        Self::StackOverflow {
            requested,
            available,
        }
    }

    /// Create stack underflow error
    pub fn stack_underflow(reason: &str) -> Self {
        Self::StackUnderflow {
            reason: reason.to_string(),
        }
    }

    // --- Setup Errors ---

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create invalid state error
    pub fn invalid_state(reason: &str) -> Self {
        Self::InvalidState {
            reason: reason.to_string(),
        }
    }

    /// Create report failure error
    pub fn report_failed(path: &std::path::Path, reason: &str) -> Self {
        Self::ReportFailed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Check if this is an invalid alignment error
    #[must_use]
    pub fn is_invalid_alignment(&self) -> bool {
        matches!(self, Self::InvalidAlignment { .. })
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Generic result type alias
pub type Result<T> = MemoryResult<T>;

/// Type aliases for allocator module
pub type AllocError = MemoryError;
pub type AllocResult<T> = MemoryResult<T>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_error_creation() {
        let error = MemoryError::out_of_memory(1024, 8);
        assert!(!error.to_string().is_empty());
        assert!(error.to_string().contains("1024"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            MemoryError::double_free(0x1000).kind(),
            ErrorKind::DoubleFree
        );
        assert_eq!(
            MemoryError::corruption("pool", "bad magic").kind(),
            ErrorKind::CorruptionDetected
        );
        assert_eq!(
            MemoryError::stack_underflow("no markers").kind(),
            ErrorKind::StackUnderflow
        );
        assert_eq!(ErrorKind::OutOfMemory.to_string(), "OUT_OF_MEMORY");
    }

    #[test]
    fn test_error_codes() {
        let error = MemoryError::out_of_memory(1024, 8);
        assert_eq!(error.code(), "MEM:ALLOC:OOM");

        let error = MemoryError::invalid_pointer(0xdead, "pool");
        assert_eq!(error.code(), "MEM:DEALLOC:INVALID_PTR");
    }

    #[test]
    fn test_display_includes_address_in_hex() {
        let error = MemoryError::double_free(0xbeef);
        assert!(error.to_string().contains("0xbeef"));
    }

    #[test]
    fn test_retryable() {
        assert!(MemoryError::out_of_memory(64, 0).is_retryable());
        assert!(MemoryError::stack_overflow(64, 0).is_retryable());
        assert!(!MemoryError::invalid_alignment(3).is_retryable());
        assert!(!MemoryError::double_free(8).is_retryable());
    }
}
