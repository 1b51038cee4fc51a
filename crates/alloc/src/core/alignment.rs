//! Alignment arithmetic shared by every allocator
//!
//! All helpers take alignments that must be powers of two; the `const`
//! helpers `debug_assert!` this and the checked helpers return
//! [`MemoryError::InvalidAlignment`](crate::error::MemoryError) instead.

use crate::error::{MemoryError, MemoryResult};

/// Default alignment used when callers have no stronger requirement
pub const DEFAULT_ALIGNMENT: usize = 16;

/// Smallest alignment accepted by the allocators (pointer width)
pub const MIN_ALIGNMENT: usize = core::mem::size_of::<usize>();

/// Largest alignment accepted by the allocators
pub const MAX_ALIGNMENT: usize = 4096;

/// Cache line size assumed for arena base alignment
pub const CACHE_LINE_SIZE: usize = 64;

/// Page size used when the platform cannot be queried
pub const PAGE_SIZE: usize = 4096;

/// Returns true if `value` is a non-zero power of two
///
/// # Examples
/// ```
/// use nebula_alloc::core::alignment::is_power_of_two;
///
/// assert!(is_power_of_two(16));
/// assert!(!is_power_of_two(0));
/// assert!(!is_power_of_two(24));
/// ```
#[inline(always)]
pub const fn is_power_of_two(value: usize) -> bool {
    value != 0 && value & (value - 1) == 0
}

/// Aligns a value up to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use nebula_alloc::core::alignment::align_up;
///
/// assert_eq!(align_up(7, 8), 8);
/// assert_eq!(align_up(8, 8), 8);
/// assert_eq!(align_up(9, 8), 16);
/// ```
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(is_power_of_two(alignment));
    (value + alignment - 1) & !(alignment - 1)
}

/// Overflow-checked [`align_up`]
#[inline]
pub const fn checked_align_up(value: usize, alignment: usize) -> Option<usize> {
    match value.checked_add(alignment - 1) {
        Some(bumped) => Some(bumped & !(alignment - 1)),
        None => None,
    }
}

/// Aligns a value down to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use nebula_alloc::core::alignment::align_down;
///
/// assert_eq!(align_down(7, 8), 0);
/// assert_eq!(align_down(9, 8), 8);
/// ```
#[inline(always)]
pub const fn align_down(value: usize, alignment: usize) -> usize {
    debug_assert!(is_power_of_two(alignment));
    value & !(alignment - 1)
}

/// Checks if a value is aligned to the given alignment
#[inline(always)]
pub const fn is_aligned(value: usize, alignment: usize) -> bool {
    debug_assert!(is_power_of_two(alignment));
    value & (alignment - 1) == 0
}

/// Calculates padding needed to align a value
#[inline(always)]
pub const fn padding_needed(value: usize, alignment: usize) -> usize {
    align_up(value, alignment) - value
}

/// Check if a pointer is properly aligned
#[inline(always)]
pub fn is_aligned_ptr<T>(ptr: *const T, alignment: usize) -> bool {
    is_aligned(ptr as usize, alignment)
}

/// Aligns a pointer up, preserving its provenance
///
/// # Safety
///
/// The aligned pointer must stay inside the allocation `ptr` points into;
/// the caller has to have checked that `padding_needed(ptr, alignment)`
/// bytes are available.
#[inline]
pub unsafe fn align_ptr(ptr: *mut u8, alignment: usize) -> *mut u8 {
    let padding = padding_needed(ptr as usize, alignment);
    // SAFETY: Offsetting within the same allocation.
    // - Caller guarantees `padding` bytes are in bounds
    unsafe { ptr.add(padding) }
}

/// Validates an alignment request
///
/// Accepts powers of two between [`MIN_ALIGNMENT`] and [`MAX_ALIGNMENT`].
pub fn validate_alignment(alignment: usize) -> MemoryResult<usize> {
    if !is_power_of_two(alignment) || !(MIN_ALIGNMENT..=MAX_ALIGNMENT).contains(&alignment) {
        return Err(MemoryError::invalid_alignment(alignment));
    }
    Ok(alignment)
}

/// Validates an allocation size
pub fn validate_size(size: usize) -> MemoryResult<usize> {
    if size == 0 {
        return Err(MemoryError::invalid_size(0, "zero-sized allocation"));
    }
    if size > isize::MAX as usize - MAX_ALIGNMENT {
        return Err(MemoryError::invalid_size(size, "exceeds isize::MAX"));
    }
    Ok(size)
}

/// Get system page size
///
/// Queries the platform on unix targets and falls back to [`PAGE_SIZE`].
#[inline]
pub fn page_size() -> usize {
    #[cfg(all(unix, feature = "std"))]
    {
        // SAFETY: sysconf has no memory-safety preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 && is_power_of_two(size as usize) {
            return size as usize;
        }
    }
    PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_of_two() {
        for shift in 0..usize::BITS - 1 {
            assert!(is_power_of_two(1 << shift));
        }
        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(3));
        assert!(!is_power_of_two(usize::MAX));
    }

    #[test]
    fn test_align_up_down() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(100, 16), 112);
        assert_eq!(align_down(100, 16), 96);
        assert_eq!(padding_needed(100, 16), 12);
        assert!(is_aligned(4096, 4096));
        assert!(!is_aligned(4095, 4096));
    }

    #[test]
    fn test_checked_align_up_overflow() {
        assert_eq!(checked_align_up(usize::MAX, 16), None);
        assert_eq!(checked_align_up(17, 16), Some(32));
    }

    #[test]
    fn test_validate_alignment() {
        assert!(validate_alignment(DEFAULT_ALIGNMENT).is_ok());
        assert!(validate_alignment(MIN_ALIGNMENT).is_ok());
        assert!(validate_alignment(MIN_ALIGNMENT / 2).is_err());
        assert!(validate_alignment(24).unwrap_err().is_invalid_alignment());
        assert!(validate_alignment(MAX_ALIGNMENT * 2).is_err());
    }

    #[test]
    fn test_validate_size() {
        assert!(validate_size(1).is_ok());
        assert!(validate_size(0).is_err());
        assert!(validate_size(usize::MAX).is_err());
    }

    #[test]
    fn test_align_ptr() {
        let mut buffer = [0u8; 64];
        let base = buffer.as_mut_ptr();
        let aligned = unsafe { align_ptr(base, 16) };
        assert!(is_aligned_ptr(aligned, 16));
        assert!((aligned as usize) - (base as usize) < 16);
    }

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(is_power_of_two(page_size()));
    }
}
