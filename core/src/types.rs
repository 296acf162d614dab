//! # ZRL Types
//!
//! Size types and the integer helpers the allocators are built on.

use core::fmt;

// =============================================================================
// DEVICE SIZE
// =============================================================================

/// Byte size or byte offset inside a device memory region
pub type DeviceSize = u64;

/// Check that `value` is a non-zero power of two
#[inline]
pub const fn is_power_of_two(value: DeviceSize) -> bool {
    value != 0 && (value & (value - 1)) == 0
}

/// Round `value` up to the next multiple of `alignment`
///
/// `alignment` must be non-zero. It does not have to be a power of two.
#[inline]
pub const fn align_up(value: DeviceSize, alignment: DeviceSize) -> DeviceSize {
    debug_assert!(alignment != 0);
    if is_power_of_two(alignment) {
        let mask = alignment - 1;
        (value + mask) & !mask
    } else {
        value.div_ceil(alignment) * alignment
    }
}

// =============================================================================
// SIZE TYPES
// =============================================================================

/// Size in bytes, used in configuration
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct ByteSize(u64);

impl ByteSize {
    /// Zero size
    pub const ZERO: Self = Self(0);

    /// Create from bytes
    #[inline]
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Create from KiB
    #[inline]
    pub const fn from_kib(kib: u64) -> Self {
        Self(kib * 1024)
    }

    /// Create from MiB
    #[inline]
    pub const fn from_mib(mib: u64) -> Self {
        Self(mib * 1024 * 1024)
    }

    /// Get as bytes
    #[inline]
    pub const fn as_bytes(self) -> u64 {
        self.0
    }

    /// Check for a non-zero power of two
    #[inline]
    pub const fn is_power_of_two(self) -> bool {
        is_power_of_two(self.0)
    }
}

impl fmt::Debug for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1024 * 1024 * 1024 {
            write!(f, "{} GiB", self.0 / (1024 * 1024 * 1024))
        } else if self.0 >= 1024 * 1024 {
            write!(f, "{} MiB", self.0 / (1024 * 1024))
        } else if self.0 >= 1024 {
            write!(f, "{} KiB", self.0 / 1024)
        } else {
            write!(f, "{} B", self.0)
        }
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

static_assertions::assert_impl_all!(ByteSize: Send, Sync, Copy);

#[cfg(test)]
mod tests {
    use alloc::format;

    use super::*;

    #[test]
    fn test_power_of_two() {
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(1024));
        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(96));
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
        // Non power-of-two atoms round to the next multiple
        assert_eq!(align_up(7, 6), 12);
        assert_eq!(align_up(12, 6), 12);
    }

    #[test]
    fn test_byte_size_format() {
        assert_eq!(format!("{}", ByteSize::from_kib(64)), "64 KiB");
        assert_eq!(format!("{}", ByteSize::from_mib(3)), "3 MiB");
        assert_eq!(format!("{}", ByteSize::from_bytes(100)), "100 B");
        assert_eq!(ByteSize::from_mib(1).as_bytes(), 1 << 20);
    }
}
