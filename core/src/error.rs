//! # ZRL Error Handling
//!
//! One error type for every fallible memory operation.
//!
//! Errors fall into three groups:
//! - configuration errors, fatal to construction
//! - exhaustion, recoverable by freeing and retrying
//! - caller contract violations, reported instead of aborting

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// ZRL Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// ZRL unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Size is zero or not a power of two, or the minimum block size is
    /// larger than the region
    InvalidSize,
    /// Invalid parameter provided
    InvalidParameter,

    // =========================================================================
    // Exhaustion
    // =========================================================================
    /// No free block large enough
    OutOfMemory,

    // =========================================================================
    // Contract Violations
    // =========================================================================
    /// Block is not currently allocated from this allocator
    InvalidBlock,
    /// Host access to a region that has no host mapping
    NotMapped,
    /// Access past the end of a region or block
    BufferOverflow,
    /// A data source could not supply the requested bytes
    ReadFailed,
}

impl Error {
    /// True for errors the caller can recover from by freeing memory
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Error::OutOfMemory)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSize => write!(f, "invalid size"),
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidBlock => write!(f, "invalid block"),
            Self::NotMapped => write!(f, "region is not host mapped"),
            Self::BufferOverflow => write!(f, "buffer overflow"),
            Self::ReadFailed => write!(f, "error reading from source"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Error::OutOfMemory.to_string(), "out of memory");
        assert_eq!(Error::NotMapped.to_string(), "region is not host mapped");
    }

    #[test]
    fn test_recoverable() {
        assert!(Error::OutOfMemory.is_recoverable());
        assert!(!Error::InvalidBlock.is_recoverable());
        assert!(!Error::InvalidSize.is_recoverable());
    }
}
