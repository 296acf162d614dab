//! # Memory Regions
//!
//! Fixed-size backing storage that the allocators partition.
//!
//! A region is a contiguous span of bytes addressed by offset. The device
//! layer decides what memory actually backs it; the allocators only ever
//! see a size and, when the region is host mapped, byte-level access.

use alloc::boxed::Box;
use alloc::vec;
use core::ops::Range;

use zrl_core::{is_power_of_two, DeviceSize, Error, Result};

// =============================================================================
// REGION FLAGS
// =============================================================================

bitflags::bitflags! {
    /// Region property flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegionFlags: u32 {
        /// Memory is device-local
        const DEVICE_LOCAL = 1 << 0;
        /// Memory is host-visible
        const HOST_VISIBLE = 1 << 1;
        /// Host writes need no explicit flush
        const HOST_COHERENT = 1 << 2;
        /// Memory is host-cached
        const HOST_CACHED = 1 << 3;
        /// Region keeps a host mapping for its whole lifetime
        const MAPPED = 1 << 4;
    }
}

impl RegionFlags {
    /// Flags for a host-visible, persistently mapped region
    pub const fn host_mapped() -> Self {
        Self::HOST_VISIBLE.union(Self::MAPPED)
    }
}

// =============================================================================
// REGION TRAIT
// =============================================================================

/// Backing storage of known, fixed size
///
/// Implementors are supplied by whatever owns the real memory. Offsets are
/// always relative to the start of the region.
pub trait MemoryRegion {
    /// Total capacity in bytes
    fn size(&self) -> DeviceSize;

    /// Region properties
    fn flags(&self) -> RegionFlags;

    /// Host-addressable bytes `offset..offset + len`
    fn mapped_range_mut(&mut self, offset: DeviceSize, len: usize) -> Result<&mut [u8]>;

    /// Host-addressable bytes `offset..offset + len`, read-only
    fn mapped_range(&self, offset: DeviceSize, len: usize) -> Result<&[u8]>;

    /// Whether host access is legal
    fn is_mapped(&self) -> bool {
        self.flags().contains(RegionFlags::MAPPED)
    }

    /// Copy `src` into the region at `offset`
    fn write_bytes(&mut self, offset: DeviceSize, src: &[u8]) -> Result<()> {
        self.mapped_range_mut(offset, src.len())?.copy_from_slice(src);
        Ok(())
    }

    /// Copy bytes at `offset` into `dst`
    fn read_bytes(&self, offset: DeviceSize, dst: &mut [u8]) -> Result<()> {
        dst.copy_from_slice(self.mapped_range(offset, dst.len())?);
        Ok(())
    }
}

/// A borrowed region, so a cursor can be layered over memory a pool owns
impl<R: MemoryRegion + ?Sized> MemoryRegion for &mut R {
    fn size(&self) -> DeviceSize {
        (**self).size()
    }

    fn flags(&self) -> RegionFlags {
        (**self).flags()
    }

    fn mapped_range_mut(&mut self, offset: DeviceSize, len: usize) -> Result<&mut [u8]> {
        (**self).mapped_range_mut(offset, len)
    }

    fn mapped_range(&self, offset: DeviceSize, len: usize) -> Result<&[u8]> {
        (**self).mapped_range(offset, len)
    }
}

// =============================================================================
// HOST REGION
// =============================================================================

/// Region backed by a heap allocation
///
/// Storage only exists when the region is created with
/// [`RegionFlags::MAPPED`]; an unmapped region is pure address space.
#[derive(Debug)]
pub struct HostRegion {
    /// Total size
    size: DeviceSize,
    /// Region flags
    flags: RegionFlags,
    /// Host storage, present when mapped
    storage: Option<Box<[u8]>>,
}

impl HostRegion {
    /// Create a zero-filled region of `size` bytes
    ///
    /// `size` must be a power of two.
    pub fn new(size: DeviceSize, flags: RegionFlags) -> Result<Self> {
        if !is_power_of_two(size) {
            return Err(Error::InvalidSize);
        }

        let storage = if flags.contains(RegionFlags::MAPPED) {
            let len = usize::try_from(size).map_err(|_| Error::InvalidSize)?;
            Some(vec![0u8; len].into_boxed_slice())
        } else {
            None
        };

        Ok(Self {
            size,
            flags,
            storage,
        })
    }

    /// Create a host-visible, mapped region
    pub fn mapped(size: DeviceSize) -> Result<Self> {
        Self::new(size, RegionFlags::host_mapped())
    }

    /// Create a region without host storage
    pub fn unmapped(size: DeviceSize) -> Result<Self> {
        Self::new(size, RegionFlags::DEVICE_LOCAL)
    }

    /// Translate a byte range into slice indices
    fn host_range(&self, offset: DeviceSize, len: usize) -> Result<Range<usize>> {
        let end = offset
            .checked_add(len as DeviceSize)
            .ok_or(Error::BufferOverflow)?;
        if end > self.size {
            return Err(Error::BufferOverflow);
        }
        Ok(offset as usize..end as usize)
    }
}

impl MemoryRegion for HostRegion {
    fn size(&self) -> DeviceSize {
        self.size
    }

    fn flags(&self) -> RegionFlags {
        self.flags
    }

    fn mapped_range_mut(&mut self, offset: DeviceSize, len: usize) -> Result<&mut [u8]> {
        let range = self.host_range(offset, len)?;
        let storage = self.storage.as_deref_mut().ok_or(Error::NotMapped)?;
        Ok(&mut storage[range])
    }

    fn mapped_range(&self, offset: DeviceSize, len: usize) -> Result<&[u8]> {
        let range = self.host_range(offset, len)?;
        let storage = self.storage.as_deref().ok_or(Error::NotMapped)?;
        Ok(&storage[range])
    }
}
