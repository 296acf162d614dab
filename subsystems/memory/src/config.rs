//! # Memory Configuration
//!
//! Construction parameters for buffer pools and staging buffers.

use zrl_core::{is_power_of_two, ByteSize, DeviceSize, Error, Result};

use crate::region::RegionFlags;

// =============================================================================
// POOL CONFIGURATION
// =============================================================================

/// Buffer pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Pool name for logs
    pub name: &'static str,
    /// Region size, a power of two
    pub total_size: ByteSize,
    /// Smallest block, a power of two no larger than `total_size`
    pub min_block_size: ByteSize,
    /// Backing region properties
    pub flags: RegionFlags,
}

impl PoolConfig {
    /// Create a device-local pool config
    pub const fn new(name: &'static str, total_size: ByteSize, min_block_size: ByteSize) -> Self {
        Self {
            name,
            total_size,
            min_block_size,
            flags: RegionFlags::DEVICE_LOCAL,
        }
    }

    /// Pool config for uniform buffers, host mapped
    pub const fn uniform_buffer(total_size: ByteSize) -> Self {
        Self {
            name: "uniform_pool",
            total_size,
            // Vulkan min uniform buffer alignment
            min_block_size: ByteSize::from_bytes(256),
            flags: RegionFlags::host_mapped(),
        }
    }

    /// Pool config for vertex data
    pub const fn vertex_buffer(total_size: ByteSize) -> Self {
        Self {
            name: "vertex_pool",
            total_size,
            min_block_size: ByteSize::from_kib(1),
            flags: RegionFlags::DEVICE_LOCAL,
        }
    }

    /// Pool config for index data
    pub const fn index_buffer(total_size: ByteSize) -> Self {
        Self {
            name: "index_pool",
            total_size,
            min_block_size: ByteSize::from_bytes(256),
            flags: RegionFlags::DEVICE_LOCAL,
        }
    }

    /// Replace the region flags
    pub const fn with_flags(mut self, flags: RegionFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Keep the region host mapped
    pub const fn mapped(self) -> Self {
        let flags = self.flags.union(RegionFlags::host_mapped());
        self.with_flags(flags)
    }

    /// Whether the pool's region will be host mapped
    pub fn is_mapped(&self) -> bool {
        self.flags.contains(RegionFlags::MAPPED)
    }

    /// Check the size constraints
    pub fn validate(&self) -> Result<()> {
        let total = self.total_size.as_bytes();
        let min = self.min_block_size.as_bytes();

        if !is_power_of_two(total) || !is_power_of_two(min) || min > total {
            return Err(Error::InvalidSize);
        }
        Ok(())
    }
}

// =============================================================================
// STAGING CONFIGURATION
// =============================================================================

/// Staging buffer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingConfig {
    /// Capacity in bytes
    pub capacity: ByteSize,
    /// Alignment the cursor advances to after each push
    pub push_alignment: DeviceSize,
    /// Granularity of flushed ranges (the device's non-coherent atom size)
    pub non_coherent_atom_size: DeviceSize,
}

impl StagingConfig {
    /// Default cursor alignment
    pub const PUSH_ALIGNMENT: DeviceSize = 16;
    /// Default flush granularity
    pub const NON_COHERENT_ATOM_SIZE: DeviceSize = 64;

    /// Create a staging config with default alignments
    pub const fn new(capacity: ByteSize) -> Self {
        Self {
            capacity,
            push_alignment: Self::PUSH_ALIGNMENT,
            non_coherent_atom_size: Self::NON_COHERENT_ATOM_SIZE,
        }
    }

    /// Use the device's non-coherent atom size
    pub const fn with_atom_size(mut self, atom: DeviceSize) -> Self {
        self.non_coherent_atom_size = atom;
        self
    }

    /// Check the size constraints
    pub fn validate(&self) -> Result<()> {
        if !self.capacity.is_power_of_two() {
            return Err(Error::InvalidSize);
        }
        if !is_power_of_two(self.push_alignment) || self.non_coherent_atom_size == 0 {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}
