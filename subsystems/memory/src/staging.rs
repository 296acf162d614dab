//! # Staging Buffer
//!
//! Linear (bump) writer over a host-mapped region, used to stage uploads.
//!
//! ```text
//!   ┌──────┬──┬────────────┬──┬──────┬──────────────────────────┐
//!   │ push │  │    push    │  │ push │        free space        │
//!   └──────┴──┴────────────┴──┴──────┴──────────────────────────┘
//!   0      padding to 16 bytes       ▲                      capacity
//!                                  cursor
//! ```
//!
//! Each push writes at the cursor and moves it forward to the next aligned
//! offset. `flush` hands back the written range, rounded to the device's
//! non-coherent atom size, and rewinds the cursor once the caller has
//! consumed the bytes. Individual pushes are never freed.

use zrl_core::{align_up, DeviceSize, Error, Result};

use crate::config::StagingConfig;
use crate::region::{HostRegion, MemoryRegion};

// =============================================================================
// CURSOR STATE
// =============================================================================

/// Cursor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Nothing written since the last flush
    Idle,
    /// Writes pending a flush
    Accumulating,
}

/// Byte range the device layer has to flush before reading staged data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRange {
    /// Start of the range
    pub offset: DeviceSize,
    /// Length of the range, a multiple of the atom size unless clamped to
    /// the capacity
    pub size: DeviceSize,
}

// =============================================================================
// STAGING BUFFER
// =============================================================================

/// Bump allocator writing into a mapped region
#[derive(Debug)]
pub struct StagingBuffer<R: MemoryRegion = HostRegion> {
    /// Backing region
    region: R,
    /// Next write offset
    cursor: DeviceSize,
    /// Cursor alignment after each push
    push_alignment: DeviceSize,
    /// Flush granularity
    atom_size: DeviceSize,
    /// Pushes since the last flush
    pending_pushes: u32,
}

impl StagingBuffer<HostRegion> {
    /// Create a staging buffer over a fresh host region
    pub fn new(config: &StagingConfig) -> Result<Self> {
        config.validate()?;
        let region = HostRegion::mapped(config.capacity.as_bytes())?;
        Self::with_region(region, config)
    }
}

impl<R: MemoryRegion> StagingBuffer<R> {
    /// Create a staging buffer over a region supplied by the device layer
    ///
    /// The region must be host mapped and exactly `config.capacity` bytes.
    /// Pass `&mut region` to layer the cursor over memory owned elsewhere.
    pub fn with_region(region: R, config: &StagingConfig) -> Result<Self> {
        config.validate()?;
        if region.size() != config.capacity.as_bytes() {
            return Err(Error::InvalidSize);
        }
        if !region.is_mapped() {
            return Err(Error::NotMapped);
        }

        Ok(Self {
            region,
            cursor: 0,
            push_alignment: config.push_alignment,
            atom_size: config.non_coherent_atom_size,
            pending_pushes: 0,
        })
    }

    /// Copy `data` in at the cursor, returning where it landed
    pub fn push_data(&mut self, data: &[u8]) -> Result<DeviceSize> {
        self.push_with(data.len(), |dst| dst.copy_from_slice(data))
    }

    /// Reserve `len` bytes at the cursor and let `fill` write them in place
    pub fn push_with<F>(&mut self, len: usize, fill: F) -> Result<DeviceSize>
    where
        F: FnOnce(&mut [u8]),
    {
        self.try_push_with(len, |dst| {
            fill(dst);
            Ok(())
        })
    }

    /// Like [`push_with`](Self::push_with), but `fill` may fail
    ///
    /// On failure the cursor does not move.
    pub fn try_push_with<F>(&mut self, len: usize, fill: F) -> Result<DeviceSize>
    where
        F: FnOnce(&mut [u8]) -> Result<()>,
    {
        if len == 0 {
            return Err(Error::InvalidSize);
        }

        let offset = self.cursor;
        let end = offset
            .checked_add(len as DeviceSize)
            .filter(|&end| end <= self.region.size())
            .ok_or(Error::BufferOverflow)?;

        fill(self.region.mapped_range_mut(offset, len)?)?;

        self.cursor = align_up(end, self.push_alignment).min(self.region.size());
        self.pending_pushes += 1;
        Ok(offset)
    }

    /// Stage `len` bytes read from `reader`
    #[cfg(feature = "std")]
    pub fn push_reader<Rd>(&mut self, len: usize, reader: &mut Rd) -> Result<DeviceSize>
    where
        Rd: std::io::Read,
    {
        self.try_push_with(len, |dst| {
            reader.read_exact(dst).map_err(|e| {
                log::error!("staging: read of {} bytes failed: {}", len, e);
                Error::ReadFailed
            })
        })
    }

    /// Hand back the written range and rewind the cursor
    ///
    /// Returns `None` when nothing was pushed since the last flush.
    pub fn flush(&mut self) -> Option<FlushRange> {
        if self.cursor == 0 {
            return None;
        }

        let size = align_up(self.cursor, self.atom_size).min(self.region.size());
        log::debug!(
            "staging: flush {} pushes, {} bytes",
            self.pending_pushes,
            size
        );

        self.cursor = 0;
        self.pending_pushes = 0;
        Some(FlushRange { offset: 0, size })
    }

    /// Read staged bytes back
    pub fn read(&self, offset: DeviceSize, dst: &mut [u8]) -> Result<()> {
        self.region.read_bytes(offset, dst)
    }

    /// Cursor state
    pub fn state(&self) -> CursorState {
        if self.cursor == 0 {
            CursorState::Idle
        } else {
            CursorState::Accumulating
        }
    }

    /// Current cursor
    pub fn cursor(&self) -> DeviceSize {
        self.cursor
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> DeviceSize {
        self.region.size()
    }

    /// Bytes left before the end of the region
    pub fn available(&self) -> DeviceSize {
        self.region.size() - self.cursor
    }

    /// Pushes since the last flush
    pub fn pending_pushes(&self) -> u32 {
        self.pending_pushes
    }

    /// Backing region
    pub fn region(&self) -> &R {
        &self.region
    }
}
