//! # Shared Buffer Pool
//!
//! A buffer pool behind one lock, for pools used from several threads.
//!
//! Split and merge touch several free-set entries at once, so the whole
//! pool is guarded as a unit. Keep critical sections short: every
//! operation is O(log n) and never blocks on anything but the lock.

use spin::{Mutex, MutexGuard};
use zrl_core::{DeviceSize, Result};

use crate::buddy::Block;
use crate::pool::BufferPool;
use crate::region::{HostRegion, MemoryRegion};

/// Buffer pool guarded by a spin lock
#[derive(Debug)]
pub struct SharedBufferPool<R: MemoryRegion = HostRegion> {
    inner: Mutex<BufferPool<R>>,
}

impl<R: MemoryRegion> SharedBufferPool<R> {
    /// Wrap a pool
    pub fn new(pool: BufferPool<R>) -> Self {
        Self {
            inner: Mutex::new(pool),
        }
    }

    /// Allocate a block of at least `size` bytes
    pub fn alloc(&self, size: DeviceSize) -> Result<Block> {
        self.inner.lock().alloc(size)
    }

    /// Return a block to the pool
    pub fn free(&self, block: Block) -> Result<()> {
        self.inner.lock().free(block)
    }

    /// Copy `data` into `block`, `offset` bytes from its start
    pub fn write_block(&self, block: Block, offset: DeviceSize, data: &[u8]) -> Result<()> {
        self.inner.lock().write_block(block, offset, data)
    }

    /// Size of the largest free block
    ///
    /// Only a hint: other threads may allocate before the caller acts on it.
    pub fn largest_block(&self) -> DeviceSize {
        self.inner.lock().largest_block()
    }

    /// Run `f` with the pool locked, for sequences that must not interleave
    pub fn with<T>(&self, f: impl FnOnce(&mut BufferPool<R>) -> T) -> T {
        f(&mut self.inner.lock())
    }

    /// Lock the pool
    pub fn lock(&self) -> MutexGuard<'_, BufferPool<R>> {
        self.inner.lock()
    }

    /// Unwrap the pool
    pub fn into_inner(self) -> BufferPool<R> {
        self.inner.into_inner()
    }
}
