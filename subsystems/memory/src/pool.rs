//! # Buffer Pool
//!
//! A named region partitioned by a buddy allocator. This is what the
//! renderer holds for each class of buffer memory (uniforms, vertices,
//! indices); the device layer only supplies the region.

use zrl_core::{DeviceSize, Error, Lru, Result};

use crate::buddy::{AllocatorStats, Block, BuddyAllocator};
use crate::config::PoolConfig;
use crate::region::{HostRegion, MemoryRegion, RegionFlags};

// =============================================================================
// BUFFER POOL
// =============================================================================

/// Buddy-allocated buffer memory
#[derive(Debug)]
pub struct BufferPool<R: MemoryRegion = HostRegion> {
    /// Pool name for logs
    name: &'static str,
    /// Backing region
    region: R,
    /// Block bookkeeping
    allocator: BuddyAllocator,
}

impl BufferPool<HostRegion> {
    /// Create a pool over a fresh host region
    pub fn new(config: &PoolConfig) -> Result<Self> {
        config.validate()?;
        let region = HostRegion::new(config.total_size.as_bytes(), config.flags)?;
        Self::with_region(config.name, region, config.min_block_size.as_bytes())
    }
}

impl<R: MemoryRegion> BufferPool<R> {
    /// Create a pool over a region supplied by the device layer
    pub fn with_region(name: &'static str, region: R, min_block_size: DeviceSize) -> Result<Self> {
        let allocator = BuddyAllocator::new(region.size(), min_block_size)?;

        log::debug!(
            "BufferPool({}): size={} min_block={} mapped={}",
            name,
            region.size(),
            min_block_size,
            region.is_mapped()
        );

        Ok(Self {
            name,
            region,
            allocator,
        })
    }

    /// Allocate a block of at least `size` bytes
    pub fn alloc(&mut self, size: DeviceSize) -> Result<Block> {
        let result = self.allocator.allocate(size);
        match result {
            Ok(block) => {
                log::trace!(
                    "BufferPool({}): alloc {} -> size={} offset={}",
                    self.name,
                    size,
                    block.size,
                    block.offset
                );
            },
            Err(Error::OutOfMemory) => {
                log::error!(
                    "BufferPool({}): OOM requesting {} bytes (free={} largest={})",
                    self.name,
                    size,
                    self.allocator.free_bytes(),
                    self.allocator.largest_free_block()
                );
            },
            Err(e) => {
                log::error!("BufferPool({}): alloc {} failed: {}", self.name, size, e);
            },
        }
        result
    }

    /// Allocate, evicting least recently used blocks until the request fits
    ///
    /// Every evicted block is freed and passed to `on_evict`. Entries in
    /// `lru` that are no longer live are dropped. Fails with `OutOfMemory`
    /// once `lru` runs dry, or straight away when `size` exceeds the pool.
    pub fn alloc_evicting<F>(
        &mut self,
        size: DeviceSize,
        lru: &mut Lru<Block>,
        mut on_evict: F,
    ) -> Result<Block>
    where
        F: FnMut(Block),
    {
        if size > self.allocator.total_size() {
            return self.alloc(size);
        }

        loop {
            match self.allocator.allocate(size) {
                Err(Error::OutOfMemory) => {},
                other => return other,
            }

            let Some(victim) = lru.pop() else {
                return self.alloc(size);
            };
            if !self.allocator.is_allocated(&victim) {
                continue;
            }

            self.allocator.free(victim)?;
            log::debug!(
                "BufferPool({}): evicted size={} offset={}",
                self.name,
                victim.size,
                victim.offset
            );
            on_evict(victim);
        }
    }

    /// Return a block to the pool
    pub fn free(&mut self, block: Block) -> Result<()> {
        self.allocator.free(block).inspect_err(|e| {
            log::error!(
                "BufferPool({}): free size={} offset={} failed: {}",
                self.name,
                block.size,
                block.offset,
                e
            );
        })
    }

    /// Copy `data` into the region at `offset`
    ///
    /// Requires a mapped region.
    pub fn write(&mut self, offset: DeviceSize, data: &[u8]) -> Result<()> {
        self.region.write_bytes(offset, data)
    }

    /// Copy `data` into `block`, `offset` bytes from its start
    ///
    /// The block must be live and the write must stay inside it.
    pub fn write_block(&mut self, block: Block, offset: DeviceSize, data: &[u8]) -> Result<()> {
        if !self.allocator.is_allocated(&block) {
            return Err(Error::InvalidBlock);
        }
        let end = offset
            .checked_add(data.len() as DeviceSize)
            .ok_or(Error::BufferOverflow)?;
        if end > block.size {
            return Err(Error::BufferOverflow);
        }
        self.region.write_bytes(block.offset + offset, data)
    }

    /// Copy bytes at `offset` into `dst`
    pub fn read(&self, offset: DeviceSize, dst: &mut [u8]) -> Result<()> {
        self.region.read_bytes(offset, dst)
    }

    /// Size of the largest free block
    pub fn largest_block(&self) -> DeviceSize {
        self.allocator.largest_free_block()
    }

    /// Release every block at once
    pub fn reset(&mut self) {
        log::debug!(
            "BufferPool({}): reset with {} live blocks",
            self.name,
            self.allocator.allocation_count()
        );
        self.allocator.reset();
    }

    /// Pool name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Region flags
    pub fn flags(&self) -> RegionFlags {
        self.region.flags()
    }

    /// Whether `write` is legal
    pub fn is_mapped(&self) -> bool {
        self.region.is_mapped()
    }

    /// Region size
    pub fn total_size(&self) -> DeviceSize {
        self.allocator.total_size()
    }

    /// Bytes in free blocks
    pub fn free_bytes(&self) -> DeviceSize {
        self.allocator.free_bytes()
    }

    /// Bytes in live blocks
    pub fn used_bytes(&self) -> DeviceSize {
        self.allocator.used_bytes()
    }

    /// Number of live blocks
    pub fn allocation_count(&self) -> usize {
        self.allocator.allocation_count()
    }

    /// Get allocator statistics
    pub fn stats(&self) -> &AllocatorStats {
        self.allocator.stats()
    }

    /// Block bookkeeping
    pub fn allocator(&self) -> &BuddyAllocator {
        &self.allocator
    }

    /// Backing region
    pub fn region(&self) -> &R {
        &self.region
    }

    /// Backing region, mutably
    ///
    /// Lets a [`StagingBuffer`](crate::StagingBuffer) run its cursor over the
    /// pool's own memory. Block bookkeeping is not consulted.
    pub fn region_mut(&mut self) -> &mut R {
        &mut self.region
    }
}

impl<R: MemoryRegion> Drop for BufferPool<R> {
    fn drop(&mut self) {
        let live = self.allocator.allocation_count();
        if live == 0 {
            return;
        }

        log::warn!(
            "BufferPool({}): dropped with {} live blocks ({} bytes)",
            self.name,
            live,
            self.allocator.used_bytes()
        );

        on_leak(self.name, live);
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "leak-check")] {
        fn on_leak(name: &str, live: usize) {
            if !std::thread::panicking() {
                panic!("BufferPool({}): leaked {} blocks", name, live);
            }
        }
    } else {
        fn on_leak(_name: &str, _live: usize) {}
    }
}

static_assertions::assert_impl_all!(BufferPool: Send, Sync);

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use zrl_core::ByteSize;

    use super::*;

    fn pool(total: u64, min: u64) -> BufferPool {
        let config =
            PoolConfig::new("test", ByteSize::from_bytes(total), ByteSize::from_bytes(min)).mapped();
        BufferPool::new(&config).unwrap()
    }

    #[test]
    fn test_alloc_free() {
        let mut pool = pool(1024, 64);
        let block = pool.alloc(100).unwrap();
        assert_eq!(block, Block::new(128, 0));
        assert_eq!(pool.largest_block(), 512);

        pool.free(block).unwrap();
        assert_eq!(pool.largest_block(), 1024);
        assert_eq!(pool.free(block).unwrap_err(), Error::InvalidBlock);
    }

    #[test]
    fn test_invalid_config() {
        let config = PoolConfig::new("bad", ByteSize::from_bytes(1000), ByteSize::from_bytes(10));
        assert_eq!(BufferPool::new(&config).unwrap_err(), Error::InvalidSize);
    }

    #[test]
    fn test_write() {
        let mut pool = pool(256, 64);
        let block = pool.alloc(64).unwrap();
        let other = pool.alloc(64).unwrap();

        pool.write(block.offset, b"zrl").unwrap();
        pool.write_block(other, 60, &[1, 2, 3, 4]).unwrap();

        let mut out = [0u8; 3];
        pool.read(block.offset, &mut out).unwrap();
        assert_eq!(&out, b"zrl");

        let mut out = [0u8; 4];
        pool.read(other.offset + 60, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);

        assert_eq!(
            pool.write_block(other, 61, &[0; 4]).unwrap_err(),
            Error::BufferOverflow
        );
        assert_eq!(pool.write(250, &[0; 8]).unwrap_err(), Error::BufferOverflow);

        pool.free(block).unwrap();
        assert_eq!(pool.write_block(block, 0, &[1]).unwrap_err(), Error::InvalidBlock);
        pool.free(other).unwrap();
    }

    #[test]
    fn test_unmapped_write() {
        let config = PoolConfig::vertex_buffer(ByteSize::from_mib(1));
        let mut pool = BufferPool::new(&config).unwrap();
        assert!(!pool.is_mapped());

        let block = pool.alloc(4096).unwrap();
        assert_eq!(block.size, 4096);
        assert_eq!(pool.write(block.offset, &[1]).unwrap_err(), Error::NotMapped);
        pool.free(block).unwrap();
    }

    #[test]
    fn test_alloc_evicting() {
        let mut pool = pool(256, 64);
        let mut lru = Lru::new();

        let blocks: Vec<_> = (0..4).map(|_| pool.alloc(64).unwrap()).collect();
        for &block in &blocks {
            lru.push(block);
        }
        // Touch the first block so the second becomes the oldest
        lru.push(blocks[0]);

        let mut evicted = Vec::new();
        let block = pool
            .alloc_evicting(64, &mut lru, |b| evicted.push(b))
            .unwrap();
        assert_eq!(block, blocks[1]);
        assert_eq!(evicted, [blocks[1]]);

        // Needs a 128 buddy pair: evicts 2 and 3, which coalesce
        let big = pool
            .alloc_evicting(128, &mut lru, |b| evicted.push(b))
            .unwrap();
        assert_eq!(big, Block::new(128, 128));
        assert_eq!(evicted, [blocks[1], blocks[2], blocks[3]]);
        assert_eq!(lru.len(), 1);

        pool.free(big).unwrap();
        pool.free(block).unwrap();
        pool.free(blocks[0]).unwrap();
        assert!(pool.allocator().is_pristine());
    }

    #[test]
    fn test_alloc_evicting_exhausted() {
        let mut pool = pool(128, 64);
        let mut lru = Lru::new();

        let a = pool.alloc(64).unwrap();
        let b = pool.alloc(64).unwrap();
        // Stale entry gets skipped
        lru.push(Block::new(64, 4096));

        let result = pool.alloc_evicting(64, &mut lru, |_| panic!("nothing to evict"));
        assert_eq!(result.unwrap_err(), Error::OutOfMemory);
        assert!(lru.is_empty());

        // Larger than the pool: nothing is evicted
        lru.push(a);
        let result = pool.alloc_evicting(256, &mut lru, |_| panic!("must not evict"));
        assert_eq!(result.unwrap_err(), Error::OutOfMemory);
        assert_eq!(lru.len(), 1);

        pool.free(a).unwrap();
        pool.free(b).unwrap();
    }

    #[test]
    fn test_reset() {
        let mut pool = pool(1024, 64);
        pool.alloc(100).unwrap();
        pool.alloc(200).unwrap();
        assert_eq!(pool.allocation_count(), 2);

        pool.reset();
        assert_eq!(pool.allocation_count(), 0);
        assert_eq!(pool.free_bytes(), 1024);
    }

    #[test]
    fn test_balanced_pool_drops_cleanly() {
        let mut pool = pool(512, 64);
        let a = pool.alloc(64).unwrap();
        let b = pool.alloc(200).unwrap();
        pool.free(b).unwrap();
        pool.free(a).unwrap();
        drop(pool);
    }

    #[cfg(feature = "leak-check")]
    #[test]
    #[should_panic(expected = "leaked 1 blocks")]
    fn test_drop_with_live_block_panics() {
        let mut pool = pool(512, 64);
        let _block = pool.alloc(64).unwrap();
        drop(pool);
    }
}
