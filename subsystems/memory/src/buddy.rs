//! # Buddy Allocator
//!
//! Partitions one fixed, power-of-two sized region into power-of-two
//! blocks.
//!
//! ```text
//!   order 2  ┌───────────────────────────────────────────────┐
//!            │                    1024 @ 0                   │
//!            └───────────────────────┬───────────────────────┘
//!                           split    │
//!   order 1  ┌───────────────────────┴───┬───────────────────┐
//!            │        512 @ 0            │     512 @ 512     │  <- buddies
//!            └───────────┬───────────────┴───────────────────┘
//!   order 0  ┌───────────┴───┬───────────┐
//!            │   256 @ 0     │ 256 @ 256 │                      <- buddies
//!            └───────────────┴───────────┘
//! ```
//!
//! Free blocks are kept in one ordered set per size class, so the search
//! for "smallest block that fits, lowest offset first" is a scan over at
//! most `log2(total / min_block_size) + 1` classes.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use arrayvec::ArrayVec;
use hashbrown::HashMap;
use zrl_core::{is_power_of_two, DeviceSize, Error, Result};

cfg_if::cfg_if! {
    if #[cfg(feature = "debug-alloc")] {
        macro_rules! alloc_trace {
            ($($arg:tt)*) => { log::trace!($($arg)*) };
        }
    } else {
        macro_rules! alloc_trace {
            ($($arg:tt)*) => {};
        }
    }
}

/// Number of size classes a `u64` address space can have
pub const MAX_ORDERS: usize = 64;

// =============================================================================
// BLOCK
// =============================================================================

/// A power-of-two span of the region
///
/// Ordering is by size, then offset, which is the free-set order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block {
    /// Size in bytes, a power of two
    pub size: DeviceSize,
    /// Offset from the start of the region, a multiple of `size`
    pub offset: DeviceSize,
}

impl Block {
    /// Create a block
    pub const fn new(size: DeviceSize, offset: DeviceSize) -> Self {
        Self { size, offset }
    }

    /// One past the last byte
    pub const fn end(&self) -> DeviceSize {
        self.offset + self.size
    }

    /// The sibling this block was split from, or merges with
    pub const fn buddy(&self) -> Block {
        Block::new(self.size, self.offset ^ self.size)
    }

    /// Size is a power of two and the offset is a multiple of it
    pub const fn is_well_formed(&self) -> bool {
        is_power_of_two(self.size) && self.offset & (self.size - 1) == 0
    }

    /// Check whether two blocks share any byte
    pub const fn overlaps(&self, other: &Block) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

static_assertions::assert_impl_all!(Block: Send, Sync, Copy);

// =============================================================================
// STATISTICS
// =============================================================================

/// Allocator statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Successful allocations
    pub allocs: u64,
    /// Successful frees
    pub frees: u64,
    /// Allocations that ran out of memory
    pub failed_allocs: u64,
    /// Blocks split in half
    pub splits: u64,
    /// Buddy pairs merged
    pub merges: u64,
    /// High water mark of allocated bytes
    pub peak_used: DeviceSize,
}

// =============================================================================
// BUDDY ALLOCATOR
// =============================================================================

/// Buddy allocator over a fixed region
#[derive(Debug)]
pub struct BuddyAllocator {
    /// Region size, a power of two
    total_size: DeviceSize,
    /// Smallest block ever handed out
    min_block_size: DeviceSize,
    /// Order of the whole region
    max_order: usize,
    /// Free offsets per order, order `k` holds blocks of `min_block_size << k`
    free_lists: ArrayVec<BTreeSet<DeviceSize>, MAX_ORDERS>,
    /// Live blocks (offset -> size)
    live: HashMap<DeviceSize, DeviceSize>,
    /// Sum of free block sizes
    free_bytes: DeviceSize,
    /// Statistics
    stats: AllocatorStats,
}

impl BuddyAllocator {
    /// Create an allocator with a single free block covering the region
    ///
    /// Both sizes must be powers of two and `min_block_size` may not exceed
    /// `total_size`.
    pub fn new(total_size: DeviceSize, min_block_size: DeviceSize) -> Result<Self> {
        if !is_power_of_two(total_size)
            || !is_power_of_two(min_block_size)
            || min_block_size > total_size
        {
            return Err(Error::InvalidSize);
        }

        let max_order = (total_size / min_block_size).trailing_zeros() as usize;

        let mut free_lists = ArrayVec::new();
        for _ in 0..=max_order {
            free_lists.push(BTreeSet::new());
        }
        free_lists[max_order].insert(0);

        Ok(Self {
            total_size,
            min_block_size,
            max_order,
            free_lists,
            live: HashMap::new(),
            free_bytes: total_size,
            stats: AllocatorStats::default(),
        })
    }

    /// Allocate a block of at least `size` bytes
    ///
    /// The block is the smallest power of two that fits, but never smaller
    /// than the minimum block size. Among equal sizes the lowest offset wins.
    pub fn allocate(&mut self, size: DeviceSize) -> Result<Block> {
        if size == 0 {
            return Err(Error::InvalidSize);
        }

        if size > self.total_size {
            self.stats.failed_allocs += 1;
            return Err(Error::OutOfMemory);
        }

        let target = self.size_to_order(size);

        let Some(found) = self.find_free_order(target) else {
            self.stats.failed_allocs += 1;
            return Err(Error::OutOfMemory);
        };

        let offset = self.free_lists[found]
            .pop_first()
            .ok_or(Error::OutOfMemory)?;

        // Split down, keeping the low half each time
        let mut order = found;
        while order > target {
            order -= 1;
            let half = self.order_to_size(order);
            self.free_lists[order].insert(offset + half);
            self.stats.splits += 1;
        }

        let block = Block::new(self.order_to_size(target), offset);
        self.free_bytes -= block.size;
        self.live.insert(block.offset, block.size);

        self.stats.allocs += 1;
        self.stats.peak_used = self.stats.peak_used.max(self.used_bytes());

        alloc_trace!(
            "buddy: alloc {} -> size={} offset={} free={}",
            size,
            block.size,
            block.offset,
            self.free_bytes
        );

        Ok(block)
    }

    /// Return a block, coalescing it with free buddies
    ///
    /// Fails with `InvalidBlock` unless `block` is currently allocated from
    /// this allocator with exactly this size and offset. The free-set is
    /// left untouched on failure.
    pub fn free(&mut self, block: Block) -> Result<()> {
        match self.live.get(&block.offset) {
            Some(&size) if size == block.size => {},
            _ => return Err(Error::InvalidBlock),
        }
        self.live.remove(&block.offset);

        let mut order = self.size_to_order(block.size);
        let mut offset = block.offset;

        while order < self.max_order {
            let buddy = offset ^ self.order_to_size(order);
            if !self.free_lists[order].remove(&buddy) {
                break;
            }
            offset = offset.min(buddy);
            order += 1;
            self.stats.merges += 1;
        }

        self.free_lists[order].insert(offset);
        self.free_bytes += block.size;
        self.stats.frees += 1;

        alloc_trace!(
            "buddy: free size={} offset={} -> merged size={} offset={} free={}",
            block.size,
            block.offset,
            self.order_to_size(order),
            offset,
            self.free_bytes
        );

        Ok(())
    }

    /// Size of the largest free block, 0 when nothing is free
    pub fn largest_free_block(&self) -> DeviceSize {
        self.free_lists
            .iter()
            .rposition(|list| !list.is_empty())
            .map_or(0, |order| self.order_to_size(order))
    }

    /// Release every live block at once
    pub fn reset(&mut self) {
        for list in &mut self.free_lists {
            list.clear();
        }
        self.free_lists[self.max_order].insert(0);
        self.live.clear();
        self.free_bytes = self.total_size;
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Region size
    pub fn total_size(&self) -> DeviceSize {
        self.total_size
    }

    /// Smallest block size
    pub fn min_block_size(&self) -> DeviceSize {
        self.min_block_size
    }

    /// Bytes in free blocks
    pub fn free_bytes(&self) -> DeviceSize {
        self.free_bytes
    }

    /// Bytes in live blocks
    pub fn used_bytes(&self) -> DeviceSize {
        self.total_size - self.free_bytes
    }

    /// Number of live blocks
    pub fn allocation_count(&self) -> usize {
        self.live.len()
    }

    /// Number of free blocks
    pub fn free_block_count(&self) -> usize {
        self.free_lists.iter().map(BTreeSet::len).sum()
    }

    /// Check whether `block` is live
    pub fn is_allocated(&self, block: &Block) -> bool {
        self.live.get(&block.offset) == Some(&block.size)
    }

    /// True when the free-set is exactly one block covering the region
    pub fn is_pristine(&self) -> bool {
        self.live.is_empty()
            && self.free_block_count() == 1
            && self.free_lists[self.max_order].contains(&0)
    }

    /// Free blocks, ordered by size then offset
    pub fn free_blocks(&self) -> impl Iterator<Item = Block> + '_ {
        let min = self.min_block_size;
        self.free_lists.iter().enumerate().flat_map(move |(order, list)| {
            list.iter()
                .map(move |&offset| Block::new(min << order, offset))
        })
    }

    /// Live blocks, in no particular order
    pub fn live_blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.live.iter().map(|(&offset, &size)| Block::new(size, offset))
    }

    /// Fraction of free memory not reachable as the largest free block
    pub fn fragmentation(&self) -> f32 {
        if self.free_bytes == 0 {
            return 0.0;
        }
        1.0 - (self.largest_free_block() as f32 / self.free_bytes as f32)
    }

    /// Get statistics
    pub fn stats(&self) -> &AllocatorStats {
        &self.stats
    }

    /// Check every structural invariant, naming the first one broken
    ///
    /// Walks all blocks, so this is meant for tests and debug assertions.
    pub fn validate(&self) -> core::result::Result<(), &'static str> {
        let mut blocks: Vec<Block> = self.free_blocks().chain(self.live_blocks()).collect();

        let mut free_sum = 0;
        for block in self.free_blocks() {
            free_sum += block.size;
            if self.free_lists[self.size_to_order(block.size)].contains(&block.buddy().offset)
                && block.size < self.total_size
            {
                return Err("free buddies not coalesced");
            }
        }
        if free_sum != self.free_bytes {
            return Err("cached free bytes out of sync");
        }

        let mut sum = 0;
        for block in &blocks {
            if !block.is_well_formed() || block.size < self.min_block_size {
                return Err("malformed block");
            }
            if block.end() > self.total_size {
                return Err("block outside region");
            }
            sum += block.size;
        }
        if sum != self.total_size {
            return Err("free and live bytes do not add up to the region");
        }

        blocks.sort_unstable_by_key(|b| b.offset);
        if blocks.windows(2).any(|pair| pair[0].overlaps(&pair[1])) {
            return Err("overlapping blocks");
        }

        Ok(())
    }

    // =========================================================================
    // Order helpers
    // =========================================================================

    /// Smallest order whose block size holds `size`
    fn size_to_order(&self, size: DeviceSize) -> usize {
        let rounded = size.max(self.min_block_size).next_power_of_two();
        (rounded / self.min_block_size).trailing_zeros() as usize
    }

    /// Block size of an order
    fn order_to_size(&self, order: usize) -> DeviceSize {
        self.min_block_size << order
    }

    /// Smallest non-empty order at or above `order`
    fn find_free_order(&self, order: usize) -> Option<usize> {
        (order..=self.max_order).find(|&o| !self.free_lists[o].is_empty())
    }
}
