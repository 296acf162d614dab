//! # ZRL Memory Subsystem
//!
//! Buffer memory management underneath the renderer's buffer objects.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      ZRL Memory Subsystem                       │
//! │                                                                 │
//! │  ┌──────────────────────────────┐   ┌────────────────────────┐  │
//! │  │          BufferPool          │   │     StagingBuffer      │  │
//! │  │   (id, flags, OOM logging)   │   │  (bump cursor, flush)  │  │
//! │  └──────────────┬───────────────┘   └───────────┬────────────┘  │
//! │        ┌────────┴────────┐                      │               │
//! │  ┌─────┴──────────┐  ┌───┴──────────────┐       │               │
//! │  │ BuddyAllocator │  │    HostRegion    │◄──────┘               │
//! │  │   (free-set)   │  │ (MemoryRegion)   │                       │
//! │  └────────────────┘  └──────────────────┘                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Allocator Design
//!
//! The buddy allocator hands out power-of-two blocks of one fixed region:
//!
//! - O(log N) allocation and free
//! - Free blocks are kept per size class, lowest offset first
//! - Freed blocks coalesce with their buddy until the buddy is busy
//! - Freeing a block that is not live reports `Error::InvalidBlock`
//!
//! The staging writer is a separate bump allocator and never touches the
//! buddy free-set.
//!
//! ## Concurrency
//!
//! Nothing here is internally synchronized. Wrap a pool in
//! [`SharedBufferPool`] to share it between threads.

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod buddy;
pub mod config;
pub mod pool;
pub mod region;
pub mod shared;
pub mod staging;

// Re-exports
pub use buddy::{AllocatorStats, Block, BuddyAllocator};
pub use config::{PoolConfig, StagingConfig};
pub use pool::BufferPool;
pub use region::{HostRegion, MemoryRegion, RegionFlags};
pub use shared::SharedBufferPool;
pub use staging::{CursorState, FlushRange, StagingBuffer};
pub use zrl_core::{ByteSize, DeviceSize, Error, Lru, Result};
