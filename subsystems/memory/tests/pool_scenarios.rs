//! End-to-end scenarios over the public pool and staging API.

use zrl_memory::{
    Block, BufferPool, ByteSize, CursorState, Error, FlushRange, HostRegion, Lru, MemoryRegion,
    PoolConfig, RegionFlags, StagingBuffer, StagingConfig,
};

fn mapped_pool(total: u64, min: u64) -> BufferPool {
    let config = PoolConfig::new("scenario", ByteSize::from_bytes(total), ByteSize::from_bytes(min))
        .mapped();
    BufferPool::new(&config).unwrap()
}

#[test]
fn test_split_and_restore() {
    let mut pool = mapped_pool(1024, 64);

    let block = pool.alloc(100).unwrap();
    assert_eq!(block.size, 128);
    assert_eq!(pool.largest_block(), 512);

    pool.free(block).unwrap();
    assert_eq!(pool.largest_block(), 1024);
}

#[test]
fn test_two_halves_then_oom() {
    let mut pool = mapped_pool(128, 64);

    let a = pool.alloc(64).unwrap();
    let b = pool.alloc(64).unwrap();
    assert_eq!(a, Block::new(64, 0));
    assert_eq!(b, Block::new(64, 64));

    let err = pool.alloc(64).unwrap_err();
    assert_eq!(err, Error::OutOfMemory);
    assert!(err.is_recoverable());

    // Still usable after running dry
    pool.free(a).unwrap();
    pool.free(b).unwrap();
    let free: Vec<_> = pool.allocator().free_blocks().collect();
    assert_eq!(free, [Block::new(128, 0)]);
}

#[test]
fn test_whole_region() {
    let mut pool = mapped_pool(4096, 256);

    assert_eq!(pool.alloc(4097).unwrap_err(), Error::OutOfMemory);
    let all = pool.alloc(4096).unwrap();
    assert_eq!(all, Block::new(4096, 0));
    assert_eq!(pool.free_bytes(), 0);
    pool.free(all).unwrap();
}

#[test]
fn test_stage_then_copy_into_block() {
    let mut staging = StagingBuffer::new(&StagingConfig::new(ByteSize::from_kib(4))).unwrap();
    let mut pool = mapped_pool(1 << 16, 256);

    let vertices: Vec<u8> = (0..=255).collect();
    let indices = [0u8, 1, 2, 2, 3, 0];

    let v_off = staging.push_data(&vertices).unwrap();
    let i_off = staging.push_data(&indices).unwrap();
    assert_eq!((v_off, i_off), (0, 256));
    assert_eq!(staging.state(), CursorState::Accumulating);

    // The device layer would record copies here, then flush
    let range = staging.flush().unwrap();
    assert_eq!(range, FlushRange { offset: 0, size: 320 });
    assert_eq!(staging.state(), CursorState::Idle);

    let v_block = pool.alloc(vertices.len() as u64).unwrap();
    let i_block = pool.alloc(indices.len() as u64).unwrap();

    let mut scratch = vec![0u8; vertices.len()];
    staging.read(v_off, &mut scratch).unwrap();
    pool.write_block(v_block, 0, &scratch).unwrap();

    let mut scratch = [0u8; 6];
    staging.read(i_off, &mut scratch).unwrap();
    pool.write_block(i_block, 0, &scratch).unwrap();

    let mut out = vec![0u8; vertices.len()];
    pool.read(v_block.offset, &mut out).unwrap();
    assert_eq!(out, vertices);

    let mut out = [0u8; 6];
    pool.read(i_block.offset, &mut out).unwrap();
    assert_eq!(out, indices);

    pool.free(v_block).unwrap();
    pool.free(i_block).unwrap();
    assert!(pool.allocator().is_pristine());
}

#[test]
fn test_texture_cache_eviction() {
    let mut pool = mapped_pool(1 << 12, 512);
    let mut lru = Lru::new();
    let mut resident = Vec::new();

    // Fill the pool with eight 512 byte entries
    for _ in 0..8 {
        let block = pool.alloc_evicting(500, &mut lru, |_| {}).unwrap();
        lru.push(block);
        resident.push(block);
    }
    assert_eq!(pool.free_bytes(), 0);

    // Touch the oldest two so the next eviction skips them
    lru.push(resident[0]);
    lru.push(resident[1]);

    let mut evicted = Vec::new();
    let block = pool
        .alloc_evicting(1024, &mut lru, |b| evicted.push(b))
        .unwrap();

    // Blocks 2 and 3 are buddies and form the first free 1 KiB run
    assert_eq!(evicted, [resident[2], resident[3]]);
    assert_eq!(block, Block::new(1024, 1024));
    pool.allocator().validate().unwrap();

    pool.reset();
    assert!(pool.allocator().is_pristine());
}

#[test]
fn test_device_supplied_region() {
    let region =
        HostRegion::new(1 << 20, RegionFlags::DEVICE_LOCAL | RegionFlags::HOST_VISIBLE).unwrap();
    assert!(!region.is_mapped());

    let mut pool = BufferPool::with_region("device", region, 4096).unwrap();
    assert_eq!(pool.name(), "device");
    assert!(pool.flags().contains(RegionFlags::DEVICE_LOCAL));

    let block = pool.alloc(10_000).unwrap();
    assert_eq!(block.size, 16384);
    assert_eq!(pool.write(block.offset, &[0; 4]).unwrap_err(), Error::NotMapped);
    pool.free(block).unwrap();
}

#[test]
fn test_staging_cursor_over_pool_region() {
    let mut pool = mapped_pool(4096, 256);
    let config = StagingConfig::new(ByteSize::from_bytes(pool.total_size()));

    let (first, second, range) = {
        let mut staging = StagingBuffer::with_region(pool.region_mut(), &config).unwrap();
        let first = staging.push_data(b"header").unwrap();
        let second = staging.push_data(&[0xAB; 40]).unwrap();
        (first, second, staging.flush().unwrap())
    };
    assert_eq!((first, second), (0, 16));
    assert_eq!(range, FlushRange { offset: 0, size: 64 });

    // The bytes landed in the pool's memory, and no block was touched
    let mut out = [0u8; 6];
    pool.read(first, &mut out).unwrap();
    assert_eq!(&out, b"header");

    let mut out = [0u8; 40];
    pool.read(second, &mut out).unwrap();
    assert_eq!(out, [0xAB; 40]);
    assert!(pool.allocator().is_pristine());
}
