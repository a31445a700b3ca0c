use tracing::{debug, trace, warn};

use crate::{
  arena::{ArenaSource, VecArena},
  block::{self, Block, DWORD_SIZE, MAX_BLOCK_SIZE, WORD_SIZE, adjusted_size},
  config::AllocatorConfig,
  error::{AllocError, ArenaError, ResizeError},
  free_list::FreeLists,
  handle::{Allocation, next_allocator_id},
};

/// Segregated-fit allocator over a single growable arena.
///
/// ```text
///   ┌─────┬──────────┬────────┬────────┬──────────────┬────────┬─────┐
///   │ pad │ prologue │ block  │ block  │    block     │ block  │ epi │
///   │     │  8 / a   │ 24 / a │ 32 / f │   112 / a    │ 64 / f │ 0/a │
///   └─────┴──────────┴────────┴────────┴──────────────┴────────┴─────┘
///                                 │                       │
///                                 └──── free lists ───────┘
/// ```
///
/// Every operation runs to completion on `&mut self`; callers that share an
/// instance between threads must serialize access themselves.
#[derive(Debug)]
pub struct SegregatedAllocator<A: ArenaSource = VecArena> {
  pub(crate) arena: A,
  pub(crate) free: FreeLists,
  pub(crate) prologue: usize,
  config: AllocatorConfig,
  id: u64,
}

impl SegregatedAllocator<VecArena> {
  /// Creates an allocator over a `Vec`-backed arena with default settings.
  pub fn new() -> Result<Self, AllocError> {
    Self::with_config(AllocatorConfig::default())
  }

  pub fn with_config(config: AllocatorConfig) -> Result<Self, AllocError> {
    Self::with_arena(VecArena::new(config.arena_limit()), config)
  }
}

impl<A: ArenaSource> SegregatedAllocator<A> {
  /// Lays down the prologue and epilogue in `arena` and appends the initial
  /// free chunk.
  pub fn with_arena(
    mut arena: A,
    config: AllocatorConfig,
  ) -> Result<Self, AllocError> {
    let skew = (DWORD_SIZE - arena.len() % DWORD_SIZE) % DWORD_SIZE;
    let start = grow(&mut arena, skew + 4 * WORD_SIZE)? + skew;
    let prologue = start + DWORD_SIZE;

    let mem = arena.bytes_mut();
    block::write_word(mem, start, 0);
    block::write(mem, prologue, Block::allocated(DWORD_SIZE));
    block::write_header(mem, prologue + DWORD_SIZE, Block::allocated(0));

    let mut allocator = Self {
      arena,
      free: FreeLists::new(),
      prologue,
      config,
      id: next_allocator_id(),
    };

    allocator.extend_heap(config.initial_chunk())?;

    debug!(
      id = allocator.id,
      arena_bytes = allocator.arena.len(),
      "allocator initialized"
    );

    Ok(allocator)
  }

  pub fn config(&self) -> &AllocatorConfig {
    &self.config
  }

  pub fn arena(&self) -> &A {
    &self.arena
  }

  /// Total bytes taken from the arena primitive so far.
  pub fn arena_size(&self) -> usize {
    self.arena.len()
  }

  /// Hands out a region of at least `size` bytes. A zero-sized request
  /// yields `Ok(None)`.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<Allocation>, AllocError> {
    if size == 0 {
      return Ok(None);
    }

    let bp = self.allocate_block(size)?;

    Ok(Some(Allocation::new(bp, size, self.id)))
  }

  /// Returns a region to the free lists and merges it with free neighbors.
  /// Passing `None` is a no-op.
  pub fn release(
    &mut self,
    allocation: impl Into<Option<Allocation>>,
  ) -> Result<(), AllocError> {
    let Some(allocation) = allocation.into() else {
      return Ok(());
    };

    self.verify(&allocation)?;
    self.release_block(allocation.offset());

    Ok(())
  }

  /// Grows or shrinks a region.
  ///
  /// - `None` behaves like [`allocate`](Self::allocate).
  /// - `size == 0` releases the region and yields `Ok(None)`.
  /// - A block that is already large enough is returned unchanged.
  /// - A free block right after this one is absorbed in place when the two
  ///   together are large enough.
  /// - Otherwise the contents move to a new block.
  ///
  /// On failure the original allocation is handed back inside the error.
  pub fn resize(
    &mut self,
    allocation: impl Into<Option<Allocation>>,
    size: usize,
  ) -> Result<Option<Allocation>, ResizeError> {
    let Some(allocation) = allocation.into() else {
      return self.allocate(size).map_err(|err| ResizeError::new(err, None));
    };

    if let Err(err) = self.verify(&allocation) {
      return Err(ResizeError::new(err, Some(allocation)));
    }

    let bp = allocation.offset();

    if size == 0 {
      self.release_block(bp);
      return Ok(None);
    }

    let Some(asize) = adjusted_size(size) else {
      return Err(ResizeError::new(AllocError::TooLarge(size), Some(allocation)));
    };

    let current = block::read(self.arena.bytes(), bp).size;

    if current >= asize {
      trace!(bp, current, asize, "resize fits in current block");
      return Ok(Some(Allocation::new(bp, size, self.id)));
    }

    let next_bp = bp + current;
    let next = block::read(self.arena.bytes(), next_bp);

    if !next.allocated && current + next.size >= asize {
      self.free.remove(next_bp);
      block::write(
        self.arena.bytes_mut(),
        bp,
        Block::allocated(current + next.size),
      );

      trace!(bp, absorbed = next.size, "resize grew in place");
      return Ok(Some(Allocation::new(bp, size, self.id)));
    }

    let new_bp = match self.allocate_block(size) {
      Ok(new_bp) => new_bp,
      Err(err) => return Err(ResizeError::new(err, Some(allocation))),
    };

    let count = (current - DWORD_SIZE).min(size);
    self.arena.bytes_mut().copy_within(bp..bp + count, new_bp);
    self.release_block(bp);

    trace!(from = bp, to = new_bp, copied = count, "resize moved block");

    Ok(Some(Allocation::new(new_bp, size, self.id)))
  }

  /// Requested bytes of the region.
  pub fn payload(
    &self,
    allocation: &Allocation,
  ) -> Result<&[u8], AllocError> {
    self.verify(allocation)?;

    let bp = allocation.offset();
    Ok(&self.arena.bytes()[bp..bp + allocation.len()])
  }

  pub fn payload_mut(
    &mut self,
    allocation: &Allocation,
  ) -> Result<&mut [u8], AllocError> {
    self.verify(allocation)?;

    let bp = allocation.offset();
    Ok(&mut self.arena.bytes_mut()[bp..bp + allocation.len()])
  }

  /// Bytes the region could hold, which may exceed what was requested.
  pub fn usable_size(
    &self,
    allocation: &Allocation,
  ) -> Result<usize, AllocError> {
    self.verify(allocation)?;

    Ok(block::read(self.arena.bytes(), allocation.offset()).size - DWORD_SIZE)
  }

  fn verify(
    &self,
    allocation: &Allocation,
  ) -> Result<(), AllocError> {
    if allocation.owner() != self.id {
      return Err(AllocError::ForeignAllocation);
    }

    Ok(())
  }

  fn allocate_block(
    &mut self,
    size: usize,
  ) -> Result<usize, AllocError> {
    let asize = adjusted_size(size).ok_or(AllocError::TooLarge(size))?;

    let bp = match self.find_fit(asize) {
      Some(bp) => bp,
      None => self.extend_heap(asize.max(self.config.growth_chunk()))?,
    };

    let bp = self.place(bp, asize);
    trace!(size, asize, bp, "allocated");

    Ok(bp)
  }

  fn release_block(
    &mut self,
    bp: usize,
  ) {
    let mem = self.arena.bytes_mut();
    let size = block::read(mem, bp).size;

    block::write(mem, bp, Block::free(size));
    let merged = self.coalesce(bp);

    trace!(bp, size, merged, "released");
  }

  /// Appends a free block of `size` bytes, moves the epilogue behind it and
  /// merges it with a free tail block. Returns the resulting free block.
  fn extend_heap(
    &mut self,
    size: usize,
  ) -> Result<usize, AllocError> {
    let bp = grow(&mut self.arena, size).inspect_err(|err| {
      warn!(size, error = %err, "arena extension failed");
    })?;

    let mem = self.arena.bytes_mut();
    block::write(mem, bp, Block::free(size));
    block::write_header(mem, bp + size, Block::allocated(0));

    debug!(size, arena_bytes = self.arena.len(), "arena grown");

    Ok(self.coalesce(bp))
  }
}

/// Extends `arena` by `bytes`, refusing to grow past what a header word can
/// encode so that no block, however merged, outgrows its size field.
fn grow<A: ArenaSource>(
  arena: &mut A,
  bytes: usize,
) -> Result<usize, ArenaError> {
  let used = arena.len();

  match used.checked_add(bytes) {
    Some(end) if end <= MAX_BLOCK_SIZE => arena.extend(bytes),
    _ => Err(ArenaError::Exhausted {
      requested: bytes,
      used,
      limit: MAX_BLOCK_SIZE,
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::INITIAL_CHUNK_SIZE;

  fn allocator() -> SegregatedAllocator {
    SegregatedAllocator::new().unwrap()
  }

  #[test]
  fn test_new_lays_out_prologue_and_initial_chunk() {
    let allocator = allocator();

    assert_eq!(allocator.arena_size(), 4 * WORD_SIZE + INITIAL_CHUNK_SIZE);
    assert_eq!(allocator.free.len(), 1);
    assert_eq!(allocator.free.size_of(16), Some(INITIAL_CHUNK_SIZE));
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_zero_size_requests() {
    let mut allocator = allocator();

    assert_eq!(allocator.allocate(0), Ok(None));
    assert_eq!(allocator.release(None), Ok(()));

    let a = allocator.allocate(10).unwrap();
    assert!(allocator.resize(a, 0).unwrap().is_none());
    assert_eq!(allocator.stats().allocated_blocks, 0);
  }

  #[test]
  fn test_allocations_are_aligned_and_large_enough() {
    let mut allocator = allocator();

    for size in [1, 7, 8, 9, 24, 100, 4000, 10_000] {
      let a = allocator.allocate(size).unwrap().unwrap();

      assert_eq!(a.offset() % 8, 0);
      assert_eq!(a.len(), size);
      assert!(allocator.usable_size(&a).unwrap() >= size);
    }

    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_freed_block_is_reused() {
    let mut allocator = allocator();

    let a = allocator.allocate(24).unwrap().unwrap();
    let b = allocator.allocate(40).unwrap().unwrap();
    let a_offset = a.offset();
    let arena_size = allocator.arena_size();

    allocator.release(a).unwrap();
    let c = allocator.allocate(16).unwrap().unwrap();

    assert_eq!(c.offset(), a_offset);
    assert_eq!(allocator.arena_size(), arena_size);
    assert!(b.offset() > c.offset());
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_release_then_allocate_same_size_reuses() {
    let mut allocator = allocator();

    let a = allocator.allocate(48).unwrap().unwrap();
    let offset = a.offset();
    let arena_size = allocator.arena_size();

    allocator.release(a).unwrap();
    let b = allocator.allocate(48).unwrap().unwrap();

    assert_eq!(b.offset(), offset);
    assert_eq!(allocator.arena_size(), arena_size);
  }

  #[test]
  fn test_adjacent_releases_coalesce() {
    let mut allocator = allocator();

    let a = allocator.allocate(100).unwrap().unwrap();
    let b = allocator.allocate(100).unwrap().unwrap();
    let _guard = allocator.allocate(8).unwrap().unwrap();
    let a_offset = a.offset();
    let arena_size = allocator.arena_size();

    assert_eq!(b.offset(), a_offset + 112);

    allocator.release(a).unwrap();
    allocator.release(b).unwrap();
    assert!(allocator.check().is_ok());

    let c = allocator.allocate(180).unwrap().unwrap();

    assert_eq!(c.offset(), a_offset);
    assert_eq!(allocator.arena_size(), arena_size);
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_grows_by_growth_chunk_on_miss() {
    let mut allocator = allocator();
    let before = allocator.arena_size();

    let a = allocator.allocate(200).unwrap().unwrap();

    // the 64-byte initial chunk merges with the new 4096 bytes
    assert_eq!(allocator.arena_size(), before + 4096);
    assert_eq!(a.offset(), 16);
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_large_request_grows_by_request() {
    let mut allocator = allocator();
    let before = allocator.arena_size();

    allocator.allocate(10_000).unwrap().unwrap();

    assert_eq!(allocator.arena_size(), before + 10_016);
  }

  #[test]
  fn test_out_of_memory() {
    let config = AllocatorConfig::default().with_arena_limit(1024);
    let mut allocator = SegregatedAllocator::with_config(config).unwrap();

    let a = allocator.allocate(32).unwrap().unwrap();

    assert!(matches!(
      allocator.allocate(4096),
      Err(AllocError::OutOfMemory(ArenaError::Exhausted { .. }))
    ));

    // the allocator stays usable after a failed growth
    let b = allocator.allocate(16).unwrap().unwrap();
    assert_ne!(a.offset(), b.offset());
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_too_large() {
    let mut allocator = allocator();

    assert_eq!(allocator.allocate(usize::MAX), Err(AllocError::TooLarge(usize::MAX)));
  }

  #[test]
  fn test_construction_fails_without_room() {
    let config = AllocatorConfig::default().with_arena_limit(32);

    assert!(matches!(
      SegregatedAllocator::with_config(config),
      Err(AllocError::OutOfMemory(_))
    ));
  }

  #[test]
  fn test_payload_roundtrip() {
    let mut allocator = allocator();

    let a = allocator.allocate(5).unwrap().unwrap();
    allocator.payload_mut(&a).unwrap().copy_from_slice(b"hello");

    let b = allocator.allocate(5).unwrap().unwrap();
    allocator.payload_mut(&b).unwrap().copy_from_slice(b"world");

    assert_eq!(allocator.payload(&a).unwrap(), b"hello");
    assert_eq!(allocator.payload(&b).unwrap(), b"world");
  }

  #[test]
  fn test_resize_returns_same_block_when_large_enough() {
    let mut allocator = allocator();

    let a = allocator.allocate(20).unwrap().unwrap();
    let offset = a.offset();

    let b = allocator.resize(a, 24).unwrap().unwrap();
    assert_eq!(b.offset(), offset);
    assert_eq!(b.len(), 24);

    let c = allocator.resize(b, 4).unwrap().unwrap();
    assert_eq!(c.offset(), offset);
    assert_eq!(allocator.usable_size(&c).unwrap(), 24);
  }

  #[test]
  fn test_resize_grows_in_place() {
    let mut allocator = allocator();

    let a = allocator.allocate(16).unwrap().unwrap();
    let b = allocator.allocate(64).unwrap().unwrap();
    let _guard = allocator.allocate(16).unwrap().unwrap();
    let offset = a.offset();

    allocator.payload_mut(&a).unwrap().copy_from_slice(&[7; 16]);
    allocator.release(b).unwrap();

    let grown = allocator.resize(a, 80).unwrap().unwrap();

    assert_eq!(grown.offset(), offset);
    assert_eq!(&allocator.payload(&grown).unwrap()[..16], &[7; 16]);
    assert!(allocator.usable_size(&grown).unwrap() >= 80);
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_resize_moves_and_preserves_contents() {
    let mut allocator = allocator();

    let a = allocator.allocate(16).unwrap().unwrap();
    let _b = allocator.allocate(16).unwrap().unwrap();
    let offset = a.offset();

    let data: Vec<u8> = (0..16).collect();
    allocator.payload_mut(&a).unwrap().copy_from_slice(&data);

    let moved = allocator.resize(a, 200).unwrap().unwrap();

    assert_ne!(moved.offset(), offset);
    assert_eq!(&allocator.payload(&moved).unwrap()[..16], data.as_slice());
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_resize_none_allocates() {
    let mut allocator = allocator();

    let a = allocator.resize(None, 32).unwrap().unwrap();

    assert_eq!(a.len(), 32);
    assert_eq!(allocator.stats().allocated_blocks, 1);
  }

  #[test]
  fn test_failed_resize_keeps_original() {
    let config = AllocatorConfig::default().with_arena_limit(512);
    let mut allocator = SegregatedAllocator::with_config(config).unwrap();

    let a = allocator.allocate(16).unwrap().unwrap();
    let _b = allocator.allocate(16).unwrap().unwrap();
    let offset = a.offset();
    allocator.payload_mut(&a).unwrap().copy_from_slice(&[9; 16]);

    let err = allocator.resize(a, 4096).unwrap_err();
    assert!(matches!(err.error(), AllocError::OutOfMemory(_)));

    let original = err.into_original().unwrap();
    assert_eq!(original.offset(), offset);
    assert_eq!(allocator.payload(&original).unwrap(), &[9; 16]);
    assert!(allocator.release(original).is_ok());
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_foreign_allocation_is_rejected() {
    let mut first = allocator();
    let mut second = allocator();

    let a = first.allocate(16).unwrap().unwrap();

    assert!(matches!(second.payload(&a), Err(AllocError::ForeignAllocation)));
    assert!(matches!(second.usable_size(&a), Err(AllocError::ForeignAllocation)));

    let err = second.resize(a, 64).unwrap_err();
    assert_eq!(err.error(), &AllocError::ForeignAllocation);

    let a = err.into_original().unwrap();
    assert_eq!(second.release(a), Err(AllocError::ForeignAllocation));
    assert!(second.check().is_ok());
    assert_eq!(first.stats().allocated_blocks, 1);
  }

  #[cfg(unix)]
  #[test]
  fn test_mmap_backed_allocator() {
    use crate::arena::MmapArena;

    let arena = MmapArena::reserve(1 << 20).unwrap();
    let mut allocator = SegregatedAllocator::with_arena(arena, AllocatorConfig::default()).unwrap();

    let a = allocator.allocate(1000).unwrap().unwrap();
    allocator.payload_mut(&a).unwrap().fill(0x5A);
    let b = allocator.resize(a, 3000).unwrap().unwrap();

    assert!(allocator.payload(&b).unwrap()[..1000].iter().all(|&x| x == 0x5A));
    assert!(allocator.check().is_ok());
  }

  #[test]
  fn test_growth_stops_at_header_word_capacity() {
    // too big for the header word regardless of the arena's own limit
    let mut small = VecArena::new(usize::MAX);
    assert!(matches!(
      grow(&mut small, MAX_BLOCK_SIZE + 8),
      Err(ArenaError::Exhausted { limit: MAX_BLOCK_SIZE, .. })
    ));
    assert!(small.is_empty());
    assert_eq!(grow(&mut small, 64), Ok(0));
  }

  #[test]
  fn test_degenerate_initial_chunk_is_clamped() {
    let config = AllocatorConfig::default()
      .with_initial_chunk(0)
      .with_growth_chunk(0);
    let mut allocator = SegregatedAllocator::with_config(config).unwrap();

    assert!(allocator.check().is_ok());

    let a = allocator.allocate(8).unwrap().unwrap();
    let b = allocator.allocate(100).unwrap().unwrap();

    assert_ne!(a.offset(), b.offset());
    assert!(allocator.check().is_ok());
  }

  #[cfg(all(unix, target_pointer_width = "64"))]
  #[test]
  fn test_huge_arena_never_merges_past_header_capacity() {
    use crate::arena::MmapArena;

    // address space only; pages are touched at block boundaries
    let Ok(arena) = MmapArena::reserve(1 << 34) else {
      return;
    };
    let mut allocator = SegregatedAllocator::with_arena(arena, AllocatorConfig::default()).unwrap();

    let a = allocator.allocate(3 << 30).unwrap().unwrap();

    assert!(matches!(
      allocator.allocate(3 << 30),
      Err(AllocError::OutOfMemory(ArenaError::Exhausted { limit: MAX_BLOCK_SIZE, .. }))
    ));

    allocator.release(a).unwrap();
    assert!(allocator.arena_size() <= MAX_BLOCK_SIZE);
    assert!(allocator.check().is_ok());
  }
}
