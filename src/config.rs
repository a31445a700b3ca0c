use crate::{
  align,
  block::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE},
};

/// Free block appended when the allocator is created.
pub const INITIAL_CHUNK_SIZE: usize = 1 << 6;

/// Minimum number of bytes requested from the arena on a miss.
pub const GROWTH_CHUNK_SIZE: usize = 1 << 12;

/// Default capacity of the arena backends.
pub const DEFAULT_ARENA_LIMIT: usize = 20 * (1 << 20);

/// Tuning knobs of a [`SegregatedAllocator`](crate::SegregatedAllocator).
///
/// Sizes are rounded up to the block alignment and never go below the
/// minimum block size. Fields are only reachable through the `with_*`
/// setters so every instance stays within those bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
  initial_chunk: usize,
  growth_chunk: usize,
  arena_limit: usize,
}

impl Default for AllocatorConfig {
  fn default() -> Self {
    Self {
      initial_chunk: INITIAL_CHUNK_SIZE,
      growth_chunk: GROWTH_CHUNK_SIZE,
      arena_limit: DEFAULT_ARENA_LIMIT,
    }
  }
}

impl AllocatorConfig {
  pub fn initial_chunk(&self) -> usize {
    self.initial_chunk
  }

  pub fn growth_chunk(&self) -> usize {
    self.growth_chunk
  }

  pub fn arena_limit(&self) -> usize {
    self.arena_limit
  }

  pub fn with_initial_chunk(
    mut self,
    bytes: usize,
  ) -> Self {
    self.initial_chunk = chunk(bytes);
    self
  }

  pub fn with_growth_chunk(
    mut self,
    bytes: usize,
  ) -> Self {
    self.growth_chunk = chunk(bytes);
    self
  }

  /// Caps the arena. Header words are 32 bits wide, so the limit never
  /// exceeds the largest encodable block size.
  pub fn with_arena_limit(
    mut self,
    bytes: usize,
  ) -> Self {
    self.arena_limit = bytes.min(MAX_BLOCK_SIZE);
    self
  }
}

fn chunk(bytes: usize) -> usize {
  align!(bytes.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE - MIN_BLOCK_SIZE))
}
