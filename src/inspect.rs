//! Heap walking, consistency checking and statistics.

use crate::{
  allocator::SegregatedAllocator,
  arena::ArenaSource,
  block::{self, ALIGNMENT, Block, DWORD_SIZE, MIN_BLOCK_SIZE},
  error::HeapCorruption,
};

/// One block as seen by [`SegregatedAllocator::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Payload offset.
  pub offset: usize,
  /// Total size including header and footer.
  pub size: usize,
  pub allocated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub arena_bytes: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

/// Iterator over the blocks between prologue and epilogue.
pub struct Blocks<'a> {
  mem: &'a [u8],
  bp: usize,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    if self.bp > self.mem.len() {
      return None;
    }

    let Block { size, allocated } = block::read(self.mem, self.bp);

    if size == 0 || self.bp + size > self.mem.len() {
      return None;
    }

    let info = BlockInfo {
      offset: self.bp,
      size,
      allocated,
    };
    self.bp += size;

    Some(info)
  }
}

impl<A: ArenaSource> SegregatedAllocator<A> {
  /// Walks the arena in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      mem: self.arena.bytes(),
      bp: self.prologue + DWORD_SIZE,
    }
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      arena_bytes: self.arena.len(),
      ..HeapStats::default()
    };

    for info in self.blocks() {
      if info.allocated {
        stats.allocated_blocks += 1;
        stats.allocated_bytes += info.size;
      } else {
        stats.free_blocks += 1;
        stats.free_bytes += info.size;
        stats.largest_free = stats.largest_free.max(info.size);
      }
    }

    stats
  }

  /// Verifies every structural invariant of the arena and the free lists.
  ///
  /// Meant for tests and debugging; the walk is linear in the number of
  /// blocks.
  pub fn check(&self) -> Result<(), HeapCorruption> {
    let mem = self.arena.bytes();
    let prologue = self.prologue;

    if block::read(mem, prologue) != Block::allocated(DWORD_SIZE)
      || block::read_footer(mem, prologue) != Block::allocated(DWORD_SIZE)
    {
      return Err(HeapCorruption::new(prologue, "prologue damaged"));
    }

    let mut bp = prologue + DWORD_SIZE;
    let mut prev_free = false;
    let mut free_blocks = 0;

    loop {
      if bp > mem.len() {
        return Err(HeapCorruption::new(bp, "block runs past the arena end"));
      }

      let header = block::read(mem, bp);

      if header.size == 0 {
        if !header.allocated {
          return Err(HeapCorruption::new(bp, "epilogue not marked allocated"));
        }
        if bp != mem.len() {
          return Err(HeapCorruption::new(bp, "epilogue before the arena end"));
        }
        break;
      }

      if bp % ALIGNMENT != 0 {
        return Err(HeapCorruption::new(bp, "misaligned payload"));
      }
      if header.size % ALIGNMENT != 0 || header.size < MIN_BLOCK_SIZE {
        return Err(HeapCorruption::new(bp, format!("invalid block size {}", header.size)));
      }
      if bp + header.size > mem.len() {
        return Err(HeapCorruption::new(bp, "block runs past the arena end"));
      }
      if block::read_footer(mem, bp) != header {
        return Err(HeapCorruption::new(bp, "header and footer disagree"));
      }

      if header.allocated {
        if self.free.contains(bp) {
          return Err(HeapCorruption::new(bp, "allocated block is in a free list"));
        }
      } else {
        if prev_free {
          return Err(HeapCorruption::new(bp, "adjacent free blocks not coalesced"));
        }
        if self.free.size_of(bp) != Some(header.size) {
          return Err(HeapCorruption::new(bp, "free block missing from its bucket"));
        }
        free_blocks += 1;
      }

      prev_free = !header.allocated;
      bp += header.size;
    }

    if free_blocks != self.free.len() {
      return Err(HeapCorruption::new(
        0,
        format!("{} indexed free blocks, {} in the arena", self.free.len(), free_blocks),
      ));
    }

    self
      .free
      .validate()
      .map_err(|(offset, reason)| HeapCorruption::new(offset, reason))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::{WORD_SIZE, write};

  #[test]
  fn test_blocks_walk_in_address_order() {
    let mut allocator = SegregatedAllocator::new().unwrap();

    let a = allocator.allocate(8).unwrap().unwrap();
    let b = allocator.allocate(24).unwrap().unwrap();

    let blocks: Vec<_> = allocator.blocks().collect();

    assert_eq!(
      blocks,
      vec![
        BlockInfo {
          offset: a.offset(),
          size: 16,
          allocated: true
        },
        BlockInfo {
          offset: b.offset(),
          size: 32,
          allocated: true
        },
        BlockInfo {
          offset: b.offset() + 32,
          size: 16,
          allocated: false
        },
      ]
    );
  }

  #[test]
  fn test_blocks_tile_the_arena() {
    let mut allocator = SegregatedAllocator::new().unwrap();

    let a = allocator.allocate(300).unwrap().unwrap();
    allocator.allocate(40).unwrap().unwrap();
    allocator.release(a).unwrap();

    let total: usize = allocator.blocks().map(|info| info.size).sum();

    // padding word, prologue and epilogue header
    assert_eq!(total + 4 * WORD_SIZE, allocator.arena_size());
  }

  #[test]
  fn test_stats() {
    let mut allocator = SegregatedAllocator::new().unwrap();

    let _a = allocator.allocate(8).unwrap().unwrap();
    let b = allocator.allocate(8).unwrap().unwrap();
    let _c = allocator.allocate(8).unwrap().unwrap();
    allocator.release(b).unwrap();

    assert_eq!(
      allocator.stats(),
      HeapStats {
        arena_bytes: 80,
        allocated_blocks: 2,
        allocated_bytes: 32,
        free_blocks: 2,
        free_bytes: 32,
        largest_free: 16,
      }
    );
  }

  #[test]
  fn test_check_detects_footer_mismatch() {
    let mut allocator = SegregatedAllocator::new().unwrap();
    let a = allocator.allocate(8).unwrap().unwrap();

    let footer = block::footer(a.offset(), 16);
    block::write_word(allocator.arena.bytes_mut(), footer, Block::free(16).pack());

    let err = allocator.check().unwrap_err();
    assert_eq!(err.offset, a.offset());
  }

  #[test]
  fn test_check_detects_uncoalesced_neighbors() {
    let mut allocator = SegregatedAllocator::new().unwrap();
    let a = allocator.allocate(8).unwrap().unwrap();

    // mark `a` free behind the allocator's back, next to the free tail
    write(allocator.arena.bytes_mut(), a.offset(), Block::free(16));
    allocator.free.insert(a.offset(), 16);

    let err = allocator.check().unwrap_err();
    assert_eq!(err.offset, a.offset() + 16);
  }

  #[test]
  fn test_check_detects_unindexed_free_block() {
    let mut allocator = SegregatedAllocator::new().unwrap();
    let a = allocator.allocate(8).unwrap().unwrap();
    let _b = allocator.allocate(8).unwrap().unwrap();

    write(allocator.arena.bytes_mut(), a.offset(), Block::free(16));

    let err = allocator.check().unwrap_err();
    assert_eq!(err.reason, "free block missing from its bucket");
  }
}
