//! Immediate coalescing of physically adjacent free blocks.

use tracing::trace;

use crate::{
  allocator::SegregatedAllocator,
  arena::ArenaSource,
  block::{self, Block},
};

impl<A: ArenaSource> SegregatedAllocator<A> {
  /// Merges the free block at `bp` with whichever physical neighbors are
  /// free and indexes the result exactly once.
  ///
  /// `bp` must already be marked free and must not be indexed yet. Returns
  /// the payload offset of the merged block, which is the previous block's
  /// offset whenever that one was absorbed.
  ///
  /// ```text
  ///   prev   bp    next           result
  ///   [a]   [f]    [a]     →      [a][ f ][a]
  ///   [a]   [f]    [f]     →      [a][ f     ]
  ///   [f]   [f]    [a]     →      [     f ][a]
  ///   [f]   [f]    [f]     →      [     f     ]
  /// ```
  pub(crate) fn coalesce(
    &mut self,
    bp: usize,
  ) -> usize {
    let mem = self.arena.bytes();
    let size = block::read(mem, bp).size;

    let prev_bp = block::prev(mem, bp);
    let next_bp = bp + size;
    let prev = block::read(mem, prev_bp);
    let next = block::read(mem, next_bp);

    let (start, merged) = match (prev.allocated, next.allocated) {
      (true, true) => (bp, size),
      (true, false) => {
        self.free.remove(next_bp);
        (bp, size + next.size)
      }
      (false, true) => {
        self.free.remove(prev_bp);
        (prev_bp, prev.size + size)
      }
      (false, false) => {
        self.free.remove(prev_bp);
        self.free.remove(next_bp);
        (prev_bp, prev.size + size + next.size)
      }
    };

    if merged != size {
      block::write(self.arena.bytes_mut(), start, Block::free(merged));
      trace!(bp, start, size, merged, "coalesced");
    }

    self.free.insert(start, merged);

    start
  }
}
