//! Fit search and block splitting.

use tracing::trace;

use crate::{
  allocator::SegregatedAllocator,
  arena::ArenaSource,
  block::{self, Block, MIN_BLOCK_SIZE},
  free_list::{BUCKET_COUNT, bucket_for},
};

impl<A: ArenaSource> SegregatedAllocator<A> {
  /// Good fit within a bucket: starting at the bucket for `asize`, returns
  /// the tightest fitting block of the first bucket that has any fit at
  /// all. Larger buckets are only consulted while nothing fits. An exact
  /// match ends the search immediately.
  pub(crate) fn find_fit(
    &self,
    asize: usize,
  ) -> Option<usize> {
    for index in bucket_for(asize)..BUCKET_COUNT {
      let mut best: Option<(usize, usize)> = None;

      for (bp, size) in self.free.bucket(index) {
        let Some(slack) = size.checked_sub(asize) else {
          continue;
        };

        if slack == 0 {
          return Some(bp);
        }

        if best.is_none_or(|(_, best_slack)| slack < best_slack) {
          best = Some((bp, slack));
        }
      }

      if let Some((bp, _)) = best {
        return Some(bp);
      }
    }

    None
  }

  /// Turns the free block at `bp` into an allocated block of `asize` bytes,
  /// splitting off the remainder as a new free block when it can stand on
  /// its own. Returns `bp`.
  pub(crate) fn place(
    &mut self,
    bp: usize,
    asize: usize,
  ) -> usize {
    self.free.remove(bp);

    let mem = self.arena.bytes_mut();
    let size = block::read(mem, bp).size;
    let remainder = size - asize;

    if remainder < MIN_BLOCK_SIZE {
      block::write(mem, bp, Block::allocated(size));
    } else {
      let rest = bp + asize;

      block::write(mem, bp, Block::allocated(asize));
      block::write(mem, rest, Block::free(remainder));
      self.free.insert(rest, remainder);

      trace!(bp, asize, rest, remainder, "split");
    }

    bp
  }
}
