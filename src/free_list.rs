//! Segregated free lists.
//!
//! ```text
//!   bucket  0   1   2   3   4         5          ...  19
//!           ·   ·   ·   ·   │         │                │
//!                           ▼         ▼                ▼
//!                          [16]⇄[16] [32]⇄[40]⇄[56]   [1 MiB]⇄[4 MiB]
//! ```
//!
//! Each bucket is a doubly linked list of free blocks kept in ascending size
//! order. Links are arena offsets held in a side table keyed by the block's
//! payload offset, so a free block's payload bytes are never reinterpreted.

use std::collections::HashMap;

pub const BUCKET_COUNT: usize = 20;

/// Bucket for a block of `size` bytes: roughly `floor(log2(size))`, clamped
/// to the last bucket.
pub fn bucket_for(mut size: usize) -> usize {
  let mut index = 0;

  while size > 1 && index < BUCKET_COUNT - 1 {
    size >>= 1;
    index += 1;
  }

  index
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Node {
  size: usize,
  next: Option<usize>,
  prev: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct FreeLists {
  heads: [Option<usize>; BUCKET_COUNT],
  nodes: HashMap<usize, Node>,
}

impl FreeLists {
  pub fn new() -> Self {
    Self::default()
  }

  /// Splices `bp` in front of the first entry of its bucket whose size is
  /// at least `size`, or at the tail if there is none.
  pub fn insert(
    &mut self,
    bp: usize,
    size: usize,
  ) {
    debug_assert!(!self.nodes.contains_key(&bp), "block {bp} indexed twice");

    let index = bucket_for(size);
    let mut prev = None;
    let mut next = self.heads[index];

    while let Some(candidate) = next {
      let node = self.nodes[&candidate];
      if node.size >= size {
        break;
      }
      prev = next;
      next = node.next;
    }

    match prev {
      Some(prev) => self.link_mut(prev).next = Some(bp),
      None => self.heads[index] = Some(bp),
    }

    if let Some(next) = next {
      self.link_mut(next).prev = Some(bp);
    }

    self.nodes.insert(bp, Node { size, next, prev });
  }

  /// Unlinks `bp` and returns the size it was indexed under, or `None` if
  /// it was not indexed.
  pub fn remove(
    &mut self,
    bp: usize,
  ) -> Option<usize> {
    let node = self.nodes.remove(&bp)?;

    if let Some(next) = node.next {
      self.link_mut(next).prev = node.prev;
    }

    match node.prev {
      Some(prev) => self.link_mut(prev).next = node.next,
      None => self.heads[bucket_for(node.size)] = node.next,
    }

    Some(node.size)
  }

  pub fn contains(
    &self,
    bp: usize,
  ) -> bool {
    self.nodes.contains_key(&bp)
  }

  pub fn size_of(
    &self,
    bp: usize,
  ) -> Option<usize> {
    self.nodes.get(&bp).map(|node| node.size)
  }

  /// Number of indexed free blocks across all buckets.
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Walks one bucket from head to tail, yielding `(bp, size)`.
  pub fn bucket(
    &self,
    index: usize,
  ) -> Bucket<'_> {
    Bucket {
      lists: self,
      current: self.heads[index],
    }
  }

  /// Verifies the links of every bucket: back pointers mirror forward
  /// pointers, entries sit in the right bucket in ascending size order, and
  /// every node is reachable from a head.
  pub fn validate(&self) -> Result<(), (usize, &'static str)> {
    let mut reachable = 0;

    for index in 0..BUCKET_COUNT {
      let mut prev: Option<(usize, usize)> = None;
      let mut current = self.heads[index];

      while let Some(bp) = current {
        let node = self.nodes.get(&bp).ok_or((bp, "dangling free-list link"))?;

        if bucket_for(node.size) != index {
          return Err((bp, "free block filed under the wrong bucket"));
        }
        if node.prev != prev.map(|(prev_bp, _)| prev_bp) {
          return Err((bp, "free-list back link does not match"));
        }
        if let Some((_, prev_size)) = prev {
          if prev_size > node.size {
            return Err((bp, "bucket not ordered by ascending size"));
          }
        }

        reachable += 1;
        if reachable > self.nodes.len() {
          return Err((bp, "cycle in free list"));
        }

        prev = Some((bp, node.size));
        current = node.next;
      }
    }

    if reachable != self.nodes.len() {
      return Err((0, "free-list node not reachable from any bucket"));
    }

    Ok(())
  }

  fn link_mut(
    &mut self,
    bp: usize,
  ) -> &mut Node {
    self
      .nodes
      .get_mut(&bp)
      .expect("free list links to an unindexed block")
  }
}

/// Iterator over one bucket, see [`FreeLists::bucket`].
pub struct Bucket<'a> {
  lists: &'a FreeLists,
  current: Option<usize>,
}

impl Iterator for Bucket<'_> {
  type Item = (usize, usize);

  fn next(&mut self) -> Option<Self::Item> {
    let bp = self.current?;
    let node = self.lists.nodes.get(&bp)?;

    self.current = node.next;

    Some((bp, node.size))
  }
}
