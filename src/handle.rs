use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ALLOCATOR_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_allocator_id() -> u64 {
  NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed)
}

/// Owned region handed out by a [`SegregatedAllocator`](crate::SegregatedAllocator).
///
/// The handle is move-only: releasing or resizing consumes it, so a region
/// cannot be released twice. It carries the id of the allocator that created
/// it, and using it with any other instance is rejected at runtime.
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
  offset: usize,
  len: usize,
  owner: u64,
}

impl Allocation {
  pub(crate) fn new(
    offset: usize,
    len: usize,
    owner: u64,
  ) -> Self {
    Self { offset, len, owner }
  }

  /// Payload offset inside the arena. Stable for the lifetime of the handle.
  pub fn offset(&self) -> usize {
    self.offset
  }

  /// Number of bytes requested for this region.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub(crate) fn owner(&self) -> u64 {
    self.owner
  }
}
