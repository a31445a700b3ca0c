use thiserror::Error;

use crate::handle::Allocation;

/// Failure of the arena extension primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
  #[error("arena exhausted: {requested} more bytes requested, {used} of {limit} in use")]
  Exhausted {
    requested: usize,
    used: usize,
    limit: usize,
  },

  #[error("failed to reserve arena address space: {0}")]
  Reserve(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error("out of memory: {0}")]
  OutOfMemory(#[from] ArenaError),

  #[error("request of {0} bytes exceeds the largest encodable block")]
  TooLarge(usize),

  #[error("allocation was handed out by a different allocator")]
  ForeignAllocation,
}

/// A failed resize. The original allocation is untouched and handed back.
#[derive(Debug, Error)]
#[error("resize failed: {source}")]
pub struct ResizeError {
  source: AllocError,
  original: Option<Allocation>,
}

impl ResizeError {
  pub(crate) fn new(
    source: AllocError,
    original: Option<Allocation>,
  ) -> Self {
    Self { source, original }
  }

  pub fn error(&self) -> &AllocError {
    &self.source
  }

  /// Returns the allocation passed to `resize`, still valid and unchanged.
  pub fn into_original(self) -> Option<Allocation> {
    self.original
  }
}

/// Inconsistency found by [`SegregatedAllocator::check`](crate::SegregatedAllocator::check).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("heap corrupted at offset {offset}: {reason}")]
pub struct HeapCorruption {
  pub offset: usize,
  pub reason: String,
}

impl HeapCorruption {
  pub(crate) fn new(
    offset: usize,
    reason: impl Into<String>,
  ) -> Self {
    Self {
      offset,
      reason: reason.into(),
    }
  }
}
