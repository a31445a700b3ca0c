//! Arena extension primitive.
//!
//! An arena is one contiguous byte range that only ever grows at its end,
//! the way `sbrk` moves the program break. The allocator never gives bytes
//! back.

use crate::{config::DEFAULT_ARENA_LIMIT, error::ArenaError};

/// Contiguous, append-only backing store for the allocator.
pub trait ArenaSource {
  /// Appends `bytes` to the end of the arena and returns the previous
  /// length, which is the offset of the first new byte.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<usize, ArenaError>;

  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn bytes(&self) -> &[u8];

  fn bytes_mut(&mut self) -> &mut [u8];
}

fn exhausted(
  requested: usize,
  used: usize,
  limit: usize,
) -> ArenaError {
  ArenaError::Exhausted {
    requested,
    used,
    limit,
  }
}

/// Arena backed by a growable `Vec<u8>` with a hard capacity limit.
#[derive(Debug, Clone)]
pub struct VecArena {
  bytes: Vec<u8>,
  limit: usize,
}

impl VecArena {
  pub fn new(limit: usize) -> Self {
    Self {
      bytes: Vec::new(),
      limit,
    }
  }

  pub fn limit(&self) -> usize {
    self.limit
  }
}

impl Default for VecArena {
  fn default() -> Self {
    Self::new(DEFAULT_ARENA_LIMIT)
  }
}

impl ArenaSource for VecArena {
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Result<usize, ArenaError> {
    let old_len = self.bytes.len();

    match old_len.checked_add(bytes) {
      Some(new_len) if new_len <= self.limit => {
        self.bytes.resize(new_len, 0);
        Ok(old_len)
      }
      _ => Err(exhausted(bytes, old_len, self.limit)),
    }
  }

  fn len(&self) -> usize {
    self.bytes.len()
  }

  fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    &mut self.bytes
  }
}

#[cfg(unix)]
pub use mmap::MmapArena;

#[cfg(unix)]
mod mmap {
  use std::{io, ptr, slice};

  use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void};

  use super::{ArenaSource, exhausted};
  use crate::error::ArenaError;

  /// Arena carved out of one anonymous mapping reserved up front.
  ///
  /// ```text
  ///   base                      base + brk                 base + limit
  ///   ┌─────────────────────────┬──────────────────────────┐
  ///   │      managed bytes      │    reserved, untouched   │
  ///   └─────────────────────────┴──────────────────────────┘
  /// ```
  ///
  /// `extend` only moves the break; pages are faulted in by the kernel on
  /// first touch. The mapping is released when the arena is dropped.
  #[derive(Debug)]
  pub struct MmapArena {
    base: *mut u8,
    brk: usize,
    limit: usize,
  }

  impl MmapArena {
    pub fn reserve(limit: usize) -> Result<Self, ArenaError> {
      if limit == 0 {
        return Err(ArenaError::Reserve("zero-sized arena".to_string()));
      }

      let base = unsafe {
        libc::mmap(
          ptr::null_mut(),
          limit,
          PROT_READ | PROT_WRITE,
          MAP_PRIVATE | MAP_ANONYMOUS | MAP_NORESERVE,
          -1,
          0,
        )
      };

      if base == MAP_FAILED {
        return Err(ArenaError::Reserve(io::Error::last_os_error().to_string()));
      }

      Ok(Self {
        base: base as *mut u8,
        brk: 0,
        limit,
      })
    }

    pub fn limit(&self) -> usize {
      self.limit
    }
  }

  impl ArenaSource for MmapArena {
    fn extend(
      &mut self,
      bytes: usize,
    ) -> Result<usize, ArenaError> {
      let old_brk = self.brk;

      match old_brk.checked_add(bytes) {
        Some(new_brk) if new_brk <= self.limit => {
          self.brk = new_brk;
          Ok(old_brk)
        }
        _ => Err(exhausted(bytes, old_brk, self.limit)),
      }
    }

    fn len(&self) -> usize {
      self.brk
    }

    fn bytes(&self) -> &[u8] {
      // The first `brk` bytes lie inside the live mapping and are only
      // reachable through `&self`/`&mut self`.
      unsafe { slice::from_raw_parts(self.base, self.brk) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
      unsafe { slice::from_raw_parts_mut(self.base, self.brk) }
    }
  }

  impl Drop for MmapArena {
    fn drop(&mut self) {
      unsafe {
        libc::munmap(self.base as *mut c_void, self.limit);
      }
    }
  }
}
