//! # segalloc - A Segregated-Fit Memory Allocator
//!
//! This crate provides a general-purpose dynamic allocator that hands out
//! variably sized, individually releasable regions from one contiguous,
//! growable arena. Freed regions are merged with their neighbors right away
//! and reused through segregated free lists.
//!
//! ## Overview
//!
//! ```text
//!   Arena Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                              ARENA                                   │
//!   │                                                                      │
//!   │  ┌───┬──────┬────────┬──────────┬────────┬───────────────────┬───┐   │
//!   │  │pad│ pro  │ A1     │   free   │ A2     │       free        │epi│   │
//!   │  │   │ 8/a  │ 24/a   │   48/f   │ 112/a  │      3960/f       │0/a│   │
//!   │  └───┴──────┴────────┴──────────┴────────┴───────────────────┴───┘   │
//!   │                           │                        │            ▲    │
//!   │                           ▼                        ▼            │    │
//!   │                       bucket 5                 bucket 11     Arena   │
//!   │                                                               end    │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   The prologue and epilogue are permanently allocated sentinels, so
//!   neighbor lookups never fall off either end.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - align! rounding macro
//!   ├── block      - header/footer encoding and neighbor arithmetic
//!   ├── arena      - ArenaSource trait, VecArena, MmapArena
//!   ├── free_list  - 20 size-ordered segregated free lists
//!   ├── coalesce   - immediate merging of adjacent free blocks
//!   ├── placement  - good-fit search and splitting
//!   ├── allocator  - SegregatedAllocator: allocate / release / resize
//!   ├── handle     - move-only Allocation handle
//!   ├── inspect    - block walker, heap checker, statistics
//!   ├── config     - AllocatorConfig
//!   └── error      - error types
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::SegregatedAllocator;
//!
//! let mut allocator = SegregatedAllocator::new()?;
//!
//! let region = allocator.allocate(5)?.expect("non-zero request");
//! allocator.payload_mut(&region)?.copy_from_slice(b"hello");
//!
//! let region = allocator.resize(region, 64)?.expect("non-zero request");
//! assert_eq!(&allocator.payload(&region)?[..5], b"hello");
//!
//! allocator.release(region)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## How It Works
//!
//! Every block carries the same word at both ends:
//!
//! ```text
//!   Single Block:
//!   ┌────────────┬──────────────────────────────────────┬────────────┐
//!   │ header     │              payload                 │ footer     │
//!   │ size | a   │     (free: linked from a bucket)     │ size | a   │
//!   └────────────┴──────────────────────────────────────┴────────────┘
//!                ▲
//!                └── Allocation::offset()
//! ```
//!
//! - **allocate**: the request is rounded to an 8-byte multiple plus 8 bytes
//!   of overhead, then the bucket for that size is searched for the tightest
//!   fit. On a miss the arena grows by at least 4 KiB and the new space is
//!   merged with a free tail block before placement.
//! - **release**: the block is marked free and merged with free neighbors
//!   before it is filed in its bucket.
//! - **resize**: grows in place into a free successor when possible,
//!   otherwise moves the contents into a fresh block.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: operations take `&mut self`; share an
//!   instance behind a lock if needed.
//! - **No shrinking**: the arena never returns memory.
//! - **No compaction**: live blocks never move except through `resize`.
//!
//! ## Safety
//!
//! The arena is plain bytes addressed by offsets and every access is bounds
//! checked. Regions are only reachable through [`Allocation`] handles, which
//! are consumed by `release`, so double release does not compile.

pub mod align;
mod allocator;
pub mod arena;
pub mod block;
mod coalesce;
pub mod config;
mod error;
pub mod free_list;
mod handle;
mod inspect;
mod placement;

pub use allocator::SegregatedAllocator;
#[cfg(unix)]
pub use arena::MmapArena;
pub use arena::{ArenaSource, VecArena};
pub use config::AllocatorConfig;
pub use error::{AllocError, ArenaError, HeapCorruption, ResizeError};
pub use handle::Allocation;
pub use inspect::{BlockInfo, Blocks, HeapStats};
