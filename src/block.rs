//! Block layout: header/footer words and neighbor arithmetic.
//!
//! ```text
//!   bp - 4        bp                                  bp + size - 8
//!   ┌────────────┬───────────────────────────────────┬────────────┐
//!   │ header     │ payload                           │ footer     │
//!   │ size | a   │                                   │ size | a   │
//!   └────────────┴───────────────────────────────────┴────────────┘
//!                                                                 ▲
//!                                            next bp = bp + size ─┘
//! ```
//!
//! Blocks are addressed by their payload offset (`bp`) inside the arena
//! bytes. A word packs the block size (a multiple of 8) with status bits in
//! its low three bits; only bit 0 (allocated) is used, bits 1-2 are reserved
//! and always written as zero.

/// Size of a header or footer word.
pub const WORD_SIZE: usize = 4;

/// Header plus footer.
pub const DWORD_SIZE: usize = 2 * WORD_SIZE;

/// Granularity of block sizes and payload offsets.
pub const ALIGNMENT: usize = 8;

/// Header + footer + room for two free-list links.
pub const MIN_BLOCK_SIZE: usize = 2 * DWORD_SIZE;

/// Requests up to this many bytes get a minimum-size block.
pub const MIN_PAYLOAD: usize = DWORD_SIZE;

const ALLOCATED_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

/// Largest size a header word can encode.
pub const MAX_BLOCK_SIZE: usize = (u32::MAX & SIZE_MASK) as usize;

/// Decoded contents of a header or footer word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  pub size: usize,
  pub allocated: bool,
}

impl Block {
  pub fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    Self { size, allocated }
  }

  pub fn free(size: usize) -> Self {
    Self::new(size, false)
  }

  pub fn allocated(size: usize) -> Self {
    Self::new(size, true)
  }

  pub fn pack(self) -> u32 {
    debug_assert!(self.size <= MAX_BLOCK_SIZE && self.size % ALIGNMENT == 0);

    (self.size as u32 & SIZE_MASK) | if self.allocated { ALLOCATED_BIT } else { 0 }
  }

  pub fn unpack(word: u32) -> Self {
    Self {
      size: (word & SIZE_MASK) as usize,
      allocated: word & ALLOCATED_BIT != 0,
    }
  }
}

/// Adjusted block size for a request of `size` payload bytes, or `None` when
/// the result would not fit in a header word.
pub fn adjusted_size(size: usize) -> Option<usize> {
  if size <= MIN_PAYLOAD {
    return Some(MIN_BLOCK_SIZE);
  }

  let padded = size.checked_add(DWORD_SIZE + ALIGNMENT - 1)?;
  let asize = padded & !(ALIGNMENT - 1);

  (asize <= MAX_BLOCK_SIZE).then_some(asize)
}

pub fn read_word(
  mem: &[u8],
  at: usize,
) -> u32 {
  let mut word = [0u8; WORD_SIZE];
  word.copy_from_slice(&mem[at..at + WORD_SIZE]);
  u32::from_le_bytes(word)
}

pub fn write_word(
  mem: &mut [u8],
  at: usize,
  value: u32,
) {
  mem[at..at + WORD_SIZE].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn header(bp: usize) -> usize {
  bp - WORD_SIZE
}

#[inline]
pub fn footer(
  bp: usize,
  size: usize,
) -> usize {
  bp + size - DWORD_SIZE
}

/// Reads the block whose payload starts at `bp`.
pub fn read(
  mem: &[u8],
  bp: usize,
) -> Block {
  Block::unpack(read_word(mem, header(bp)))
}

/// Reads the footer of the block that starts at `bp`.
pub fn read_footer(
  mem: &[u8],
  bp: usize,
) -> Block {
  let size = read(mem, bp).size;
  Block::unpack(read_word(mem, footer(bp, size)))
}

/// Writes header and footer of the block at `bp`. The two words are always
/// written together so traversal in both directions stays consistent.
pub fn write(
  mem: &mut [u8],
  bp: usize,
  block: Block,
) {
  let word = block.pack();
  write_word(mem, header(bp), word);
  write_word(mem, footer(bp, block.size), word);
}

/// Writes a lone header, used only for the size-0 epilogue.
pub fn write_header(
  mem: &mut [u8],
  bp: usize,
  block: Block,
) {
  write_word(mem, header(bp), block.pack());
}

/// Payload offset of the physically following block.
pub fn next(
  mem: &[u8],
  bp: usize,
) -> usize {
  bp + read(mem, bp).size
}

/// Payload offset of the physically preceding block, found through the
/// footer word that sits right before this block's header.
pub fn prev(
  mem: &[u8],
  bp: usize,
) -> usize {
  bp - Block::unpack(read_word(mem, bp - DWORD_SIZE)).size
}
