use segalloc::SegregatedAllocator;
use tracing::Level;

/// Prints every block between prologue and epilogue, in address order.
fn print_blocks(
  allocator: &SegregatedAllocator,
  label: &str,
) {
  println!("\n[{}] arena = {} bytes", label, allocator.arena_size());

  for info in allocator.blocks() {
    println!(
      "    {:>6}  {:>6} bytes  {}",
      info.offset,
      info.size,
      if info.allocated { "allocated" } else { "free" }
    );
  }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt().with_max_level(Level::TRACE).init();

  let mut allocator = SegregatedAllocator::new()?;
  print_blocks(&allocator, "start");

  // --------------------------------------------------------------------
  // 1) Two small allocations are carved out of the initial 64-byte chunk.
  // --------------------------------------------------------------------
  let first = allocator.allocate(24)?.ok_or("zero-sized request")?;
  let second = allocator.allocate(8)?.ok_or("zero-sized request")?;
  allocator.payload_mut(&first)?.fill(0xAB);
  print_blocks(&allocator, "1: allocate 24 + 8");

  // --------------------------------------------------------------------
  // 2) Releasing the first block and asking for less reuses it.
  // --------------------------------------------------------------------
  let first_offset = first.offset();
  allocator.release(first)?;
  let third = allocator.allocate(16)?.ok_or("zero-sized request")?;
  println!(
    "\n[2] third == first? {}",
    if third.offset() == first_offset {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );

  // --------------------------------------------------------------------
  // 3) A request larger than any free block grows the arena.
  // --------------------------------------------------------------------
  let big = allocator.allocate(64 * 1024)?.ok_or("zero-sized request")?;
  print_blocks(&allocator, "3: allocate 64 KiB");

  // --------------------------------------------------------------------
  // 4) Releasing neighbors merges them back into one free block.
  // --------------------------------------------------------------------
  allocator.release(second)?;
  allocator.release(third)?;
  allocator.release(big)?;
  print_blocks(&allocator, "4: release everything");

  allocator.check()?;
  println!("\n[5] heap consistent: {:?}", allocator.stats());

  Ok(())
}
