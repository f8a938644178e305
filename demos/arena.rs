use std::io::Read;

use shaggymem::{Allocation, Allocator, Config};
use tracing_subscriber::EnvFilter;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect the process with `pmap` or `gdb` between
/// steps and watch the mapping move as storage grows and shrinks.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints one line per record the arena reports as live.
fn print_layout(
  label: &str,
  arena: &Allocator,
) {
  let stats = arena.stats();

  println!(
    "[{}] storage = {} bytes, used = {}, freeMax = {}, fragmentation = {:.2}",
    label,
    stats.storage_size,
    stats.storage_used,
    stats.free_max,
    stats.fragmentation(),
  );

  for allocation in arena.allocations() {
    println!("    {}", allocation);
  }
}

fn print_handle(
  arena: &Allocator,
  handle: &Allocation,
) {
  println!(
    "    handle {} cached offset = {}, current offset = {:?}",
    handle.id(),
    handle.offset(),
    arena.offset(handle),
  );
}

fn main() -> shaggymem::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let mut arena = Allocator::with_config(Config::new(4096))?;
  print_layout("start", &arena);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Three neighbours. Each one is carved from the front of the free tail.
  // --------------------------------------------------------------------
  let a = arena.allocate(512)?;
  let b = arena.allocate(512)?;
  let c = arena.allocate(512)?;

  arena.bytes_mut(&a)?.fill(0xAA);
  arena.bytes_mut(&b)?.fill(0xBB);
  arena.bytes_mut(&c)?.fill(0xCC);

  print_layout("1: three allocations", &arena);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Free the middle one and leave a hole behind.
  // --------------------------------------------------------------------
  arena.deallocate(&b)?;
  print_layout("2: hole in the middle", &arena);

  match arena.deallocate(&b) {
    Ok(()) => println!("    second free went through?"),
    Err(err) => println!("    second free rejected: {}", err),
  }
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Ask for more than the storage holds. It grows and `a` survives.
  // --------------------------------------------------------------------
  let big = arena.allocate(16 * 1024)?;
  print_layout("3: after growth", &arena);
  println!("    a still reads 0x{:X}", arena.bytes(&a)?[0]);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Compress: `c` slides down into the hole, keeping its id.
  // --------------------------------------------------------------------
  arena.deallocate(&big)?;
  let moved = arena.compress();
  print_layout("4: compressed", &arena);
  println!("    moved {} bytes", moved);
  print_handle(&arena, &c);
  println!("    c still reads 0x{:X}", arena.bytes(&c)?[0]);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Give the unused tail back to the OS.
  // --------------------------------------------------------------------
  arena.shrink_storage(arena.storage_used())?;
  print_layout("5: shrunk", &arena);

  println!("\n[6] End of example. Dropping the arena unmaps its storage.");
  arena.destroy();

  Ok(())
}
