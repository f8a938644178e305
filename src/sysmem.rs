//! The operating-system side of the allocator.
//!
//! Everything the arena needs from the environment goes through this module:
//! reserving and releasing page-backed regions, raw byte copies and zeroing,
//! and the system page size.

use std::ptr::{self, NonNull};

use libc::{c_void, off_t};

/// A contiguous, writable region of memory obtained from a [`PageSource`].
///
/// A region does not release itself; it must be handed back to the source
/// that produced it.
#[derive(Debug)]
pub struct Region {
  ptr: NonNull<u8>,
  len: usize,
}

// SAFETY: a `Region` is the unique owner of its mapping, nothing else holds
// its address.
unsafe impl Send for Region {}

impl Region {
  /// A zero-length region that owns no memory.
  pub const fn empty() -> Self {
    Self {
      ptr: NonNull::dangling(),
      len: 0,
    }
  }

  /// # Safety
  ///
  /// `ptr` must be valid for reads and writes of `len` bytes for as long as
  /// the region lives.
  pub unsafe fn from_raw_parts(
    ptr: NonNull<u8>,
    len: usize,
  ) -> Self {
    Self { ptr, len }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn as_ptr(&self) -> *mut u8 {
    self.ptr.as_ptr()
  }
}

/// Source of page-backed memory.
pub trait PageSource {
  /// Granularity the storage is sized in.
  fn page_size(&self) -> u64;

  /// Reserves `size` bytes of zeroed, writable memory. `size` is never zero.
  fn reserve(&mut self, size: usize) -> Option<Region>;

  /// Returns a region obtained from [`PageSource::reserve`].
  fn release(&mut self, region: Region);
}

/// Anonymous private mappings via `mmap(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mmap;

impl PageSource for Mmap {
  fn page_size(&self) -> u64 {
    os_page_size()
  }

  fn reserve(&mut self, size: usize) -> Option<Region> {
    let ptr = unsafe {
      libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0 as off_t,
      )
    };

    if ptr == libc::MAP_FAILED {
      return None;
    }

    NonNull::new(ptr as *mut u8).map(|ptr| Region { ptr, len: size })
  }

  fn release(&mut self, region: Region) {
    if region.is_empty() {
      return;
    }

    unsafe { libc::munmap(region.as_ptr() as *mut c_void, region.len()) };
  }
}

/// The page size reported by the OS, 4096 when it cannot be queried.
pub fn os_page_size() -> u64 {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

  if size > 0 && (size as u64).is_power_of_two() {
    size as u64
  } else {
    4096
  }
}

/// Copies `size` bytes between non-overlapping locations.
///
/// # Safety
///
/// Both pointers must be valid for `size` bytes and the ranges must not
/// overlap.
pub unsafe fn copy(
  dst: *mut u8,
  src: *const u8,
  size: usize,
) {
  unsafe { ptr::copy_nonoverlapping(src, dst, size) };
}

/// Copies `size` bytes between possibly overlapping locations.
///
/// # Safety
///
/// Both pointers must be valid for `size` bytes.
pub unsafe fn move_within(
  dst: *mut u8,
  src: *const u8,
  size: usize,
) {
  unsafe { ptr::copy(src, dst, size) };
}

/// # Safety
///
/// `dst` must be valid for writes of `size` bytes.
pub unsafe fn zero(
  dst: *mut u8,
  size: usize,
) {
  unsafe { ptr::write_bytes(dst, 0, size) };
}
