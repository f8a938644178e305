use std::{mem, slice};

use crate::align::page_align;
use crate::error::{AllocationError, Result};
use crate::sysmem::{self, PageSource, Region};

/// The raw bytes behind an allocator.
///
/// Relocation always reserves the new region before touching the old one,
/// so a failed resize leaves the current bytes where they were.
pub(crate) struct Storage<S: PageSource> {
  source: S,
  region: Region,
  page_size: u64,
}

impl<S: PageSource> Storage<S> {
  pub fn new(
    mut source: S,
    page_size: u64,
    size: u64,
  ) -> Result<Self> {
    let size = round(size, page_size)?;
    let region = reserve(&mut source, size)?;

    Ok(Self {
      source,
      region,
      page_size,
    })
  }

  pub fn size(&self) -> u64 {
    self.region.len() as u64
  }

  pub fn page_size(&self) -> u64 {
    self.page_size
  }

  #[cfg(test)]
  pub fn source(&self) -> &S {
    &self.source
  }

  /// Rounds `size` up to this storage's page size.
  pub fn round(
    &self,
    size: u64,
  ) -> Result<u64> {
    round(size, self.page_size)
  }

  /// Moves to a fresh region of `size` bytes, carrying the first `keep`
  /// bytes over.
  pub fn relocate(
    &mut self,
    size: u64,
    keep: u64,
  ) -> Result<()> {
    debug_assert!(keep <= size && keep <= self.size());

    let region = reserve(&mut self.source, size)?;

    if keep > 0 {
      unsafe { sysmem::copy(region.as_ptr(), self.region.as_ptr(), keep as usize) };
    }

    let old = mem::replace(&mut self.region, region);
    self.source.release(old);

    Ok(())
  }

  pub fn bytes(
    &self,
    offset: u64,
    len: u64,
  ) -> &[u8] {
    self.check(offset, len);

    unsafe { slice::from_raw_parts(self.region.as_ptr().add(offset as usize), len as usize) }
  }

  pub fn bytes_mut(
    &mut self,
    offset: u64,
    len: u64,
  ) -> &mut [u8] {
    self.check(offset, len);

    unsafe { slice::from_raw_parts_mut(self.region.as_ptr().add(offset as usize), len as usize) }
  }

  /// Copies `len` bytes from `src` to `dst`; the ranges may overlap.
  pub fn copy(
    &mut self,
    src: u64,
    dst: u64,
    len: u64,
  ) {
    self.check(src, len);
    self.check(dst, len);

    let base = self.region.as_ptr();
    unsafe { sysmem::move_within(base.add(dst as usize), base.add(src as usize), len as usize) };
  }

  pub fn zero(
    &mut self,
    offset: u64,
    len: u64,
  ) {
    self.check(offset, len);

    unsafe { sysmem::zero(self.region.as_ptr().add(offset as usize), len as usize) };
  }

  fn check(
    &self,
    offset: u64,
    len: u64,
  ) {
    assert!(
      offset.checked_add(len).is_some_and(|end| end <= self.size()),
      "range {offset}+{len} outside storage of {} bytes",
      self.size()
    );
  }
}

impl<S: PageSource> Drop for Storage<S> {
  fn drop(&mut self) {
    let region = mem::replace(&mut self.region, Region::empty());
    self.source.release(region);
  }
}

fn round(
  size: u64,
  page_size: u64,
) -> Result<u64> {
  page_align(size, page_size)
    .filter(|&size| size <= isize::MAX as u64)
    .ok_or(AllocationError::InvalidSize)
}

fn reserve<S: PageSource>(
  source: &mut S,
  size: u64,
) -> Result<Region> {
  if size == 0 {
    return Ok(Region::empty());
  }

  source.reserve(size as usize).ok_or(AllocationError::OutOfMemory)
}
