use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::block::Block;

/// Identifies the allocator that issued a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocatorId(u64);

impl AllocatorId {
  pub(crate) fn next() -> Self {
    static NEXT: AtomicU64 = AtomicU64::new(1);

    Self(NEXT.fetch_add(1, Ordering::Relaxed))
  }
}

/// A handle to an allocation.
///
/// The id is the identity; `offset` and `size` are a snapshot taken when
/// the handle was produced and go stale after `compress`, `grow_storage` or
/// `shrink_storage`. Ask the allocator (`offset`, `size`, `refresh`) for the
/// current values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
  allocator: AllocatorId,
  id: u64,
  offset: u64,
  size: u64,
}

impl Allocation {
  pub(crate) fn new(
    allocator: AllocatorId,
    block: &Block,
  ) -> Self {
    Self {
      allocator,
      id: block.id,
      offset: block.offset,
      size: block.size,
    }
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  /// Cached offset.
  pub fn offset(&self) -> u64 {
    self.offset
  }

  /// Cached size.
  pub fn size(&self) -> u64 {
    self.size
  }

  pub fn allocator(&self) -> AllocatorId {
    self.allocator
  }
}

impl fmt::Display for Allocation {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "#{} [{}..{})", self.id, self.offset, self.offset + self.size)
  }
}
