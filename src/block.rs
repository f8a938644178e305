/// Bookkeeping for one range of storage, allocated or free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  pub id: u64,
  pub offset: u64,
  pub size: u64,
  pub allocated: bool,
}

impl Block {
  pub fn new(
    id: u64,
    offset: u64,
    size: u64,
    allocated: bool,
  ) -> Self {
    Self {
      id,
      offset,
      size,
      allocated,
    }
  }

  /// One past the last byte.
  pub fn end(&self) -> u64 {
    self.offset + self.size
  }

  pub fn is_free(&self) -> bool {
    !self.allocated
  }

  /// Whether `next` starts exactly where `self` ends.
  pub fn precedes(
    &self,
    next: &Block,
  ) -> bool {
    self.end() == next.offset
  }
}
