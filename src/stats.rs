/// Point-in-time view of an allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
  pub storage_size: u64,
  pub storage_used: u64,
  /// Sum of all free records.
  pub free_bytes: u64,
  pub free_max: u64,
  pub allocated_records: usize,
  pub free_records: usize,
  /// Successful allocations over the allocator's lifetime.
  pub allocations: u64,
  pub deallocations: u64,
  pub storage_grows: u64,
  pub storage_shrinks: u64,
  pub compactions: u64,
}

impl Stats {
  /// Share of free bytes that cannot be handed out in one piece.
  pub fn fragmentation(&self) -> f64 {
    if self.free_bytes == 0 {
      return 0.0;
    }

    1.0 - self.free_max as f64 / self.free_bytes as f64
  }

  pub fn utilization(&self) -> f64 {
    if self.storage_size == 0 {
      return 0.0;
    }

    self.storage_used as f64 / self.storage_size as f64
  }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
  pub allocations: u64,
  pub deallocations: u64,
  pub storage_grows: u64,
  pub storage_shrinks: u64,
  pub compactions: u64,
}
