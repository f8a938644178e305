use crate::error::{AllocationError, Result};

/// Tunables for a new [`Allocator`](crate::Allocator).
///
/// ```rust
/// use shaggymem::Config;
///
/// let config = Config::new(64 * 1024).page_size(4096).initial_records(256);
/// assert_eq!(config.initial_size, 64 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Requested storage in bytes, rounded up to a page.
  pub initial_size: u64,
  /// Page size override. `None` asks the page source.
  pub page_size: Option<u64>,
  /// Initial capacity of the allocation table.
  pub initial_records: usize,
  /// Initial capacity of the free-space index.
  pub initial_free: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      initial_size: 0,
      page_size: None,
      initial_records: 64,
      initial_free: 16,
    }
  }
}

impl Config {
  pub fn new(initial_size: u64) -> Self {
    Self {
      initial_size,
      ..Self::default()
    }
  }

  pub fn page_size(
    mut self,
    page_size: u64,
  ) -> Self {
    self.page_size = Some(page_size);
    self
  }

  pub fn initial_records(
    mut self,
    records: usize,
  ) -> Self {
    self.initial_records = records;
    self
  }

  pub fn initial_free(
    mut self,
    free: usize,
  ) -> Self {
    self.initial_free = free;
    self
  }

  /// Page size to use, given what the page source reports.
  pub(crate) fn resolve_page_size(
    &self,
    source_page_size: u64,
  ) -> Result<u64> {
    let page_size = self.page_size.unwrap_or(source_page_size);

    if !page_size.is_power_of_two() {
      return Err(AllocationError::InvalidPageSize(page_size));
    }

    Ok(page_size)
  }
}
