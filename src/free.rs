//! The free-space index: ids of free records plus the size of the largest.

use crate::error::{AllocationError, Result};
use crate::table::Table;

pub(crate) struct FreeIndex {
  ids: Vec<u64>,
  capacity: usize,
  max: u64,
}

impl FreeIndex {
  pub fn with_capacity(entries: usize) -> Result<Self> {
    let mut index = Self {
      ids: Vec::new(),
      capacity: 0,
      max: 0,
    };

    if entries > 0 {
      index.grow(entries)?;
    }

    Ok(index)
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn used(&self) -> usize {
    self.ids.len()
  }

  /// Largest free record, 0 when there is none.
  pub fn max(&self) -> u64 {
    self.max
  }

  pub fn ids(&self) -> &[u64] {
    &self.ids
  }

  #[cfg(test)]
  pub fn contains(
    &self,
    id: u64,
  ) -> bool {
    self.ids.contains(&id)
  }

  /// Makes room for `entries` inserts that cannot fail.
  pub fn reserve(
    &mut self,
    entries: usize,
  ) -> Result<()> {
    let spare = self.capacity - self.ids.len();

    if entries > spare {
      self.grow(entries - spare)?;
    }

    Ok(())
  }

  pub fn grow(
    &mut self,
    min_new: usize,
  ) -> Result<()> {
    let added = min_new.max(self.capacity).max(1);
    let capacity = self
      .capacity
      .checked_add(added)
      .ok_or(AllocationError::OutOfMemory)?;

    self.ids.try_reserve_exact(capacity - self.ids.len())?;

    self.capacity = capacity;
    Ok(())
  }

  /// Requires a prior [`FreeIndex::reserve`]. Callers keep `max` current.
  pub fn insert(
    &mut self,
    id: u64,
  ) {
    debug_assert!(self.ids.len() < self.capacity);

    self.ids.push(id);
  }

  pub fn remove(
    &mut self,
    id: u64,
  ) -> bool {
    match self.ids.iter().position(|&i| i == id) {
      Some(index) => {
        self.ids.remove(index);
        true
      }
      None => false,
    }
  }

  pub fn clear(&mut self) {
    self.ids.clear();
    self.max = 0;
  }

  /// Lowest-offset free record of at least `size` bytes.
  pub fn first_fit(
    &self,
    size: u64,
    table: &Table,
  ) -> Option<usize> {
    if size > self.max {
      return None;
    }

    self
      .ids
      .iter()
      .filter_map(|&id| table.lookup(id))
      .filter(|&slot| table.get(slot).size >= size)
      .min_by_key(|&slot| table.get(slot).offset)
  }

  /// Folds a record that just became free, or just grew, into `max`.
  pub fn raise_max(
    &mut self,
    size: u64,
  ) {
    self.max = self.max.max(size);
  }

  /// Rescans every entry. Needed whenever a free record shrinks or leaves.
  pub fn update_max(
    &mut self,
    table: &Table,
  ) -> u64 {
    self.max = self
      .ids
      .iter()
      .filter_map(|&id| table.find(id))
      .map(|block| block.size)
      .max()
      .unwrap_or(0);

    self.max
  }
}
