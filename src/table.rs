//! The allocation table.
//!
//! ```text
//!   slots     ┌────┬────┬────┬────┬────┬ ─ ─ ─ ─ ┐
//!             │ #4 │ #7 │ -- │ #9 │ #8 │  spare   capacity
//!             └────┴────┴────┴────┴────┴ ─ ─ ─ ─ ┘
//!                          ▲
//!   unused    [2] ─────────┘   rows to refill before pushing
//!
//!   ids       {4: 0, 7: 1, 8: 4, 9: 3}
//!   by_offset {0: 1, 100: 0, 228: 4, 4000: 3}   neighbours in O(log n)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};

use crate::block::Block;
use crate::error::{AllocationError, Result};

/// Row stored in slots that sit in the unused pool.
const VACANT: Block = Block {
  id: 0,
  offset: 0,
  size: 0,
  allocated: false,
};

pub(crate) struct Table {
  slots: Vec<Block>,
  capacity: usize,
  unused: Vec<usize>,
  unused_capacity: usize,
  ids: HashMap<u64, usize>,
  by_offset: BTreeMap<u64, usize>,
  next_id: u64,
}

impl Table {
  pub fn with_capacity(records: usize) -> Result<Self> {
    let mut table = Self {
      slots: Vec::new(),
      capacity: 0,
      unused: Vec::new(),
      unused_capacity: 0,
      ids: HashMap::new(),
      by_offset: BTreeMap::new(),
      next_id: 1,
    };

    if records > 0 {
      table.grow(records)?;
    }

    Ok(table)
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Rows handed out so far, vacant ones included.
  pub fn used(&self) -> usize {
    self.slots.len()
  }

  pub fn unused_capacity(&self) -> usize {
    self.unused_capacity
  }

  pub fn unused_used(&self) -> usize {
    self.unused.len()
  }

  /// Records currently describing storage.
  pub fn live(&self) -> usize {
    self.slots.len() - self.unused.len()
  }

  /// Makes room for `records` inserts that cannot fail.
  pub fn reserve(
    &mut self,
    records: usize,
  ) -> Result<()> {
    let available = self.unused.len() + (self.capacity - self.slots.len());

    if records > available {
      self.grow(records - available)?;
    }

    Ok(())
  }

  /// Grows the table by at least `min_new` rows, doubling when that is more.
  ///
  /// The unused pool is grown alongside so it can always take back every row.
  pub fn grow(
    &mut self,
    min_new: usize,
  ) -> Result<()> {
    let added = min_new.max(self.capacity).max(1);
    let capacity = self
      .capacity
      .checked_add(added)
      .ok_or(AllocationError::OutOfMemory)?;

    self.slots.try_reserve_exact(capacity - self.slots.len())?;
    self.ids.try_reserve(capacity - self.ids.len())?;

    if self.unused_capacity < capacity {
      self.grow_unused(capacity - self.unused_capacity)?;
    }

    self.capacity = capacity;
    Ok(())
  }

  pub fn grow_unused(
    &mut self,
    min_new: usize,
  ) -> Result<()> {
    let added = min_new.max(self.unused_capacity).max(1);
    let capacity = self
      .unused_capacity
      .checked_add(added)
      .ok_or(AllocationError::OutOfMemory)?;

    self.unused.try_reserve_exact(capacity - self.unused.len())?;

    self.unused_capacity = capacity;
    Ok(())
  }

  /// Adds a record under a fresh id. Requires a prior [`Table::reserve`].
  pub fn insert(
    &mut self,
    offset: u64,
    size: u64,
    allocated: bool,
  ) -> usize {
    let block = Block::new(self.issue(), offset, size, allocated);

    let slot = match self.unused.pop() {
      Some(slot) => {
        self.slots[slot] = block;
        slot
      }
      None => {
        debug_assert!(self.slots.len() < self.capacity);
        self.slots.push(block);
        self.slots.len() - 1
      }
    };

    self.ids.insert(block.id, slot);
    self.by_offset.insert(offset, slot);
    slot
  }

  /// Retires a record, returning its row to the unused pool.
  pub fn destroy(
    &mut self,
    slot: usize,
  ) -> Block {
    let block = std::mem::replace(&mut self.slots[slot], VACANT);

    self.ids.remove(&block.id);
    self.unlink(block.offset, slot);
    self.unused.push(slot);
    block
  }

  pub fn get(
    &self,
    slot: usize,
  ) -> &Block {
    &self.slots[slot]
  }

  pub fn lookup(
    &self,
    id: u64,
  ) -> Option<usize> {
    self.ids.get(&id).copied()
  }

  pub fn find(
    &self,
    id: u64,
  ) -> Option<&Block> {
    self.lookup(id).map(|slot| self.get(slot))
  }

  /// Whether `id` was ever handed out by this table.
  pub fn issued(
    &self,
    id: u64,
  ) -> bool {
    id != 0 && id < self.next_id
  }

  /// Gives the record in `slot` a fresh id.
  pub fn reissue(
    &mut self,
    slot: usize,
  ) -> u64 {
    let id = self.issue();
    let old = std::mem::replace(&mut self.slots[slot].id, id);

    self.ids.remove(&old);
    self.ids.insert(id, slot);
    id
  }

  pub fn set_allocated(
    &mut self,
    slot: usize,
    allocated: bool,
  ) {
    self.slots[slot].allocated = allocated;
  }

  pub fn set_size(
    &mut self,
    slot: usize,
    size: u64,
  ) {
    self.slots[slot].size = size;
  }

  pub fn set_offset(
    &mut self,
    slot: usize,
    offset: u64,
  ) {
    let old = std::mem::replace(&mut self.slots[slot].offset, offset);

    self.unlink(old, slot);
    self.by_offset.insert(offset, slot);
  }

  /// Record immediately before `slot` in storage order.
  pub fn left_of(
    &self,
    slot: usize,
  ) -> Option<usize> {
    let offset = self.slots[slot].offset;

    self.by_offset.range(..offset).next_back().map(|(_, &s)| s)
  }

  /// Record immediately after `slot` in storage order.
  pub fn right_of(
    &self,
    slot: usize,
  ) -> Option<usize> {
    let offset = self.slots[slot].offset;

    self
      .by_offset
      .range((Excluded(offset), Unbounded))
      .next()
      .map(|(_, &s)| s)
  }

  /// Record at the end of storage.
  pub fn last(&self) -> Option<usize> {
    self.by_offset.last_key_value().map(|(_, &s)| s)
  }

  /// First record starting at or after `offset`.
  pub fn next_from(
    &self,
    offset: u64,
  ) -> Option<usize> {
    self.by_offset.range(offset..).next().map(|(_, &s)| s)
  }

  pub fn by_offset(&self) -> impl Iterator<Item = usize> + '_ {
    self.by_offset.values().copied()
  }

  /// End of the last allocated record, 0 when nothing is allocated.
  pub fn allocated_end(&self) -> u64 {
    self
      .by_offset
      .values()
      .rev()
      .map(|&slot| &self.slots[slot])
      .find(|block| block.allocated)
      .map_or(0, Block::end)
  }

  fn issue(&mut self) -> u64 {
    let id = self.next_id;
    self.next_id += 1;
    id
  }

  /// Drops the offset entry only if it still points at `slot`; compaction can
  /// move another record onto the key first.
  fn unlink(
    &mut self,
    offset: u64,
    slot: usize,
  ) {
    if self.by_offset.get(&offset) == Some(&slot) {
      self.by_offset.remove(&offset);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_insert_and_lookup() {
    let mut table = Table::with_capacity(4).unwrap();

    let a = table.insert(0, 100, true);
    let b = table.insert(100, 50, false);

    assert_eq!(table.get(a).id, 1);
    assert_eq!(table.get(b).id, 2);
    assert_eq!(table.lookup(2), Some(b));
    assert_eq!(table.find(1).map(|block| block.size), Some(100));
    assert_eq!(table.lookup(3), None);
    assert_eq!(table.live(), 2);
  }

  #[test]
  fn test_destroyed_rows_are_reused_but_ids_are_not() {
    let mut table = Table::with_capacity(2).unwrap();

    let a = table.insert(0, 10, false);
    table.insert(10, 10, false);

    let retired = table.destroy(a);
    assert_eq!(retired.id, 1);
    assert_eq!(table.unused_used(), 1);
    assert_eq!(table.lookup(1), None);
    assert!(table.issued(1));

    table.reserve(1).unwrap();
    let c = table.insert(0, 10, true);

    assert_eq!(c, a);
    assert_eq!(table.get(c).id, 3);
    assert_eq!(table.unused_used(), 0);
    assert_eq!(table.used(), 2);
    assert_eq!(table.capacity(), 2);
  }

  #[test]
  fn test_grow_doubles() {
    let mut table = Table::with_capacity(4).unwrap();
    assert_eq!(table.capacity(), 4);

    table.grow(1).unwrap();
    assert_eq!(table.capacity(), 8);

    table.grow(20).unwrap();
    assert_eq!(table.capacity(), 28);
    assert!(table.unused_capacity() >= table.capacity());
  }

  #[test]
  fn test_reserve_counts_unused_rows() {
    let mut table = Table::with_capacity(2).unwrap();

    let a = table.insert(0, 1, false);
    table.insert(1, 1, false);
    table.destroy(a);

    table.reserve(1).unwrap();
    assert_eq!(table.capacity(), 2);

    table.reserve(2).unwrap();
    assert_eq!(table.capacity(), 4);
  }

  #[test]
  fn test_zero_capacity_grows_on_reserve() {
    let mut table = Table::with_capacity(0).unwrap();
    assert_eq!(table.capacity(), 0);

    table.reserve(1).unwrap();
    assert_eq!(table.capacity(), 1);
  }

  #[test]
  fn test_neighbours() {
    let mut table = Table::with_capacity(4).unwrap();

    let a = table.insert(0, 10, true);
    let c = table.insert(30, 10, true);
    let b = table.insert(10, 20, false);

    assert_eq!(table.left_of(b), Some(a));
    assert_eq!(table.right_of(b), Some(c));
    assert_eq!(table.left_of(a), None);
    assert_eq!(table.right_of(c), None);
    assert_eq!(table.last(), Some(c));
    assert_eq!(table.by_offset().collect::<Vec<_>>(), vec![a, b, c]);
  }

  #[test]
  fn test_next_from() {
    let mut table = Table::with_capacity(4).unwrap();

    let a = table.insert(0, 10, true);
    let b = table.insert(10, 20, false);
    let c = table.insert(40, 10, true);

    assert_eq!(table.next_from(0), Some(a));
    assert_eq!(table.next_from(1), Some(b));
    assert_eq!(table.next_from(30), Some(c));
    assert_eq!(table.next_from(41), None);
  }

  #[test]
  fn test_reissue() {
    let mut table = Table::with_capacity(1).unwrap();

    let slot = table.insert(0, 10, false);
    let id = table.reissue(slot);

    assert_eq!(id, 2);
    assert_eq!(table.lookup(1), None);
    assert_eq!(table.lookup(2), Some(slot));
  }

  #[test]
  fn test_set_offset_keeps_foreign_key() {
    let mut table = Table::with_capacity(2).unwrap();

    let free = table.insert(0, 10, false);
    let live = table.insert(10, 10, true);

    table.set_offset(live, 0);
    assert_eq!(table.by_offset().collect::<Vec<_>>(), vec![live]);

    table.set_offset(free, 10);
    assert_eq!(table.by_offset().collect::<Vec<_>>(), vec![live, free]);
  }

  #[test]
  fn test_allocated_end() {
    let mut table = Table::with_capacity(3).unwrap();
    assert_eq!(table.allocated_end(), 0);

    table.insert(0, 10, true);
    table.insert(10, 10, true);
    table.insert(20, 100, false);

    assert_eq!(table.allocated_end(), 20);
  }
}
