use std::cmp::Ordering;

use tracing::{debug, info, trace, warn};

use crate::block::Block;
use crate::config::Config;
use crate::error::{AllocationError, Result};
use crate::free::FreeIndex;
use crate::handle::{Allocation, AllocatorId};
use crate::stats::{Counters, Stats};
use crate::storage::Storage;
use crate::sysmem::{Mmap, PageSource};
use crate::table::Table;

/// A relocatable arena handing out [`Allocation`] handles.
///
/// Single-threaded: wrap it in a `Mutex` to share it.
pub struct Allocator<S: PageSource = Mmap> {
  id: AllocatorId,
  storage: Storage<S>,
  table: Table,
  free: FreeIndex,
  storage_used: u64,
  counters: Counters,
}

impl Allocator<Mmap> {
  /// Creates an allocator backed by at least `initial_size` bytes of
  /// anonymous memory.
  pub fn create(initial_size: u64) -> Result<Self> {
    Self::with_config(Config::new(initial_size))
  }

  pub fn with_config(config: Config) -> Result<Self> {
    Self::with_source(config, Mmap)
  }
}

impl<S: PageSource> Allocator<S> {
  pub fn with_source(
    config: Config,
    source: S,
  ) -> Result<Self> {
    let page_size = config.resolve_page_size(source.page_size())?;

    let mut table = Table::with_capacity(config.initial_records)?;
    let mut free = FreeIndex::with_capacity(config.initial_free)?;
    let storage = Storage::new(source, page_size, config.initial_size)?;

    if storage.size() > 0 {
      table.reserve(1)?;
      free.reserve(1)?;

      let slot = table.insert(0, storage.size(), false);
      free.insert(table.get(slot).id);
      free.raise_max(storage.size());
    }

    let allocator = Self {
      id: AllocatorId::next(),
      storage,
      table,
      free,
      storage_used: 0,
      counters: Counters::default(),
    };

    info!(
      storage_size = allocator.storage_size(),
      page_size, "created allocator"
    );

    Ok(allocator)
  }

  /// Releases the storage. Dropping the allocator does the same.
  pub fn destroy(self) {
    info!(storage_size = self.storage_size(), "destroying allocator");
    drop(self);
  }

  pub fn id(&self) -> AllocatorId {
    self.id
  }

  pub fn allocate(
    &mut self,
    size: u64,
  ) -> Result<Allocation> {
    check_size(size)?;

    // Growth may add a tail record and the fit may split off a remainder.
    self.table.reserve(2)?;
    self.free.reserve(1)?;

    if size > self.free.max() {
      let tail = self.tail_free().map_or(0, |slot| self.table.get(slot).size);
      self.grow_storage(size - tail)?;
    }

    let slot = self.carve(size).ok_or(AllocationError::OutOfMemory)?;
    let allocation = self.handle(slot);

    self.counters.allocations += 1;
    debug!(
      id = allocation.id(),
      offset = allocation.offset(),
      size,
      "allocated"
    );

    Ok(allocation)
  }

  /// Like [`Allocator::allocate`], with the bytes cleared.
  pub fn allocate_zeroed(
    &mut self,
    size: u64,
  ) -> Result<Allocation> {
    let allocation = self.allocate(size)?;
    self.storage.zero(allocation.offset(), size);
    Ok(allocation)
  }

  pub fn deallocate(
    &mut self,
    allocation: &Allocation,
  ) -> Result<()> {
    let slot = self.freeable(allocation)?;
    self.free.reserve(1)?;

    let block = *self.table.get(slot);

    self.table.set_allocated(slot, false);
    self.storage_used -= block.size;
    self.free.insert(block.id);
    self.free.raise_max(block.size);
    self.coalesce(slot);

    self.counters.deallocations += 1;
    debug!(id = block.id, size = block.size, "deallocated");

    Ok(())
  }

  /// Changes the size of an allocation, in place when it can.
  ///
  /// Shrinking frees the tail. Growing takes bytes from a free right-hand
  /// neighbour when it has enough, and otherwise moves the allocation, in
  /// which case the returned handle has a new id and `allocation` is dead.
  pub fn resize(
    &mut self,
    allocation: &Allocation,
    new_size: u64,
  ) -> Result<Allocation> {
    let slot = self.slot(allocation)?;
    check_size(new_size)?;

    let size = self.table.get(slot).size;

    match new_size.cmp(&size) {
      Ordering::Equal => Ok(self.handle(slot)),
      Ordering::Less => self.split_allocation(allocation, new_size),
      Ordering::Greater => match self.grow_in_place(slot, new_size) {
        Some(resized) => Ok(resized),
        None => self.reallocate(allocation, new_size),
      },
    }
  }

  /// Moves an allocation into a fresh one of `new_size` bytes, copying the
  /// common prefix. `allocation` is dead afterwards.
  pub fn reallocate(
    &mut self,
    allocation: &Allocation,
    new_size: u64,
  ) -> Result<Allocation> {
    let slot = self.slot(allocation)?;
    check_size(new_size)?;

    // Room for a tail record from growth plus the entry freed at the end.
    self.free.reserve(2)?;

    let moved = self.allocate(new_size)?;

    let old = *self.table.get(slot);
    self.storage.copy(old.offset, moved.offset(), old.size.min(new_size));
    self.deallocate(allocation)?;

    debug!(from = old.id, to = moved.id(), new_size, "reallocated");

    Ok(moved)
  }

  /// Shrinks an allocation to `new_size`, returning the tail to free space.
  pub fn split_allocation(
    &mut self,
    allocation: &Allocation,
    new_size: u64,
  ) -> Result<Allocation> {
    let slot = self.slot(allocation)?;
    let size = self.table.get(slot).size;

    if new_size == 0 || new_size >= size {
      return Err(AllocationError::InvalidSize);
    }

    self.table.reserve(1)?;
    self.free.reserve(1)?;

    let rest = self.split_block(slot, new_size);
    self.storage_used -= size - new_size;
    self.coalesce(rest);

    Ok(self.handle(slot))
  }

  /// Packs every allocation towards offset 0 and gathers all free space into
  /// one trailing record. Ids survive; offsets and pointers do not.
  ///
  /// Returns the number of bytes moved.
  pub fn compress(&mut self) -> u64 {
    let Some(keep) = self.free.ids().first().and_then(|&id| self.table.lookup(id)) else {
      return 0;
    };

    while let Some(&id) = self.free.ids().get(1) {
      self.free.remove(id);
      if let Some(slot) = self.table.lookup(id) {
        self.table.destroy(slot);
      }
    }
    self.free.clear();

    let mut scan = 0;
    let mut cursor = 0;
    let mut moved = 0;

    while let Some(slot) = self.table.next_from(scan) {
      let block = *self.table.get(slot);
      scan = block.end();

      if slot == keep {
        continue;
      }

      if block.offset != cursor {
        self.storage.copy(block.offset, cursor, block.size);
        self.table.set_offset(slot, cursor);
        moved += block.size;
      }

      cursor += block.size;
    }

    let tail = self.storage.size() - cursor;
    self.table.set_offset(keep, cursor);
    self.table.set_size(keep, tail);
    self.free.insert(self.table.get(keep).id);
    self.free.raise_max(tail);

    self.counters.compactions += 1;
    info!(moved, free_max = tail, "compressed storage");

    moved
  }

  /// Grows storage by at least `min_new_bytes`, doubling when that is more.
  ///
  /// Bytes keep their offsets but move in memory.
  pub fn grow_storage(
    &mut self,
    min_new_bytes: u64,
  ) -> Result<()> {
    let old_size = self.storage.size();
    let added = min_new_bytes.max(old_size).max(1);
    let new_size = old_size
      .checked_add(added)
      .ok_or(AllocationError::InvalidSize)?;
    let new_size = self.storage.round(new_size)?;

    let tail = self.tail_free();
    if tail.is_none() {
      self.table.reserve(1)?;
      self.free.reserve(1)?;
    }

    self.storage.relocate(new_size, self.table.allocated_end())?;

    let grown = new_size - old_size;
    let slot = match tail {
      Some(slot) => {
        let size = self.table.get(slot).size;
        self.table.set_size(slot, size + grown);
        slot
      }
      None => {
        let slot = self.table.insert(old_size, grown, false);
        self.free.insert(self.table.get(slot).id);
        slot
      }
    };
    self.free.raise_max(self.table.get(slot).size);

    self.counters.storage_grows += 1;
    info!(from = old_size, to = new_size, "grew storage");

    Ok(())
  }

  /// Shrinks storage to `max_new_bytes` rounded up to a page.
  ///
  /// Fails with [`AllocationError::InUse`] unless everything past the new end
  /// is free. A target at or above the current size is a no-op.
  pub fn shrink_storage(
    &mut self,
    max_new_bytes: u64,
  ) -> Result<()> {
    let old_size = self.storage.size();
    let new_size = self.storage.round(max_new_bytes)?;

    if new_size >= old_size {
      return Ok(());
    }

    let slot = self.tail_free().ok_or(AllocationError::InUse)?;
    let tail = *self.table.get(slot);

    if tail.offset > new_size {
      return Err(AllocationError::InUse);
    }

    self.storage.relocate(new_size, self.table.allocated_end())?;

    if tail.offset == new_size {
      self.free.remove(tail.id);
      self.table.destroy(slot);
    } else {
      self.table.set_size(slot, new_size - tail.offset);
    }
    self.free.update_max(&self.table);

    self.counters.storage_shrinks += 1;
    info!(from = old_size, to = new_size, "shrank storage");

    Ok(())
  }

  pub fn grow_allocations(
    &mut self,
    min_new_records: usize,
  ) -> Result<()> {
    self.table.grow(min_new_records)
  }

  pub fn grow_unused_allocations(
    &mut self,
    min_new_records: usize,
  ) -> Result<()> {
    self.table.grow_unused(min_new_records)
  }

  pub fn grow_free(
    &mut self,
    min_new_entries: usize,
  ) -> Result<()> {
    self.free.grow(min_new_entries)
  }

  /// Recomputes the largest free size from scratch.
  pub fn update_free_max(&mut self) -> u64 {
    self.free.update_max(&self.table)
  }

  /// The live allocation with this id, if there is one.
  pub fn allocation(
    &self,
    id: u64,
  ) -> Option<Allocation> {
    self
      .table
      .lookup(id)
      .filter(|&slot| self.table.get(slot).allocated)
      .map(|slot| self.handle(slot))
  }

  /// Live allocations in storage order.
  pub fn allocations(&self) -> impl Iterator<Item = Allocation> + '_ {
    self
      .table
      .by_offset()
      .filter(|&slot| self.table.get(slot).allocated)
      .map(|slot| self.handle(slot))
  }

  /// Whether this allocator issued `allocation`, live or not.
  pub fn is_valid(
    &self,
    allocation: &Allocation,
  ) -> bool {
    allocation.allocator() == self.id && self.table.issued(allocation.id())
  }

  pub fn is_allocated(
    &self,
    allocation: &Allocation,
  ) -> bool {
    self.slot(allocation).is_ok()
  }

  pub fn is_deallocated(
    &self,
    allocation: &Allocation,
  ) -> bool {
    self.is_valid(allocation) && !self.is_allocated(allocation)
  }

  pub fn size(
    &self,
    allocation: &Allocation,
  ) -> Result<u64> {
    Ok(self.block(allocation)?.size)
  }

  pub fn offset(
    &self,
    allocation: &Allocation,
  ) -> Result<u64> {
    Ok(self.block(allocation)?.offset)
  }

  /// A copy of `allocation` with current offset and size.
  pub fn refresh(
    &self,
    allocation: &Allocation,
  ) -> Result<Allocation> {
    self.slot(allocation).map(|slot| self.handle(slot))
  }

  /// The allocation's bytes. The borrow ends before anything can move them.
  pub fn bytes(
    &self,
    allocation: &Allocation,
  ) -> Result<&[u8]> {
    let block = *self.block(allocation)?;
    Ok(self.storage.bytes(block.offset, block.size))
  }

  pub fn bytes_mut(
    &mut self,
    allocation: &Allocation,
  ) -> Result<&mut [u8]> {
    let block = *self.block(allocation)?;
    Ok(self.storage.bytes_mut(block.offset, block.size))
  }

  pub fn storage_size(&self) -> u64 {
    self.storage.size()
  }

  pub fn storage_used(&self) -> u64 {
    self.storage_used
  }

  pub fn page_size(&self) -> u64 {
    self.storage.page_size()
  }

  pub fn free_max(&self) -> u64 {
    self.free.max()
  }

  pub fn allocations_size(&self) -> usize {
    self.table.capacity()
  }

  pub fn allocations_used(&self) -> usize {
    self.table.used()
  }

  pub fn unused_allocations_size(&self) -> usize {
    self.table.unused_capacity()
  }

  pub fn unused_allocations_used(&self) -> usize {
    self.table.unused_used()
  }

  pub fn free_size(&self) -> usize {
    self.free.capacity()
  }

  pub fn free_used(&self) -> usize {
    self.free.used()
  }

  pub fn stats(&self) -> Stats {
    let free_records = self.free.used();

    Stats {
      storage_size: self.storage_size(),
      storage_used: self.storage_used,
      free_bytes: self.storage_size() - self.storage_used,
      free_max: self.free.max(),
      allocated_records: self.table.live() - free_records,
      free_records,
      allocations: self.counters.allocations,
      deallocations: self.counters.deallocations,
      storage_grows: self.counters.storage_grows,
      storage_shrinks: self.counters.storage_shrinks,
      compactions: self.counters.compactions,
    }
  }

  fn handle(
    &self,
    slot: usize,
  ) -> Allocation {
    Allocation::new(self.id, self.table.get(slot))
  }

  /// Slot of a live allocation issued by this allocator.
  fn slot(
    &self,
    allocation: &Allocation,
  ) -> Result<usize> {
    if allocation.allocator() != self.id {
      return Err(AllocationError::InvalidHandle);
    }

    self
      .table
      .lookup(allocation.id())
      .filter(|&slot| self.table.get(slot).allocated)
      .ok_or(AllocationError::InvalidHandle)
  }

  fn block(
    &self,
    allocation: &Allocation,
  ) -> Result<&Block> {
    self.slot(allocation).map(|slot| self.table.get(slot))
  }

  /// Like [`Allocator::slot`], telling double frees apart.
  fn freeable(
    &self,
    allocation: &Allocation,
  ) -> Result<usize> {
    match self.slot(allocation) {
      Ok(slot) => Ok(slot),
      Err(_) if self.is_valid(allocation) => {
        warn!(id = allocation.id(), "double free");
        Err(AllocationError::DoubleFree)
      }
      Err(err) => {
        warn!(id = allocation.id(), "rejected foreign or unknown handle");
        Err(err)
      }
    }
  }

  fn tail_free(&self) -> Option<usize> {
    self
      .table
      .last()
      .filter(|&slot| self.table.get(slot).is_free())
  }

  /// Turns the lowest-offset free record that fits into an allocation of
  /// exactly `size` bytes under a fresh id. Requires one spare table row.
  fn carve(
    &mut self,
    size: u64,
  ) -> Option<usize> {
    let slot = self.free.first_fit(size, &self.table)?;
    let block = *self.table.get(slot);

    self.free.remove(block.id);
    if block.size > size {
      self.split_block(slot, size);
    }

    self.table.set_allocated(slot, true);
    self.table.reissue(slot);
    self.storage_used += size;
    self.free.update_max(&self.table);

    Some(slot)
  }

  /// Cuts `slot` down to `new_size` and files the rest as a new free record.
  fn split_block(
    &mut self,
    slot: usize,
    new_size: u64,
  ) -> usize {
    let block = *self.table.get(slot);
    debug_assert!(new_size > 0 && new_size < block.size);

    let rest_size = block.size - new_size;

    self.table.set_size(slot, new_size);
    let rest = self.table.insert(block.offset + new_size, rest_size, false);
    self.free.insert(self.table.get(rest).id);
    self.free.raise_max(rest_size);

    trace!(id = block.id, new_size, rest = rest_size, "split");
    rest
  }

  /// Folds the free record `right` into the free record `left`.
  fn merge_blocks(
    &mut self,
    left: usize,
    right: usize,
  ) -> usize {
    let l = *self.table.get(left);
    let r = *self.table.get(right);
    debug_assert!(l.is_free() && r.is_free() && l.precedes(&r));

    self.free.remove(r.id);
    self.table.destroy(right);
    self.table.set_size(left, l.size + r.size);
    self.free.raise_max(l.size + r.size);

    trace!(left = l.id, right = r.id, size = l.size + r.size, "merged");
    left
  }

  /// Merges a free record with its free neighbours.
  fn coalesce(
    &mut self,
    mut slot: usize,
  ) -> usize {
    if let Some(left) = self.table.left_of(slot) {
      if self.mergeable(left, slot) {
        slot = self.merge_blocks(left, slot);
      }
    }

    if let Some(right) = self.table.right_of(slot) {
      if self.mergeable(slot, right) {
        slot = self.merge_blocks(slot, right);
      }
    }

    slot
  }

  fn mergeable(
    &self,
    left: usize,
    right: usize,
  ) -> bool {
    let l = self.table.get(left);
    let r = self.table.get(right);

    l.is_free() && r.is_free() && l.precedes(r)
  }

  /// Extends `slot` into a free right-hand neighbour.
  fn grow_in_place(
    &mut self,
    slot: usize,
    new_size: u64,
  ) -> Option<Allocation> {
    let block = *self.table.get(slot);
    let right = self.table.right_of(slot)?;
    let neighbour = *self.table.get(right);

    if neighbour.allocated || !block.precedes(&neighbour) || block.size + neighbour.size < new_size {
      return None;
    }

    let needed = new_size - block.size;

    if needed == neighbour.size {
      self.free.remove(neighbour.id);
      self.table.destroy(right);
    } else {
      self.table.set_offset(right, neighbour.offset + needed);
      self.table.set_size(right, neighbour.size - needed);
    }

    self.table.set_size(slot, new_size);
    self.storage_used += needed;
    self.free.update_max(&self.table);

    debug!(id = block.id, new_size, "resized in place");
    Some(self.handle(slot))
  }
}

fn check_size(size: u64) -> Result<()> {
  if size == 0 || size > isize::MAX as u64 {
    return Err(AllocationError::InvalidSize);
  }

  Ok(())
}
