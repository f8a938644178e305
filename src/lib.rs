//! # shaggymem - A Relocatable Arena Allocator
//!
//! This crate provides a **handle-based arena allocator**: one growable,
//! shrinkable byte region carved into allocations that are referred to by id
//! rather than by address. Because nobody holds raw addresses, the region can
//! be moved, resized and defragmented without invalidating what callers keep.
//!
//! ## Overview
//!
//! ```text
//!   Arena Concept:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                            STORAGE                                   │
//!   │                                                                      │
//!   │   ┌─────┬───────┬─────┬──────────┬─────┬────────────────────────┐    │
//!   │   │ #3  │ free  │ #9  │   free   │ #12 │         free           │    │
//!   │   └─────┴───────┴─────┴──────────┴─────┴────────────────────────┘    │
//!   │   0                                                      storageSize │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Every byte belongs to exactly one record, allocated or free.
//!   Callers hold (allocator, id); offsets are looked up on demand.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   shaggymem
//!   ├── align      - align! macro and page rounding
//!   ├── sysmem     - PageSource trait, mmap source, raw copy/zero
//!   ├── allocator  - Allocator, the public operation set
//!   ├── config     - Config builder
//!   ├── error      - AllocationError
//!   ├── handle     - Allocation handle, AllocatorId
//!   ├── stats      - Stats snapshot
//!   ├── block      - allocation record (internal)
//!   ├── table      - allocation table and unused-record pool (internal)
//!   ├── free       - free-space index and freeMax (internal)
//!   └── storage    - region ownership and relocation (internal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use shaggymem::{Allocator, Config};
//!
//! let mut arena = Allocator::with_config(Config::new(4096).page_size(4096)).unwrap();
//!
//! let a = arena.allocate(100).unwrap();
//! arena.bytes_mut(&a).unwrap().fill(42);
//!
//! // Grow past the end of storage; `a` stays valid.
//! let b = arena.allocate(5000).unwrap();
//! assert!(arena.storage_size() >= 8192);
//! assert_eq!(arena.bytes(&a).unwrap()[0], 42);
//!
//! arena.deallocate(&b).unwrap();
//! arena.deallocate(&a).unwrap();
//! assert_eq!(arena.free_max(), arena.storage_size());
//! ```
//!
//! ## How It Works
//!
//! Allocation takes the lowest-offset free record that fits and splits off
//! what it does not need:
//!
//! ```text
//!   allocate(100)
//!
//!   before  ┌───────────────────────── free 4096 ──────────────────────────┐
//!   after   ┌─ #2 100 ─┬─────────────────── free 3996 ─────────────────────┐
//! ```
//!
//! Freeing merges with free neighbours on both sides, so two free records are
//! never adjacent:
//!
//! ```text
//!   ┌─ free ─┬─ #5 ─┬─ free ─┐   deallocate(#5)   ┌──────── free ────────┐
//! ```
//!
//! Compaction slides allocations down to offset 0 and leaves one free tail:
//!
//! ```text
//!   before  ┌ free ┬ #3 ┬── free ──┬ #7 ┬ free ┐
//!   after   ┌ #3 ┬ #7 ┬────────── free ────────┐
//! ```
//!
//! When nothing fits, storage grows to `size + max(needed, size)` rounded to a
//! page. The bytes are copied into a new region before the old one is given
//! back, so a failed growth changes nothing.
//!
//! ## Handles and Pointers
//!
//! An [`Allocation`] caches the offset and size it had when it was produced.
//! Use [`Allocator::offset`] or [`Allocator::refresh`] after a `compress`.
//! Bytes are only reachable through [`Allocator::bytes`] and
//! [`Allocator::bytes_mut`]; the returned slices borrow the allocator, so the
//! compiler rejects holding one across anything that could move storage.
//!
//! ## Limitations
//!
//! - **Single-threaded**: no internal locking; share it behind a `Mutex`
//! - **Linear scans**: fitting and `freeMax` upkeep walk the free index
//! - **Byte granular**: no alignment beyond what the caller asks for
//! - **Unix-only**: the default page source uses `mmap(2)` through `libc`

pub mod align;
mod allocator;
mod block;
mod config;
mod error;
mod free;
mod handle;
mod stats;
mod storage;
pub mod sysmem;
mod table;

pub use allocator::Allocator;
pub use config::Config;
pub use error::{AllocationError, Result};
pub use handle::{Allocation, AllocatorId};
pub use stats::Stats;
pub use sysmem::{Mmap, PageSource, Region};
