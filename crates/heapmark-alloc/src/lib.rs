//! # heapmark-alloc
//!
//! Reference allocator under test for heapmark: a simulated free-list heap
//! implementing first fit, best fit, worst fit, next fit (sequential) and
//! random fit. Blocks are metadata records over logical offsets; no real
//! memory is mapped, so huge requests are cheap to benchmark.

#![forbid(unsafe_code)]

pub mod free_list;

pub use free_list::{BlockHandle, FreeListHeap, HeapConfig, HeapStats};
