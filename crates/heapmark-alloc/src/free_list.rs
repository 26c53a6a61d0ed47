//! Address-ordered free-list heap over simulated arenas.
//!
//! Every block carries a fixed header and is aligned to [`ALIGNMENT`]. Free
//! blocks are split when the remainder can hold a header plus one aligned
//! unit, and coalesced with free neighbours on release. Blocks from
//! different arenas are never merged, mirroring separately mapped regions.

use std::collections::BTreeMap;

use heapmark_core::{AllocatorFault, AllocatorUnderTest, Strategy};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Payload alignment in bytes.
pub const ALIGNMENT: usize = 4;
/// Per-block bookkeeping header in bytes.
pub const HEADER_SIZE: usize = 16;
/// Arena sizes are rounded up to this.
pub const PAGE_SIZE: usize = 4096;
/// Size of each arena obtained from the simulated OS.
pub const DEFAULT_ARENA_SIZE: usize = 8 * 1024 * 1024;

/// First arena base; keeps offset zero out of the handle space.
const HEAP_BASE: usize = 0x1000;

fn align_up(value: usize, align: usize) -> Option<usize> {
    Some(value.checked_add(align - 1)? & !(align - 1))
}

/// Handle to a granted block: the payload offset just past its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockHandle(usize);

impl BlockHandle {
    #[must_use]
    pub const fn offset(self) -> usize {
        self.0
    }
}

/// Heap construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// Bytes requested per arena (at least the pending request).
    pub arena_size: usize,
    /// Total arena bytes the heap may hold; `None` is unbounded.
    pub max_heap_bytes: Option<usize>,
    /// Seed for random-fit placement.
    pub seed: u64,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            arena_size: DEFAULT_ARENA_SIZE,
            max_heap_bytes: None,
            seed: 0,
        }
    }
}

/// Snapshot of heap shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeapStats {
    pub arena_count: usize,
    pub arena_bytes: usize,
    pub allocated_blocks: usize,
    /// Bytes in allocated blocks, headers included.
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub largest_free_block: usize,
    /// `1 - largest_free_block / free_bytes`; zero when nothing is free.
    pub external_fragmentation: f64,
}

#[derive(Debug, Clone, Copy)]
struct Block {
    /// Total size including the header.
    size: usize,
    free: bool,
    arena: usize,
}

#[derive(Debug, Clone, Copy)]
struct Arena {
    base: usize,
    size: usize,
}

/// Simulated free-list heap.
pub struct FreeListHeap {
    config: HeapConfig,
    strategy: Strategy,
    /// Every block in every arena, keyed by block offset.
    blocks: BTreeMap<usize, Block>,
    /// Free blocks only, offset to size; placement searches this.
    free_index: BTreeMap<usize, usize>,
    arenas: Vec<Arena>,
    next_base: usize,
    /// Next-fit cursor (a block offset; may point at a merged-away block).
    rover: usize,
    rng: StdRng,
}

impl FreeListHeap {
    /// Creates a heap with one arena, using first fit until initialized otherwise.
    #[must_use]
    pub fn new(config: HeapConfig) -> Self {
        let mut heap = Self {
            config,
            strategy: Strategy::FirstFit,
            blocks: BTreeMap::new(),
            free_index: BTreeMap::new(),
            arenas: Vec::new(),
            next_base: HEAP_BASE,
            rover: HEAP_BASE,
            rng: StdRng::seed_from_u64(config.seed),
        };
        heap.reset(Strategy::FirstFit);
        heap
    }

    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    #[must_use]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Drop every block and start over with a single fresh arena.
    fn reset(&mut self, strategy: Strategy) {
        self.strategy = strategy;
        self.blocks.clear();
        self.free_index.clear();
        self.arenas.clear();
        self.next_base = HEAP_BASE;
        self.rover = HEAP_BASE;
        self.rng = StdRng::seed_from_u64(self.config.seed);
        // A fresh heap may still exceed a tiny max_heap_bytes; then every
        // allocation grows (and fails) on demand instead.
        let _ = self.grow(self.config.arena_size.max(PAGE_SIZE));
    }

    /// Append an arena of at least `min_bytes`. Returns its single free block offset.
    fn grow(&mut self, min_bytes: usize) -> Option<usize> {
        let size = align_up(min_bytes.max(self.config.arena_size), PAGE_SIZE)?;
        let current: usize = self.arenas.iter().map(|a| a.size).sum();
        if let Some(limit) = self.config.max_heap_bytes
            && current.checked_add(size)? > limit
        {
            return None;
        }
        let base = self.next_base;
        // Leave a page gap so arenas are never address-adjacent.
        self.next_base = base.checked_add(size)?.checked_add(PAGE_SIZE)?;
        let arena = self.arenas.len();
        self.arenas.push(Arena { base, size });
        self.blocks.insert(
            base,
            Block {
                size,
                free: true,
                arena,
            },
        );
        self.free_index.insert(base, size);
        Some(base)
    }

    fn find_fit(&mut self, need: usize) -> Option<usize> {
        let mut fitting = self.free_index.iter().filter(|&(_, &size)| size >= need);
        match self.strategy {
            Strategy::FirstFit => fitting.next().map(|(&off, _)| off),
            Strategy::BestFit => fitting.min_by_key(|&(_, &size)| size).map(|(&off, _)| off),
            Strategy::WorstFit => fitting
                // Lowest address wins ties.
                .max_by(|(oa, a), (ob, b)| a.cmp(b).then(ob.cmp(oa)))
                .map(|(&off, _)| off),
            Strategy::Sequential => self
                .free_index
                .range(self.rover..)
                .chain(self.free_index.range(..self.rover))
                .find(|&(_, &size)| size >= need)
                .map(|(&off, _)| off),
            Strategy::Random => {
                let candidates: Vec<usize> = fitting.map(|(&off, _)| off).collect();
                candidates.choose(&mut self.rng).copied()
            }
        }
    }

    /// Carve `need` bytes from the free block at `off`, splitting if worthwhile.
    fn place(&mut self, off: usize, need: usize) -> BlockHandle {
        let block = self.blocks[&off];
        self.free_index.remove(&off);
        if block.size >= need + HEADER_SIZE + ALIGNMENT {
            self.free_index.insert(off + need, block.size - need);
            self.blocks.insert(
                off + need,
                Block {
                    size: block.size - need,
                    free: true,
                    arena: block.arena,
                },
            );
            self.blocks.insert(
                off,
                Block {
                    size: need,
                    free: false,
                    arena: block.arena,
                },
            );
        } else if let Some(b) = self.blocks.get_mut(&off) {
            b.free = false;
        }
        self.rover = off + self.blocks[&off].size;
        BlockHandle(off + HEADER_SIZE)
    }

    /// Allocate `size` payload bytes.
    pub fn malloc(&mut self, size: usize) -> Option<BlockHandle> {
        let need = align_up(size.max(1), ALIGNMENT)?.checked_add(HEADER_SIZE)?;
        let off = match self.find_fit(need) {
            Some(off) => off,
            None => self.grow(need)?,
        };
        Some(self.place(off, need))
    }

    /// Release a block, coalescing with free neighbours in the same arena.
    pub fn free(&mut self, handle: BlockHandle) -> Result<(), AllocatorFault> {
        let off = handle
            .0
            .checked_sub(HEADER_SIZE)
            .ok_or_else(|| AllocatorFault::new(format!("handle {:#x} below heap", handle.0)))?;
        let Some(block) = self.blocks.get_mut(&off) else {
            return Err(AllocatorFault::new(format!(
                "unknown handle {:#x}",
                handle.0
            )));
        };
        if block.free {
            return Err(AllocatorFault::new(format!(
                "double free of handle {:#x}",
                handle.0
            )));
        }
        block.free = true;
        let mut merged = *block;
        let mut start = off;

        let next_off = off + merged.size;
        if let Some(next) = self.blocks.get(&next_off).copied()
            && next.free
            && next.arena == merged.arena
        {
            self.blocks.remove(&next_off);
            self.free_index.remove(&next_off);
            merged.size += next.size;
        }

        if let Some((prev_off, prev)) = self.blocks.range(..off).next_back().map(|(&o, &b)| (o, b))
            && prev.free
            && prev.arena == merged.arena
            && prev_off + prev.size == off
        {
            self.blocks.remove(&off);
            merged.size += prev.size;
            start = prev_off;
        }

        self.blocks.insert(start, merged);
        self.free_index.insert(start, merged.size);
        Ok(())
    }

    /// Current heap shape.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            arena_count: self.arenas.len(),
            arena_bytes: self.arenas.iter().map(|a| a.size).sum(),
            allocated_blocks: 0,
            allocated_bytes: 0,
            free_blocks: 0,
            free_bytes: 0,
            largest_free_block: 0,
            external_fragmentation: 0.0,
        };
        for block in self.blocks.values() {
            if block.free {
                stats.free_blocks += 1;
                stats.free_bytes += block.size;
                stats.largest_free_block = stats.largest_free_block.max(block.size);
            } else {
                stats.allocated_blocks += 1;
                stats.allocated_bytes += block.size;
            }
        }
        if stats.free_bytes > 0 {
            stats.external_fragmentation =
                1.0 - stats.largest_free_block as f64 / stats.free_bytes as f64;
        }
        stats
    }

    /// Verify that blocks tile each arena exactly and no two free neighbours
    /// were left unmerged.
    pub fn check_integrity(&self) -> Result<(), String> {
        for (index, arena) in self.arenas.iter().enumerate() {
            let mut cursor = arena.base;
            let mut prev_free = false;
            for (&off, block) in self.blocks.range(arena.base..arena.base + arena.size) {
                if block.arena != index {
                    return Err(format!("block {off:#x} tagged with arena {}", block.arena));
                }
                if off != cursor {
                    return Err(format!("gap or overlap at {cursor:#x} (next block {off:#x})"));
                }
                if block.size < HEADER_SIZE || block.size % ALIGNMENT != 0 {
                    return Err(format!("block {off:#x} has bad size {}", block.size));
                }
                if block.free && prev_free {
                    return Err(format!("adjacent free blocks not coalesced at {off:#x}"));
                }
                prev_free = block.free;
                cursor = off + block.size;
            }
            if cursor != arena.base + arena.size {
                return Err(format!("arena {index} ends at {cursor:#x}, expected {:#x}", arena.base + arena.size));
            }
        }
        let indexed: Vec<(usize, usize)> = self
            .blocks
            .iter()
            .filter(|(_, b)| b.free)
            .map(|(&off, b)| (off, b.size))
            .collect();
        if !indexed.iter().copied().eq(self.free_index.iter().map(|(&o, &s)| (o, s))) {
            return Err("free index out of sync with block map".to_string());
        }
        let covered = self
            .blocks
            .keys()
            .filter(|&&off| self.arenas.iter().any(|a| off >= a.base && off < a.base + a.size))
            .count();
        if covered != self.blocks.len() {
            return Err(format!(
                "{} blocks lie outside every arena",
                self.blocks.len() - covered
            ));
        }
        Ok(())
    }
}

impl Default for FreeListHeap {
    fn default() -> Self {
        Self::new(HeapConfig::default())
    }
}

impl AllocatorUnderTest for FreeListHeap {
    type Handle = BlockHandle;

    fn initialize(&mut self, strategy: Strategy) {
        self.reset(strategy);
    }

    fn allocate(&mut self, size: usize) -> Option<BlockHandle> {
        self.malloc(size)
    }

    fn release(&mut self, handle: BlockHandle) -> Result<(), AllocatorFault> {
        self.free(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_heap(strategy: Strategy) -> FreeListHeap {
        let mut heap = FreeListHeap::new(HeapConfig {
            arena_size: PAGE_SIZE,
            max_heap_bytes: None,
            seed: 11,
        });
        heap.initialize(strategy);
        heap
    }

    /// Three holes of 116, 316 and 66 bytes separated by live 36-byte blocks,
    /// followed by the arena tail.
    fn holey_heap(strategy: Strategy) -> (FreeListHeap, [BlockHandle; 3]) {
        let mut heap = small_heap(strategy);
        let a = heap.malloc(100).unwrap();
        let _b = heap.malloc(20).unwrap();
        let c = heap.malloc(300).unwrap();
        let _d = heap.malloc(20).unwrap();
        let e = heap.malloc(50).unwrap();
        let _f = heap.malloc(20).unwrap();
        heap.free(a).unwrap();
        heap.free(c).unwrap();
        heap.free(e).unwrap();
        heap.check_integrity().unwrap();
        (heap, [a, c, e])
    }

    #[test]
    fn handles_are_aligned_and_past_header() {
        let mut heap = small_heap(Strategy::FirstFit);
        let h1 = heap.malloc(1).unwrap();
        let h2 = heap.malloc(7).unwrap();
        assert_eq!(h1.offset(), HEAP_BASE + HEADER_SIZE);
        assert_eq!(h2.offset() - h1.offset(), HEADER_SIZE + ALIGNMENT);
        assert_eq!(h2.offset() % ALIGNMENT, 0);
    }

    #[test]
    fn first_fit_takes_lowest_hole() {
        let (mut heap, [a, _, _]) = holey_heap(Strategy::FirstFit);
        assert_eq!(heap.malloc(40).unwrap(), a);
        heap.check_integrity().unwrap();
    }

    #[test]
    fn best_fit_takes_tightest_hole() {
        let (mut heap, [_, _, e]) = holey_heap(Strategy::BestFit);
        assert_eq!(heap.malloc(40).unwrap(), e);
        heap.check_integrity().unwrap();
    }

    #[test]
    fn worst_fit_takes_largest_block() {
        let (mut heap, [a, c, e]) = holey_heap(Strategy::WorstFit);
        let h = heap.malloc(40).unwrap();
        // The arena tail dwarfs every hole.
        assert!(h > a && h > c && h > e);
        let h2 = heap.malloc(200).unwrap();
        assert!(h2 > h);
    }

    #[test]
    fn sequential_continues_after_last_placement() {
        let (mut heap, [a, c, e]) = holey_heap(Strategy::Sequential);
        let h = heap.malloc(40).unwrap();
        assert!(h > e, "next fit should not revisit earlier holes");
        assert_ne!(h, a);
        assert_ne!(h, c);
    }

    #[test]
    fn sequential_wraps_around() {
        let mut heap = FreeListHeap::new(HeapConfig {
            arena_size: PAGE_SIZE,
            max_heap_bytes: Some(PAGE_SIZE),
            seed: 0,
        });
        heap.initialize(Strategy::Sequential);
        let first = heap.malloc(100).unwrap();
        // Fill the rest of the single arena.
        let filler = heap.malloc(PAGE_SIZE - 2 * HEADER_SIZE - 100).unwrap();
        assert!(heap.malloc(4).is_none());
        heap.free(first).unwrap();
        assert_eq!(heap.malloc(100).unwrap(), first);
        heap.free(filler).unwrap();
        heap.check_integrity().unwrap();
    }

    #[test]
    fn random_fit_is_seeded_and_fits() {
        let (mut h1, _) = holey_heap(Strategy::Random);
        let (mut h2, _) = holey_heap(Strategy::Random);
        for _ in 0..8 {
            let x = h1.malloc(40).unwrap();
            let y = h2.malloc(40).unwrap();
            assert_eq!(x, y);
        }
        h1.check_integrity().unwrap();
    }

    #[test]
    fn coalesces_back_to_one_block() {
        let mut heap = small_heap(Strategy::FirstFit);
        let handles: Vec<_> = (0..10).map(|i| heap.malloc(10 + i * 7).unwrap()).collect();
        for h in handles.iter().step_by(2) {
            heap.free(*h).unwrap();
        }
        heap.check_integrity().unwrap();
        for h in handles.iter().skip(1).step_by(2) {
            heap.free(*h).unwrap();
        }
        let stats = heap.stats();
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.allocated_blocks, 0);
        assert_eq!(stats.free_bytes, stats.arena_bytes);
        assert_eq!(stats.external_fragmentation, 0.0);
        heap.check_integrity().unwrap();
    }

    #[test]
    fn grows_new_arena_for_large_requests() {
        let mut heap = small_heap(Strategy::BestFit);
        let h = heap.malloc(10_000).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.arena_count, 2);
        assert_eq!(stats.arena_bytes, PAGE_SIZE + 12_288);
        heap.free(h).unwrap();
        heap.check_integrity().unwrap();
        // Arenas never merge even when both are entirely free.
        assert_eq!(heap.stats().free_blocks, 2);
    }

    #[test]
    fn respects_heap_limit() {
        let mut heap = FreeListHeap::new(HeapConfig {
            arena_size: PAGE_SIZE,
            max_heap_bytes: Some(3 * PAGE_SIZE),
            seed: 0,
        });
        // Needs a second arena of two pages, which exactly meets the limit.
        assert!(heap.malloc(PAGE_SIZE).is_some());
        assert!(heap.malloc(PAGE_SIZE * 4).is_none());
        assert_eq!(heap.stats().arena_count, 2);
    }

    #[test]
    fn rejects_unknown_and_double_free() {
        let mut heap = small_heap(Strategy::FirstFit);
        let h = heap.malloc(64).unwrap();
        assert!(heap.free(BlockHandle(3)).is_err());
        assert!(heap.free(BlockHandle(h.offset() + 4)).is_err());
        heap.free(h).unwrap();
        let err = heap.free(h).unwrap_err();
        assert!(err.reason.contains("double free") || err.reason.contains("unknown"));
    }

    #[test]
    fn initialize_resets_heap() {
        let mut heap = small_heap(Strategy::FirstFit);
        for _ in 0..50 {
            heap.malloc(200).unwrap();
        }
        assert!(heap.stats().arena_count > 1);
        heap.initialize(Strategy::WorstFit);
        let stats = heap.stats();
        assert_eq!(heap.strategy(), Strategy::WorstFit);
        assert_eq!(stats.arena_count, 1);
        assert_eq!(stats.allocated_blocks, 0);
    }

    #[test]
    fn fragmentation_reflects_scattered_holes() {
        let (heap, _) = holey_heap(Strategy::FirstFit);
        let stats = heap.stats();
        assert_eq!(stats.free_blocks, 4);
        assert!(stats.external_fragmentation > 0.0);
        assert!(stats.external_fragmentation < 1.0);
    }
}
