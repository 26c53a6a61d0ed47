//! Live allocation tracker.
//!
//! Maps each handle the allocator granted to the size that was requested.
//! A handle is present iff it came back from a successful `allocate` and has
//! not been handed to `release` yet. Entries live in a dense vector (so a
//! uniform pick is O(1)) with a side index for duplicate detection.

use std::collections::HashMap;
use std::hash::Hash;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the executor chooses which live allocation a release token frees.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Uniformly random live entry.
    #[default]
    Random,
    /// Most recently recorded entry.
    Lifo,
    /// Oldest recorded entry.
    Fifo,
    /// Entry with the largest requested size (oldest on ties).
    LargestFirst,
    /// Entry with the smallest requested size (oldest on ties).
    SmallestFirst,
}

impl EvictionPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EvictionPolicy::Random => "random",
            EvictionPolicy::Lifo => "lifo",
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::LargestFirst => "largest-first",
            EvictionPolicy::SmallestFirst => "smallest-first",
        }
    }
}

impl std::str::FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "random" | "uniform" => Ok(Self::Random),
            "lifo" | "stack" => Ok(Self::Lifo),
            "fifo" | "queue" => Ok(Self::Fifo),
            "largest-first" | "largest" => Ok(Self::LargestFirst),
            "smallest-first" | "smallest" => Ok(Self::SmallestFirst),
            _ => Err(format!(
                "unknown eviction policy '{s}', expected random|lifo|fifo|largest-first|smallest-first"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LiveEntry<H> {
    handle: H,
    size: usize,
    seq: u64,
}

/// Ownership table of live allocations for a single run.
#[derive(Debug, Clone)]
pub struct LiveTracker<H> {
    entries: Vec<LiveEntry<H>>,
    index: HashMap<H, usize>,
    next_seq: u64,
}

impl<H: Copy + Eq + Hash> LiveTracker<H> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Insert a new live entry.
    ///
    /// Returns `false` and leaves the table untouched if `handle` is already live.
    pub fn record(&mut self, handle: H, size: usize) -> bool {
        if self.index.contains_key(&handle) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(handle, self.entries.len());
        self.entries.push(LiveEntry { handle, size, seq });
        true
    }

    /// Remove one live entry chosen uniformly at random.
    pub fn remove_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<(H, usize)> {
        if self.entries.is_empty() {
            return None;
        }
        let pos = rng.gen_range(0..self.entries.len());
        Some(self.take_at(pos))
    }

    /// Remove one live entry according to `policy`. Only `Random` draws from `rng`.
    pub fn remove_victim<R: Rng + ?Sized>(
        &mut self,
        policy: EvictionPolicy,
        rng: &mut R,
    ) -> Option<(H, usize)> {
        let pos = match policy {
            EvictionPolicy::Random => return self.remove_random(rng),
            EvictionPolicy::Lifo => self.position_by(|e| e.seq, true)?,
            EvictionPolicy::Fifo => self.position_by(|e| e.seq, false)?,
            EvictionPolicy::LargestFirst => self.position_by_size(true)?,
            EvictionPolicy::SmallestFirst => self.position_by_size(false)?,
        };
        Some(self.take_at(pos))
    }

    /// Remove and return every live entry, oldest first.
    pub fn drain(&mut self) -> Vec<(H, usize)> {
        self.index.clear();
        let mut entries = std::mem::take(&mut self.entries);
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| (e.handle, e.size)).collect()
    }

    #[must_use]
    pub fn contains(&self, handle: &H) -> bool {
        self.index.contains_key(handle)
    }

    #[must_use]
    pub fn size_of(&self, handle: &H) -> Option<usize> {
        self.index.get(handle).map(|&pos| self.entries[pos].size)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of requested sizes of all live entries.
    #[must_use]
    pub fn requested_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size as u64).sum()
    }

    fn position_by(&self, key: impl Fn(&LiveEntry<H>) -> u64, max: bool) -> Option<usize> {
        let iter = self.entries.iter().enumerate();
        let found = if max {
            iter.max_by_key(|(_, e)| key(e))
        } else {
            iter.min_by_key(|(_, e)| key(e))
        };
        found.map(|(pos, _)| pos)
    }

    fn position_by_size(&self, largest: bool) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let by_size = if largest {
                    b.size.cmp(&a.size)
                } else {
                    a.size.cmp(&b.size)
                };
                by_size.then(a.seq.cmp(&b.seq))
            })
            .map(|(pos, _)| pos)
    }

    fn take_at(&mut self, pos: usize) -> (H, usize) {
        let removed = self.entries.swap_remove(pos);
        self.index.remove(&removed.handle);
        if let Some(moved) = self.entries.get(pos) {
            self.index.insert(moved.handle, pos);
        }
        (removed.handle, removed.size)
    }
}

impl<H: Copy + Eq + Hash> Default for LiveTracker<H> {
    fn default() -> Self {
        Self::new()
    }
}
