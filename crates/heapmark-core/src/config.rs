//! Per-run configuration.
//!
//! A [`RunConfig`] is created before a run and stays read-only while the run
//! executes. It can be built in code or loaded from JSON; every field has a
//! default so partial files are accepted.

use serde::{Deserialize, Serialize};

use crate::distribution::SizeDistribution;
use crate::error::ConfigError;
use crate::strategy::Strategy;
use crate::tracker::EvictionPolicy;

/// Per-allocation bookkeeping cost charged by default (bytes).
pub const DEFAULT_METADATA_OVERHEAD: usize = 16;
/// Default accounted capacity at run start, and default growth chunk (bytes).
pub const DEFAULT_CAPACITY_CHUNK: u64 = 4096 * 4;
pub const DEFAULT_ALLOCATE_COUNT: usize = 550;
pub const DEFAULT_RELEASE_COUNT: usize = 450;
pub const DEFAULT_SEED: u64 = 0xDEAD_BEEF;

/// Capacity accounting policy.
///
/// The executor cannot see the allocator's real backing store, so utilization
/// is measured against an accounted capacity that starts at
/// `initial_capacity` and grows by `max(chunk_size, size + overhead)` whenever
/// live bytes exceed it. This is a modeling approximation, tunable per allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityPolicy {
    pub initial_capacity: u64,
    pub chunk_size: u64,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY_CHUNK,
            chunk_size: DEFAULT_CAPACITY_CHUNK,
        }
    }
}

/// Everything one run needs besides the allocator itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub strategy: Strategy,
    pub sizes: SizeDistribution,
    pub malloc_count: usize,
    pub free_count: usize,
    pub metadata_overhead: usize,
    pub capacity: CapacityPolicy,
    pub eviction: EvictionPolicy,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            sizes: SizeDistribution::new((1..=256).collect())
                .unwrap_or_else(|_| unreachable!("static range is non-empty")),
            malloc_count: DEFAULT_ALLOCATE_COUNT,
            free_count: DEFAULT_RELEASE_COUNT,
            metadata_overhead: DEFAULT_METADATA_OVERHEAD,
            capacity: CapacityPolicy::default(),
            eviction: EvictionPolicy::default(),
            seed: DEFAULT_SEED,
        }
    }
}

impl RunConfig {
    /// Default configuration over the given sizes.
    #[must_use]
    pub fn with_sizes(sizes: SizeDistribution) -> Self {
        Self {
            sizes,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn counts(mut self, malloc_count: usize, free_count: usize) -> Self {
        self.malloc_count = malloc_count;
        self.free_count = free_count;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    #[must_use]
    pub fn metadata_overhead(mut self, overhead: usize) -> Self {
        self.metadata_overhead = overhead;
        self
    }

    #[must_use]
    pub fn capacity(mut self, capacity: CapacityPolicy) -> Self {
        self.capacity = capacity;
        self
    }

    /// Check the configuration before any allocator call is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = self.sizes.sizes();
        if sizes.is_empty() {
            return Err(ConfigError::EmptyDistribution);
        }
        if let Some(index) = sizes.iter().position(|&s| s == 0) {
            return Err(ConfigError::ZeroSize { index });
        }
        if self.capacity.initial_capacity == 0 {
            return Err(ConfigError::ZeroInitialCapacity);
        }
        let overhead = self.metadata_overhead as u64;
        for &size in sizes {
            if (size as u64).checked_add(overhead).is_none()
                || size.checked_add(self.metadata_overhead).is_none()
            {
                return Err(ConfigError::SizeOverflow {
                    size,
                    metadata_overhead: self.metadata_overhead,
                });
            }
        }
        // Live bytes and capacity each grow by at most one charge plus one
        // chunk per allocate token; the worst case must fit in u64.
        let max_charge = self.sizes.max_size() as u64 + overhead;
        let chunk_size = self.capacity.chunk_size;
        let worst_case = max_charge
            .checked_add(chunk_size.max(max_charge))
            .and_then(|per_alloc| per_alloc.checked_mul(self.malloc_count as u64))
            .and_then(|total| total.checked_add(self.capacity.initial_capacity));
        if worst_case.is_none() {
            return Err(ConfigError::AccountingOverflow {
                malloc_count: self.malloc_count,
                max_charge,
                chunk_size,
            });
        }
        Ok(())
    }

    /// Load from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        Ok(config)
    }
}
