//! Error taxonomy for configuration and run execution.
//!
//! Allocation failures and tracker underflow are not errors: the executor
//! records them and keeps going. Everything here aborts a run.

use thiserror::Error;

use crate::allocator::AllocatorFault;

/// Rejected run configuration. Raised before the allocator is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("size distribution is empty")]
    EmptyDistribution,
    #[error("size distribution entry {index} is zero")]
    ZeroSize { index: usize },
    #[error("initial capacity must be greater than zero")]
    ZeroInitialCapacity,
    #[error("size {size} plus metadata overhead {metadata_overhead} overflows accounting")]
    SizeOverflow { size: usize, metadata_overhead: usize },
    #[error(
        "{malloc_count} allocations of up to {max_charge} bytes with growth chunk {chunk_size} can overflow capacity accounting"
    )]
    AccountingOverflow {
        malloc_count: usize,
        max_charge: u64,
        chunk_size: u64,
    },
}

/// Which part of a run issued the failing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Replaying the workload plan.
    Measured,
    /// Releasing allocations still live at the end of the plan.
    Cleanup,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Measured => f.write_str("measured"),
            RunPhase::Cleanup => f.write_str("cleanup"),
        }
    }
}

/// A run that did not produce a valid result.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid run configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("allocator rejected release of live handle {handle} ({size} bytes) during {phase}: {fault}")]
    AllocatorInvariant {
        handle: String,
        size: usize,
        phase: RunPhase,
        #[source]
        fault: AllocatorFault,
    },
    #[error("allocator returned handle {handle} which is already live")]
    DuplicateHandle { handle: String },
}
